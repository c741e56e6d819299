use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use framecast_hub::media_index::IndexItem;
use framecast_hub::media_source::{
    self, classify_extension, filename_of, folder_of, MediaKind,
};

use super::cursor::normalize_epoch_seconds;

/// Content type of a delivered item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Image,
    Video,
    #[default]
    Unknown,
}

impl From<MediaKind> for ContentType {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => Self::Image,
            MediaKind::Video => Self::Video,
        }
    }
}

/// Metadata attached to an item. Every field is optional; a fully empty
/// block means the item is not present in the index and only path-derived
/// information is available.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_source_uri: Option<String>,

    /// Unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_taken: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_time: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_city: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_state: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_country: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_coordinates: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_geocoded: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorited: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
}

impl ItemMetadata {
    /// Derive what we can from the identifier alone. Used when the item
    /// never touched the index, and as the fallback when enrichment fails.
    #[must_use]
    pub fn from_path(id: &str) -> Self {
        Self {
            filename: filename_of(id),
            folder: folder_of(id),
            path: media_source::uri_to_path(id),
            media_source_uri: Some(media_source::path_to_uri(id)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_index(index: &IndexItem) -> Self {
        Self {
            filename: index
                .filename
                .clone()
                .or_else(|| filename_of(&index.path)),
            folder: index.folder.clone().or_else(|| folder_of(&index.path)),
            path: Some(index.path.clone()),
            media_source_uri: index
                .media_source_uri
                .clone()
                .or_else(|| Some(media_source::path_to_uri(&index.path))),
            date_taken: index.date_taken.as_ref().and_then(normalize_epoch_seconds),
            created_time: index.created_time.as_ref().and_then(normalize_epoch_seconds),
            modified_time: index
                .modified_time
                .as_ref()
                .and_then(normalize_epoch_seconds),
            location_city: index.location_city.clone(),
            location_state: index.location_state.clone(),
            location_country: index.location_country.clone(),
            location_name: index.location_name.clone(),
            latitude: index.latitude,
            longitude: index.longitude,
            has_coordinates: index.has_coordinates,
            is_geocoded: index.is_geocoded,
            is_favorited: index.is_favorited,
            rating: index.rating,
        }
    }
}

/// The unit of delivery.
///
/// `id` uniquely identifies the item for the whole session; the preferred
/// form is the media-source URI with the filesystem path as fallback. Two
/// items with equal ids are the same item for deduplication, exclusion and
/// history purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub content_type: ContentType,

    /// Time-bounded authenticated URL; lazily resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_url: Option<String>,

    #[serde(default)]
    pub metadata: ItemMetadata,
}

impl MediaItem {
    /// Build an item from a bare identifier with path-derived metadata.
    #[must_use]
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let content_type = classify_extension(&id)
            .map(ContentType::from)
            .unwrap_or_default();
        let metadata = ItemMetadata::from_path(&id);
        Self {
            id,
            content_type,
            resolved_url: None,
            metadata,
        }
    }

    /// Build an item from an index row, preferring the media-source URI as
    /// the identity.
    #[must_use]
    pub fn from_index(index: &IndexItem) -> Self {
        let id = index
            .media_source_uri
            .clone()
            .unwrap_or_else(|| index.path.clone());
        let content_type = classify_extension(&id)
            .or_else(|| classify_extension(&index.path))
            .map(ContentType::from)
            .unwrap_or_default();
        Self {
            id,
            content_type,
            resolved_url: None,
            metadata: ItemMetadata::from_index(index),
        }
    }

    /// The id to use for index metadata lookups
    #[must_use]
    pub fn media_source_uri(&self) -> String {
        self.metadata
            .media_source_uri
            .clone()
            .unwrap_or_else(|| framecast_hub::media_source::path_to_uri(&self.id))
    }

    /// Effective timestamp for ordering fallback: date taken, then
    /// modified, then created, then the epoch.
    #[must_use]
    pub fn effective_timestamp(&self) -> i64 {
        self.metadata
            .date_taken
            .or(self.metadata.modified_time)
            .or(self.metadata.created_time)
            .unwrap_or(0)
    }

    #[must_use]
    pub fn taken_at(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .date_taken
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

impl PartialEq for MediaItem {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MediaItem {}
