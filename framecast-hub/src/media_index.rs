// media_index Service Contracts
//
// Typed request/response shapes for the backend indexing service. All
// payloads are snake_case on the wire; optional fields are omitted rather
// than sent as null so older backends ignore what they don't know.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MEDIA_INDEX_DOMAIN: &str = "media_index";
pub const SVC_GET_RANDOM_ITEMS: &str = "get_random_items";
pub const SVC_GET_ORDERED_FILES: &str = "get_ordered_files";
pub const SVC_GET_FILE_METADATA: &str = "get_file_metadata";

/// File type filter accepted by both query services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
}

/// Sort dimension for `get_ordered_files`.
///
/// Serializes snake_case on the wire; the camelCase aliases accept the
/// card-config spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    #[serde(alias = "dateTaken")]
    DateTaken,
    Filename,
    Path,
    #[serde(alias = "modifiedTime")]
    ModifiedTime,
}

impl OrderField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DateTaken => "date_taken",
            Self::Filename => "filename",
            Self::Path => "path",
            Self::ModifiedTime => "modified_time",
        }
    }

    /// Whether the sort value for this field is a timestamp (vs. text)
    #[must_use]
    pub const fn is_temporal(self) -> bool {
        matches!(self, Self::DateTaken | Self::ModifiedTime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// Instance routing for setups with multiple indexer instances.
///
/// When either field is present the hub routes the service call to the
/// matching config entry instead of broadcasting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

impl IndexTarget {
    #[must_use]
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            entry_id: None,
        }
    }
}

/// Request body for `media_index.get_random_items`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomItemsRequest {
    pub count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    pub recursive: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorites_only: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub priority_new_files: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_files_threshold_seconds: Option<u64>,

    #[serde(flatten)]
    pub target: IndexTarget,
}

/// Request body for `media_index.get_ordered_files`
///
/// Same filter surface as the random query plus the compound cursor: the
/// response is ordered by `(order_by, id)` strictly after
/// `(after_value, after_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderedFilesRequest {
    pub count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    pub recursive: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorites_only: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,

    pub order_by: OrderField,
    pub order_direction: OrderDirection,

    /// Unix seconds for temporal fields, plain text for name/path fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_value: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_id: Option<String>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub priority_new_files: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_files_threshold_seconds: Option<u64>,

    #[serde(flatten)]
    pub target: IndexTarget,
}

/// One indexed file as returned by both query services.
///
/// Time-like fields are left as raw JSON because the index emits a mix of
/// ISO-8601 strings, EXIF `YYYY:MM:DD hh:mm:ss` strings and epoch numbers
/// depending on the scanner that produced the row; normalization happens
/// client-side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexItem {
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_source_uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_taken: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_time: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<Value>,

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

/// Envelope for both query services
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexItemsResponse {
    #[serde(default)]
    pub items: Vec<IndexItem>,
}

/// Request body for `media_index.get_file_metadata`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadataRequest {
    pub media_source_uri: String,

    #[serde(flatten)]
    pub target: IndexTarget,
}

/// Per-file metadata plus the nested raw EXIF block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileMetadataResponse {
    #[serde(flatten)]
    pub item: IndexItem,

    #[serde(default)]
    pub exif: Value,
}
