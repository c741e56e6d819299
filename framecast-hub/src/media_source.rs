// Media-Source Protocol
//
// Browse/resolve wire shapes plus the path <-> URI conventions the rest of
// the system leans on. URIs look like `media-source://<domain>/<path>`;
// plain filesystem paths are mapped onto the `media_source` domain, while
// integration URIs (camera, photo apps) pass through untouched.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

pub const MEDIA_SOURCE_SCHEME: &str = "media-source://";
pub const LOCAL_MEDIA_SOURCE_DOMAIN: &str = "media_source";

/// Extensions the scheduler will deliver; anything else is ignored during
/// discovery.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "mov", "m4v"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp"];

/// Kind of a file as derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Media class reported for browse children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaClass {
    Directory,
    Image,
    Video,
    #[serde(other)]
    Other,
}

/// One child of a browsed folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseChild {
    pub media_content_id: String,
    pub title: String,
    pub can_expand: bool,
    pub media_class: MediaClass,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Browse response for a single folder level
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowsePage {
    #[serde(default)]
    pub media_content_id: String,

    #[serde(default)]
    pub children: Vec<BrowseChild>,
}

/// Resolve response: a time-bounded, authenticated URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedMedia {
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// True for any `media-source://` identifier
#[must_use]
pub fn is_media_source_uri(id: &str) -> bool {
    id.starts_with(MEDIA_SOURCE_SCHEME)
}

/// Domain portion of a media-source URI, if it is one
#[must_use]
pub fn uri_domain(id: &str) -> Option<&str> {
    let rest = id.strip_prefix(MEDIA_SOURCE_SCHEME)?;
    Some(rest.split('/').next().unwrap_or(rest))
}

/// True for media-source URIs owned by an integration rather than the
/// local filesystem. Integration URIs must never be filesystem-mapped.
#[must_use]
pub fn is_integration_uri(id: &str) -> bool {
    match uri_domain(id) {
        Some(domain) => domain != LOCAL_MEDIA_SOURCE_DOMAIN,
        None => false,
    }
}

/// Map an identifier to its media-source URI form.
///
/// Filesystem paths (`/...`) are mapped onto the local media_source
/// domain; existing URIs pass through unchanged. Anything else (http URLs
/// etc.) is also returned as-is.
#[must_use]
pub fn path_to_uri(id: &str) -> String {
    if is_media_source_uri(id) || !id.starts_with('/') {
        return id.to_string();
    }
    format!("{MEDIA_SOURCE_SCHEME}{LOCAL_MEDIA_SOURCE_DOMAIN}{id}")
}

/// Recover the filesystem path from a local media-source URI.
///
/// Integration URIs have no filesystem form and yield `None`.
#[must_use]
pub fn uri_to_path(id: &str) -> Option<String> {
    if !is_media_source_uri(id) {
        return id.starts_with('/').then(|| id.to_string());
    }
    let rest = id.strip_prefix(MEDIA_SOURCE_SCHEME)?;
    let (domain, path) = rest.split_once('/')?;
    if domain != LOCAL_MEDIA_SOURCE_DOMAIN {
        return None;
    }
    Some(format!("/{path}"))
}

/// Percent-decode an identifier, falling back to the raw form on invalid
/// encodings.
#[must_use]
pub fn decode_id(id: &str) -> String {
    percent_decode_str(id)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| id.to_string())
}

/// Last path segment, percent-decoded
#[must_use]
pub fn filename_of(id: &str) -> Option<String> {
    let decoded = decode_id(id);
    let trimmed = decoded.trim_end_matches('/');
    let name = trimmed.rsplit('/').next()?;
    (!name.is_empty()).then(|| name.to_string())
}

/// Parent folder name, percent-decoded
#[must_use]
pub fn folder_of(id: &str) -> Option<String> {
    let decoded = decode_id(id);
    let trimmed = decoded.trim_end_matches('/');
    let mut segments = trimmed.rsplit('/');
    segments.next()?;
    let parent = segments.next()?;
    (!parent.is_empty()).then(|| parent.to_string())
}

/// Classify a file by extension against the closed supported set
#[must_use]
pub fn classify_extension(id: &str) -> Option<MediaKind> {
    let name = filename_of(id)?;
    let ext = name.rsplit('.').next()?.to_ascii_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_to_uri_maps_local_paths() {
        assert_eq!(
            path_to_uri("/media/photos/a.jpg"),
            "media-source://media_source/media/photos/a.jpg"
        );
    }

    #[test]
    fn test_path_to_uri_passes_through_uris_and_urls() {
        let camera = "media-source://camera/front_door";
        assert_eq!(path_to_uri(camera), camera);
        assert_eq!(path_to_uri("https://example.net/a.jpg"), "https://example.net/a.jpg");
    }

    #[test]
    fn test_uri_to_path_round_trip() {
        let uri = path_to_uri("/media/photos/a.jpg");
        assert_eq!(uri_to_path(&uri).as_deref(), Some("/media/photos/a.jpg"));
    }

    #[test]
    fn test_integration_uri_is_never_filesystem_mapped() {
        assert!(is_integration_uri("media-source://camera/front_door"));
        assert!(!is_integration_uri("media-source://media_source/media/a.jpg"));
        assert_eq!(uri_to_path("media-source://camera/front_door"), None);
    }

    #[test]
    fn test_filename_and_folder_extraction() {
        let uri = "media-source://media_source/media/Vacation%202023/beach.jpg";
        assert_eq!(filename_of(uri).as_deref(), Some("beach.jpg"));
        assert_eq!(folder_of(uri).as_deref(), Some("Vacation 2023"));
    }

    #[test]
    fn test_classify_extension_closed_set() {
        assert_eq!(classify_extension("/a/b/c.JPG"), Some(MediaKind::Image));
        assert_eq!(classify_extension("/a/b/c.mov"), Some(MediaKind::Video));
        assert_eq!(classify_extension("/a/b/c.ogg"), Some(MediaKind::Video));
        assert_eq!(classify_extension("/a/b/thumbs.db"), None);
        assert_eq!(classify_extension("/a/b/noext"), None);
    }
}
