//! Session-local set of items to skip.
//!
//! Ids cross protocol boundaries (filesystem path, media-source URI,
//! URL-encoded forms), so every excluded id is stored in both its raw and
//! canonical form and lookups try both. The registry lives for the
//! session only and is flushed when a sequential traversal loops back.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use framecast_hub::media_source::{decode_id, uri_to_path, MEDIA_SOURCE_SCHEME};

/// Why an item was excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Renderer reported a 404
    FileMissing,
    /// User moved the item to the junk folder
    Deleted,
    /// User moved the item to the edit folder
    Edited,
}

#[derive(Debug, Default)]
pub struct ExclusionRegistry {
    entries: RwLock<HashSet<String>>,
}

/// Canonical form of an id: percent-decoded, with local media-source URIs
/// reduced to their filesystem path and other URIs stripped of the scheme.
#[must_use]
pub fn canonicalize(id: &str) -> String {
    let decoded = decode_id(id);
    if let Some(path) = uri_to_path(&decoded) {
        return path;
    }
    if let Some(rest) = decoded.strip_prefix(MEDIA_SOURCE_SCHEME) {
        return rest.to_string();
    }
    decoded
}

impl ExclusionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an id in both raw and canonical form.
    pub fn insert(&self, id: &str, reason: ExclusionReason) {
        let canonical = canonicalize(id);
        let mut entries = self.entries.write();
        entries.insert(id.to_string());
        entries.insert(canonical);
        tracing::debug!(id, ?reason, total = entries.len(), "item excluded");
    }

    /// Membership test trying both the raw and canonical form.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        let entries = self.entries.read();
        if entries.contains(id) {
            return true;
        }
        entries.contains(&canonicalize(id))
    }

    /// Flush everything; used on sequential loop-back.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        if !entries.is_empty() {
            tracing::debug!(flushed = entries.len(), "exclusion registry cleared");
        }
        entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_and_path_variants_collide() {
        let registry = ExclusionRegistry::new();
        registry.insert(
            "media-source://media_source/media/photos/a.jpg",
            ExclusionReason::FileMissing,
        );
        assert!(registry.contains("media-source://media_source/media/photos/a.jpg"));
        assert!(registry.contains("/media/photos/a.jpg"));
    }

    #[test]
    fn test_percent_encoded_variant_collides() {
        let registry = ExclusionRegistry::new();
        registry.insert("/media/Vacation 2023/beach.jpg", ExclusionReason::Deleted);
        assert!(registry.contains("/media/Vacation%202023/beach.jpg"));
    }

    #[test]
    fn test_integration_uri_scheme_strip() {
        let registry = ExclusionRegistry::new();
        registry.insert("media-source://photo_app/album/42", ExclusionReason::Edited);
        assert!(registry.contains("media-source://photo_app/album/42"));
        assert!(!registry.contains("media-source://photo_app/album/43"));
    }

    #[test]
    fn test_clear_flushes_everything() {
        let registry = ExclusionRegistry::new();
        registry.insert("/a.jpg", ExclusionReason::FileMissing);
        assert!(!registry.is_empty());
        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.contains("/a.jpg"));
    }
}
