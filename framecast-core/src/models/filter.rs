//! Filter configuration and resolved filter values.
//!
//! A filter slot is either a static value or a live entity reference
//! (any string containing a dot). Resolution against entity states is the
//! resolver's job; this module only carries the shapes and the structural
//! comparison that decides whether a reload is needed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Live filter values shared between the resolver (writer) and the
/// providers (readers).
pub type SharedFilters = Arc<parking_lot::RwLock<ResolvedFilters>>;

/// Fresh shared slot with no filters applied
#[must_use]
pub fn shared_filters(initial: ResolvedFilters) -> SharedFilters {
    Arc::new(parking_lot::RwLock::new(initial))
}

/// Favorites filter: a literal boolean or an entity reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FavoritesFilter {
    Static(bool),
    Entity(String),
}

/// Date range bounds; each bound is a `YYYY-MM-DD` string or an entity
/// reference, told apart by the presence of a dot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRangeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// Filter section of the card configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorites: Option<FavoritesFilter>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRangeSpec>,
}

/// True when the string names an entity rather than a literal value
#[must_use]
pub fn is_entity_reference(value: &str) -> bool {
    value.contains('.')
}

impl FilterSpec {
    /// All entity ids this spec subscribes to
    #[must_use]
    pub fn referenced_entities(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(FavoritesFilter::Entity(id)) = &self.favorites {
            out.push(id.clone());
        }
        if let Some(range) = &self.date_range {
            for bound in [&range.start, &range.end].into_iter().flatten() {
                if is_entity_reference(bound) {
                    out.push(bound.clone());
                }
            }
        }
        out
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.favorites.is_none() && self.date_range.is_none()
    }
}

/// Filter values after entity resolution. `None` in a slot means "filter
/// not applied" (including invalid or missing entities).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFilters {
    pub favorites_only: Option<bool>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl ResolvedFilters {
    /// Whether any filter is active, which decides the empty-result
    /// disposition (NoMatchingItems vs EmptyCollection).
    #[must_use]
    pub fn any_active(&self) -> bool {
        self.favorites_only == Some(true)
            || self.date_from.is_some()
            || self.date_to.is_some()
    }

    /// Names of the active filters, for queue statistics
    #[must_use]
    pub fn active_filter_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.favorites_only == Some(true) {
            names.push("favorites");
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            names.push("date_range");
        }
        names
    }
}
