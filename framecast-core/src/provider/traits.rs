// Media Provider Traits
//
// Core interfaces for the provider system

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use framecast_hub::HubClientArc;

use super::error::Result;
use crate::models::MediaItem;
use crate::navigation::exclusion::ExclusionRegistry;

/// Read-only view of the navigation history.
///
/// Providers need to know what is already on screen to deduplicate, but
/// must not hold the whole card; this narrow interface breaks the cycle
/// and disposal only has to drop the view.
pub trait HistoryView: Send + Sync {
    fn contains_id(&self, id: &str) -> bool;
    fn ids(&self) -> Vec<String>;
}

/// History view that knows nothing; for providers used standalone.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyHistory;

impl HistoryView for EmptyHistory {
    fn contains_id(&self, _id: &str) -> bool {
        false
    }

    fn ids(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Shared dependencies handed to every provider
#[derive(Clone)]
pub struct ProviderContext {
    pub hub: HubClientArc,
    pub history: Arc<dyn HistoryView>,
    pub exclusions: Arc<ExclusionRegistry>,
}

impl ProviderContext {
    #[must_use]
    pub fn new(
        hub: HubClientArc,
        history: Arc<dyn HistoryView>,
        exclusions: Arc<ExclusionRegistry>,
    ) -> Self {
        Self {
            hub,
            history,
            exclusions,
        }
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext").finish()
    }
}

/// Best-effort existence check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    pub exists: bool,
    pub reason: Option<String>,
}

/// Outcome of a from-scratch rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescanOutcome {
    pub queue_changed: bool,
    pub previous_first: Option<String>,
    pub new_first: Option<String>,
}

/// A supplier of media items.
///
/// Lifecycle: created, `initialize()` once, `next()` repeatedly, the
/// refresh hooks as the card sees fit, `dispose()` at teardown. `next`
/// must never yield an item present in the current history or in the
/// exclusion registry.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Provider type name (e.g. "index_random", "subfolder")
    fn name(&self) -> &'static str;

    /// First fetch. Errors distinguish unreachable sources
    /// (`Transport`), misconfiguration (`InvalidConfig`), zero items
    /// under active filters (`NoMatchingItems`) and genuinely empty
    /// collections (`EmptyCollection`).
    async fn initialize(&self) -> Result<()>;

    /// Produce the next item, refilling as needed. `Ok(None)` means the
    /// source is exhausted.
    async fn next(&self) -> Result<Option<MediaItem>>;

    /// Look at the upcoming item without consuming it. May trigger a
    /// refill; sequential providers honor the auto-loop suppression here.
    async fn peek(&self) -> Result<Option<MediaItem>> {
        Ok(None)
    }

    /// Best-effort validation; `None` means the provider has no opinion.
    async fn check_file_exists(&self, _item: &MediaItem) -> Option<FileCheck> {
        None
    }

    /// Discovery hook for periodic refresh; may return an empty list.
    async fn files_newer_than(&self, _threshold: DateTime<Utc>) -> Result<Vec<MediaItem>> {
        Ok(Vec::new())
    }

    /// Put discovered items at the front of the queue. Providers without
    /// a queue ignore this.
    async fn prepend(&self, _items: Vec<MediaItem>) {}

    /// Rebuild from scratch. Sequential providers reset their cursor,
    /// random providers re-draw.
    async fn rescan(&self, current_id: Option<&str>) -> Result<RescanOutcome>;

    /// Drop all queue state so the next fetch behaves like a fresh
    /// `initialize`.
    async fn reset(&self) -> Result<()>;

    /// Suppress (or re-allow) end-of-sequence looping. Only sequential
    /// providers react; used during preload so a spurious end does not
    /// trigger a full loop.
    fn set_auto_loop(&self, _enabled: bool) {}

    /// Current number of queued items, for statistics
    fn queue_len(&self) -> usize {
        0
    }

    /// Release subscriptions and background work. Idempotent.
    async fn dispose(&self) {}
}

pub type MediaProviderArc = Arc<dyn MediaProvider>;
