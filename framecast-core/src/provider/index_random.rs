// Index-Backed Random Provider
//
// Random draws from the index honoring filters and the novelty
// preference. When the novelty-biased query stops producing new items
// (two consecutive refills dominated by duplicates) the priority path is
// latched off so later refills don't pay a wasted round-trip; the first
// low-duplicate refill unlatches it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use framecast_hub::media_index::{
    IndexItemsResponse, IndexTarget, RandomItemsRequest, MEDIA_INDEX_DOMAIN, SVC_GET_RANDOM_ITEMS,
};

use super::error::{ProviderError, Result};
use super::queue::ItemQueue;
use super::traits::{MediaProvider, ProviderContext, RescanOutcome};
use crate::config::CardConfig;
use crate::models::{ContentType, MediaItem, QueueStats, SharedFilters, StatsEmitter};

/// Duplicate fraction above which a batch counts as high-filter
const HIGH_FILTER_RATE: f64 = 0.8;

/// Consecutive high-filter batches before the priority path is latched off
const EXHAUSTION_THRESHOLD: u32 = 2;

struct RandState {
    queue: ItemQueue,
    recent_files_exhausted: bool,
    consecutive_high_filter: u32,
}

struct BatchOutcome {
    accepted: Vec<MediaItem>,
    filter_rate: f64,
}

pub struct MediaIndexRandom {
    ctx: ProviderContext,
    folder: Option<String>,
    recursive: bool,
    file_type: Option<framecast_hub::media_index::FileType>,
    target: IndexTarget,
    priority_new_files: bool,
    new_files_threshold_seconds: u64,
    filters: SharedFilters,
    stats: Arc<StatsEmitter>,
    state: Mutex<RandState>,
}

impl MediaIndexRandom {
    #[must_use]
    pub fn new(
        config: &CardConfig,
        ctx: ProviderContext,
        filters: SharedFilters,
        stats: Arc<StatsEmitter>,
    ) -> Self {
        let target = config
            .media_index
            .entity_id
            .clone()
            .map(IndexTarget::entity)
            .unwrap_or_default();
        Self {
            ctx,
            folder: config.folder.path.clone(),
            recursive: config.folder.recursive,
            file_type: config.file_type(),
            target,
            priority_new_files: config.folder.priority_new_files,
            new_files_threshold_seconds: config.folder.new_files_threshold_seconds,
            filters,
            stats,
            state: Mutex::new(RandState {
                queue: ItemQueue::new(config.slideshow_window),
                recent_files_exhausted: false,
                consecutive_high_filter: 0,
            }),
        }
    }

    fn build_request(&self, count: u32, use_priority: bool) -> RandomItemsRequest {
        let filters = self.filters.read().clone();
        RandomItemsRequest {
            count,
            folder: self.folder.clone(),
            recursive: self.recursive,
            file_type: self.file_type,
            favorites_only: filters.favorites_only.filter(|on| *on),
            date_from: filters.date_from,
            date_to: filters.date_to,
            priority_new_files: use_priority,
            new_files_threshold_seconds: use_priority
                .then_some(self.new_files_threshold_seconds),
            target: self.target.clone(),
        }
    }

    /// One batch round-trip. The filter rate counts only duplicates of
    /// the queue/history sets; unsupported and excluded rows are dropped
    /// without weighing on the exhaustion heuristic.
    async fn fetch_batch(
        &self,
        count: u32,
        use_priority: bool,
        existing: &HashSet<String>,
    ) -> Result<BatchOutcome> {
        let payload = serde_json::to_value(self.build_request(count, use_priority))?;
        let response = self
            .ctx
            .hub
            .call_service(MEDIA_INDEX_DOMAIN, SVC_GET_RANDOM_ITEMS, payload, true)
            .await?;
        let decoded: IndexItemsResponse = serde_json::from_value(response)?;

        let total = decoded.items.len();
        let mut duplicates = 0usize;
        let mut accepted = Vec::new();
        for index_item in &decoded.items {
            let item = MediaItem::from_index(index_item);
            if existing.contains(&item.id) || accepted.iter().any(|a: &MediaItem| a.id == item.id)
            {
                duplicates += 1;
                continue;
            }
            if item.content_type == ContentType::Unknown
                || self.ctx.exclusions.contains(&item.id)
            {
                continue;
            }
            accepted.push(item);
        }
        let filter_rate = if total == 0 {
            0.0
        } else {
            duplicates as f64 / total as f64
        };
        Ok(BatchOutcome {
            accepted,
            filter_rate,
        })
    }

    async fn emit_stats(&self, queue_len: usize, capacity: usize) {
        let filters = self.filters.read().clone();
        self.stats
            .emit(QueueStats::snapshot(queue_len, capacity, &filters))
            .await;
    }

    /// Refill loop: one novelty-biased batch, an optional fallback batch
    /// when duplicates dominate, then exhaustion bookkeeping.
    ///
    /// `just_popped` covers the window where an item left the queue but
    /// the navigation layer has not recorded it in history yet.
    async fn refill(&self, state: &mut RandState, just_popped: Option<&str>) -> Result<()> {
        let want = state.queue.shortfall();
        if want == 0 {
            return Ok(());
        }

        let mut existing = state.queue.id_set();
        existing.extend(self.ctx.history.ids());
        if let Some(id) = just_popped {
            existing.insert(id.to_string());
        }

        let use_priority = self.priority_new_files && !state.recent_files_exhausted;
        let first = self.fetch_batch(want as u32, use_priority, &existing).await?;
        let mut merged = first.accepted;

        if first.filter_rate > HIGH_FILTER_RATE && use_priority {
            // Novelty bias drowned in duplicates; one retry without it
            existing.extend(merged.iter().map(|item| item.id.clone()));
            let retry = self.fetch_batch(want as u32, false, &existing).await?;
            merged.extend(retry.accepted);
        }

        if first.filter_rate > HIGH_FILTER_RATE {
            state.consecutive_high_filter += 1;
            if state.consecutive_high_filter >= EXHAUSTION_THRESHOLD
                && !state.recent_files_exhausted
            {
                state.recent_files_exhausted = true;
                tracing::info!(
                    filter_rate = first.filter_rate,
                    "recent files exhausted, disabling priority path"
                );
            }
        } else {
            state.consecutive_high_filter = 0;
            if state.recent_files_exhausted {
                tracing::info!("novelty restored, re-enabling priority path");
            }
            state.recent_files_exhausted = false;
        }

        tracing::debug!(
            requested = want,
            accepted = merged.len(),
            filter_rate = first.filter_rate,
            used_priority = use_priority,
            exhausted = state.recent_files_exhausted,
            "random refill complete"
        );

        // Priority items naturally land first
        state.queue.prepend(merged);
        self.emit_stats(state.queue.len(), state.queue.capacity()).await;
        Ok(())
    }
}

#[async_trait]
impl MediaProvider for MediaIndexRandom {
    fn name(&self) -> &'static str {
        "index_random"
    }

    async fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.queue.clear();
        state.recent_files_exhausted = false;
        state.consecutive_high_filter = 0;
        self.refill(&mut state, None).await?;

        if state.queue.is_empty() {
            let filters_active = self.filters.read().any_active();
            return Err(if filters_active {
                ProviderError::NoMatchingItems
            } else {
                ProviderError::EmptyCollection
            });
        }
        Ok(())
    }

    async fn next(&self) -> Result<Option<MediaItem>> {
        let mut state = self.state.lock().await;
        if state.queue.is_empty() {
            self.refill(&mut state, None).await?;
        }
        let item = state.queue.pop_allowed(&self.ctx.exclusions);
        if let Some(popped) = &item {
            if state.queue.below_refill_threshold() {
                self.refill(&mut state, Some(&popped.id)).await?;
            }
        }
        Ok(item)
    }

    async fn peek(&self) -> Result<Option<MediaItem>> {
        let mut state = self.state.lock().await;
        Ok(state.queue.peek_allowed(&self.ctx.exclusions).cloned())
    }

    /// Direct novelty query used by periodic refresh.
    async fn files_newer_than(&self, threshold: DateTime<Utc>) -> Result<Vec<MediaItem>> {
        let state = self.state.lock().await;
        let mut existing = state.queue.id_set();
        let capacity = state.queue.capacity();
        drop(state);
        existing.extend(self.ctx.history.ids());

        let payload = serde_json::to_value(self.build_request(capacity as u32, true))?;
        let response = self
            .ctx
            .hub
            .call_service(MEDIA_INDEX_DOMAIN, SVC_GET_RANDOM_ITEMS, payload, true)
            .await?;
        let decoded: IndexItemsResponse = serde_json::from_value(response)?;

        let threshold_ts = threshold.timestamp();
        Ok(decoded
            .items
            .iter()
            .map(MediaItem::from_index)
            .filter(|item| {
                item.effective_timestamp() > threshold_ts
                    && !existing.contains(&item.id)
                    && !self.ctx.exclusions.contains(&item.id)
                    && item.content_type != ContentType::Unknown
            })
            .collect())
    }

    async fn prepend(&self, items: Vec<MediaItem>) {
        let mut state = self.state.lock().await;
        state.queue.prepend(items);
    }

    async fn rescan(&self, _current_id: Option<&str>) -> Result<RescanOutcome> {
        let mut state = self.state.lock().await;
        let previous_first = state.queue.first_id();
        state.queue.clear();
        state.recent_files_exhausted = false;
        state.consecutive_high_filter = 0;
        self.refill(&mut state, None).await?;
        let new_first = state.queue.first_id();
        Ok(RescanOutcome {
            queue_changed: previous_first != new_first,
            previous_first,
            new_first,
        })
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.queue.clear();
        state.recent_files_exhausted = false;
        state.consecutive_high_filter = 0;
        self.refill(&mut state, None).await
    }

    fn queue_len(&self) -> usize {
        self.state
            .try_lock()
            .map(|state| state.queue.len())
            .unwrap_or(0)
    }
}
