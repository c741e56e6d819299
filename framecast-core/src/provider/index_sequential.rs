// Index-Backed Sequential Provider
//
// Deterministic paginated traversal over the index, ordered by one of the
// supported dimensions. Pagination is keyed by a compound (sort value, id)
// cursor; because rows can lack date_taken, temporal batches are
// re-sorted client-side with the dated fallback chain and the cursor is
// recomputed from the last retained item of the sorted batch. Skipping
// that recomputation is what causes duplicate fetches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use framecast_hub::media_index::{
    IndexItemsResponse, IndexTarget, OrderedFilesRequest, MEDIA_INDEX_DOMAIN,
    SVC_GET_ORDERED_FILES,
};

use super::error::{ProviderError, Result};
use super::queue::ItemQueue;
use super::traits::{MediaProvider, ProviderContext, RescanOutcome};
use crate::config::CardConfig;
use crate::models::{
    compare_items, ContentType, MediaItem, OrderDirection, OrderField, PageCursor, SharedFilters,
};

/// Bound on accumulation rounds within a single refill
fn max_iterations(queue_size: usize) -> usize {
    queue_size.div_ceil(10).clamp(5, 20)
}

struct SeqState {
    queue: ItemQueue,
    cursor: Option<PageCursor>,
    has_more: bool,
    /// Set once the traversal wrapped; replay laps must re-yield items
    /// that are necessarily in history already.
    looped: bool,
    /// Identity and timestamp of the first item of the session, used as
    /// the stopping point for cursorless new-file probes.
    session_first_id: Option<String>,
    session_reference_ts: Option<i64>,
}

pub struct MediaIndexSequential {
    ctx: ProviderContext,
    folder: Option<String>,
    recursive: bool,
    file_type: Option<framecast_hub::media_index::FileType>,
    order_by: OrderField,
    direction: OrderDirection,
    target: IndexTarget,
    filters: SharedFilters,
    auto_loop: AtomicBool,
    state: Mutex<SeqState>,
}

impl MediaIndexSequential {
    #[must_use]
    pub fn new(config: &CardConfig, ctx: ProviderContext, filters: SharedFilters) -> Self {
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
            order_by: config.folder.sequential.order_by,
            direction: config.folder.sequential.order_direction,
            target,
            filters,
            auto_loop: AtomicBool::new(true),
            state: Mutex::new(SeqState {
                queue: ItemQueue::new(config.slideshow_window),
                cursor: None,
                has_more: true,
                looped: false,
                session_first_id: None,
                session_reference_ts: None,
            }),
        }
    }

    fn build_request(
        &self,
        count: u32,
        cursor: Option<&PageCursor>,
        direction: OrderDirection,
    ) -> OrderedFilesRequest {
        let filters = self.filters.read().clone();
        OrderedFilesRequest {
            count,
            folder: self.folder.clone(),
            recursive: self.recursive,
            file_type: self.file_type,
            favorites_only: filters.favorites_only.filter(|on| *on),
            date_from: filters.date_from,
            date_to: filters.date_to,
            order_by: self.order_by,
            order_direction: direction,
            after_value: cursor.map(|c| c.value.to_wire()),
            after_id: cursor.map(|c| c.id.clone()),
            priority_new_files: false,
            new_files_threshold_seconds: None,
            target: self.target.clone(),
        }
    }

    async fn fetch_page(&self, request: &OrderedFilesRequest) -> Result<Vec<MediaItem>> {
        let payload = serde_json::to_value(request)?;
        let response = self
            .ctx
            .hub
            .call_service(MEDIA_INDEX_DOMAIN, SVC_GET_ORDERED_FILES, payload, true)
            .await?;
        let decoded: IndexItemsResponse = serde_json::from_value(response)?;
        Ok(decoded.items.iter().map(MediaItem::from_index).collect())
    }

    /// Stabilize a temporal batch: re-sort with the dated fallback chain
    /// in the configured direction. Name/path orders come back stable
    /// already.
    fn stabilize(&self, batch: &mut [MediaItem]) {
        if self.order_by == OrderField::DateTaken {
            batch.sort_by(|a, b| compare_items(a, b, self.order_by, self.direction));
        }
    }

    fn retain_item(&self, item: &MediaItem, state: &SeqState) -> bool {
        if item.content_type == ContentType::Unknown {
            return false;
        }
        if self.ctx.exclusions.contains(&item.id) {
            return false;
        }
        // History dedupe applies to the first lap only; after a loop the
        // whole order is in history by construction.
        if !state.looped && self.ctx.history.contains_id(&item.id) {
            return false;
        }
        !state.queue.contains_id(&item.id)
    }

    /// One refill: accumulate batches until the shortfall is covered, the
    /// index reports the end, or the iteration bound trips.
    async fn refill(&self, state: &mut SeqState) -> Result<()> {
        let want = state.queue.shortfall();
        if want == 0 || !state.has_more {
            return Ok(());
        }
        let bound = max_iterations(state.queue.capacity());
        let mut accepted = 0usize;
        let mut seen_paths: std::collections::HashSet<String> = std::collections::HashSet::new();

        for _ in 0..bound {
            let need = want.saturating_sub(accepted);
            if need == 0 {
                break;
            }
            let request = self.build_request(need as u32, state.cursor.as_ref(), self.direction);
            let mut batch = self.fetch_page(&request).await?;
            let requested = need;
            let returned = batch.len();

            if returned == 0 {
                state.has_more = false;
                break;
            }

            self.stabilize(&mut batch);

            let mut last_retained: Option<PageCursor> = None;
            for item in batch.iter() {
                let path_key = item
                    .metadata
                    .path
                    .clone()
                    .unwrap_or_else(|| item.id.clone());
                if !seen_paths.insert(path_key) {
                    // Duplicate across batches in this accumulation:
                    // cursor drift. The cursor advance below recovers.
                    tracing::debug!(id = %item.id, "cursor drift duplicate dropped");
                    continue;
                }
                if !self.retain_item(item, state) {
                    continue;
                }
                last_retained = Some(PageCursor::from_item(item, self.order_by));
                if state.queue.push_back(item.clone()) {
                    accepted += 1;
                }
            }

            // Cursor from the last retained item of the sorted batch; if
            // nothing survived filtering, advance to the end of the batch
            // so the next request still makes progress.
            let batch_end = batch
                .last()
                .map(|item| PageCursor::from_item(item, self.order_by));
            state.cursor = last_retained.or(batch_end).or(state.cursor.take());

            if state.session_first_id.is_none() {
                if let Some(first) = batch.first() {
                    state.session_first_id = Some(first.id.clone());
                    state.session_reference_ts = Some(first.effective_timestamp());
                }
            }

            if returned < requested {
                state.has_more = false;
                break;
            }
        }

        tracing::debug!(
            accepted,
            queue = state.queue.len(),
            has_more = state.has_more,
            "sequential refill complete"
        );
        Ok(())
    }

    /// Loop back to the start of the order: clear cursor and exclusions,
    /// then refetch.
    async fn loop_back(&self, state: &mut SeqState) -> Result<()> {
        tracing::info!("sequence exhausted, looping back to start");
        state.cursor = None;
        state.has_more = true;
        state.looped = true;
        self.ctx.exclusions.clear();
        self.refill(state).await
    }
}

#[async_trait]
impl MediaProvider for MediaIndexSequential {
    fn name(&self) -> &'static str {
        "index_sequential"
    }

    async fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.queue.clear();
        state.cursor = None;
        state.has_more = true;
        state.looped = false;
        state.session_first_id = None;
        state.session_reference_ts = None;
        self.refill(&mut state).await?;

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
        loop {
            if let Some(item) = state.queue.pop_allowed(&self.ctx.exclusions) {
                if state.queue.below_refill_threshold() && state.has_more {
                    self.refill(&mut state).await?;
                }
                return Ok(Some(item));
            }
            if state.has_more {
                self.refill(&mut state).await?;
                if state.queue.is_empty() && !state.has_more {
                    continue;
                }
                if state.queue.is_empty() {
                    return Ok(None);
                }
                continue;
            }
            if !self.auto_loop.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.loop_back(&mut state).await?;
            if state.queue.is_empty() {
                return Ok(None);
            }
        }
    }

    async fn peek(&self) -> Result<Option<MediaItem>> {
        let mut state = self.state.lock().await;
        if state.queue.peek_allowed(&self.ctx.exclusions).is_none()
            && state.has_more
        {
            self.refill(&mut state).await?;
        }
        Ok(state.queue.peek_allowed(&self.ctx.exclusions).cloned())
    }

    /// Cursorless probe for new files: walk newest-first until hitting
    /// the item that opened the session or anything older than the
    /// threshold. Returned items are candidates for prepending.
    async fn files_newer_than(&self, threshold: DateTime<Utc>) -> Result<Vec<MediaItem>> {
        let state = self.state.lock().await;
        let session_first = state.session_first_id.clone();
        let reference_ts = state.session_reference_ts;
        let capacity = state.queue.capacity();
        drop(state);

        let threshold_ts = threshold.timestamp();
        let mut found = Vec::new();
        let mut cursor: Option<PageCursor> = None;
        let bound = max_iterations(capacity);

        'probe: for _ in 0..bound {
            let mut request =
                self.build_request(capacity as u32, cursor.as_ref(), OrderDirection::Desc);
            // The probe is always temporal regardless of configured order
            request.order_by = OrderField::DateTaken;
            let mut batch = self.fetch_page(&request).await?;
            if batch.is_empty() {
                break;
            }
            batch.sort_by(|a, b| {
                compare_items(a, b, OrderField::DateTaken, OrderDirection::Desc)
            });

            for item in &batch {
                if Some(&item.id) == session_first.as_ref() {
                    break 'probe;
                }
                let ts = item.effective_timestamp();
                if ts < threshold_ts || reference_ts.is_some_and(|r| ts < r) {
                    break 'probe;
                }
                if !self.ctx.history.contains_id(&item.id)
                    && !self.ctx.exclusions.contains(&item.id)
                {
                    found.push(item.clone());
                }
            }
            cursor = batch
                .last()
                .map(|item| PageCursor::from_item(item, OrderField::DateTaken));
        }

        Ok(found)
    }

    async fn prepend(&self, items: Vec<MediaItem>) {
        let mut state = self.state.lock().await;
        state.queue.prepend(items);
    }

    async fn rescan(&self, _current_id: Option<&str>) -> Result<RescanOutcome> {
        let mut state = self.state.lock().await;
        let previous_first = state.queue.first_id();
        state.queue.clear();
        state.cursor = None;
        state.has_more = true;
        state.looped = false;
        self.refill(&mut state).await?;
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
        state.cursor = None;
        state.has_more = true;
        state.looped = false;
        self.refill(&mut state).await
    }

    fn set_auto_loop(&self, enabled: bool) {
        self.auto_loop.store(enabled, Ordering::SeqCst);
    }

    fn queue_len(&self) -> usize {
        self.state
            .try_lock()
            .map(|state| state.queue.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::shared_filters;
    use crate::models::ResolvedFilters;
    use crate::navigation::exclusion::ExclusionRegistry;
    use crate::provider::traits::EmptyHistory;
    use framecast_hub::MockHubClient;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn row(ts: i64, name: &str) -> Value {
        json!({
            "path": format!("/photos/{name}"),
            "media_source_uri": format!("media-source://media_source/photos/{name}"),
            "filename": name,
            "date_taken": ts,
        })
    }

    /// Twelve rows, timestamps 100 down to 89, with a tie at 94.
    fn library() -> Vec<Value> {
        let mut rows = vec![
            row(100, "l.jpg"),
            row(99, "k.jpg"),
            row(98, "j.jpg"),
            row(97, "i.jpg"),
            row(96, "h.jpg"),
            row(94, "g.jpg"),
            row(94, "f.jpg"),
            row(93, "e.jpg"),
            row(92, "d.jpg"),
            row(91, "c.jpg"),
            row(90, "b.jpg"),
            row(89, "a.jpg"),
        ];
        // Serve in backend order: (date_taken desc, id desc)
        rows.sort_by(|a, b| {
            let ta = a["date_taken"].as_i64().unwrap();
            let tb = b["date_taken"].as_i64().unwrap();
            tb.cmp(&ta).then_with(|| {
                b["media_source_uri"]
                    .as_str()
                    .unwrap()
                    .cmp(a["media_source_uri"].as_str().unwrap())
            })
        });
        rows
    }

    /// Mock index serving `library()` with proper strictly-after cursor
    /// semantics for (date_taken desc, id desc).
    fn index_hub() -> MockHubClient {
        let mut hub = MockHubClient::new();
        hub.expect_call_service()
            .returning(|_domain, service, data, _rr| {
                assert_eq!(service, SVC_GET_ORDERED_FILES);
                let count = data["count"].as_u64().unwrap() as usize;
                let after_value = data.get("after_value").and_then(Value::as_i64);
                let after_id = data.get("after_id").and_then(Value::as_str);

                let rows: Vec<Value> = library()
                    .into_iter()
                    .filter(|row| match (after_value, after_id) {
                        (Some(av), Some(ai)) => {
                            let ts = row["date_taken"].as_i64().unwrap();
                            let id = row["media_source_uri"].as_str().unwrap();
                            ts < av || (ts == av && id < ai)
                        }
                        _ => true,
                    })
                    .take(count)
                    .collect();
                Ok(json!({ "items": rows }))
            });
        hub
    }

    fn provider(window: usize, hub: MockHubClient) -> MediaIndexSequential {
        let config = CardConfig {
            folder: crate::config::FolderConfig {
                path: Some("/photos".to_string()),
                ..crate::config::FolderConfig::default()
            },
            slideshow_window: window,
            ..CardConfig::default()
        };
        let ctx = ProviderContext::new(
            Arc::new(hub),
            Arc::new(EmptyHistory),
            Arc::new(ExclusionRegistry::new()),
        );
        MediaIndexSequential::new(&config, ctx, shared_filters(ResolvedFilters::default()))
    }

    async fn drain(provider: &MediaIndexSequential, n: usize) -> Vec<i64> {
        let mut out = Vec::new();
        for _ in 0..n {
            match provider.next().await.unwrap() {
                Some(item) => out.push(item.effective_timestamp()),
                None => break,
            }
        }
        out
    }

    #[tokio::test]
    async fn test_pagination_no_duplicates_no_gaps() {
        let provider = provider(5, index_hub());
        provider.initialize().await.unwrap();
        provider.set_auto_loop(false);

        let timestamps = drain(&provider, 12).await;
        assert_eq!(timestamps, vec![100, 99, 98, 97, 96, 94, 94, 93, 92, 91, 90, 89]);
        // Exhausted without looping
        assert!(provider.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tie_broken_by_id() {
        let provider = provider(5, index_hub());
        provider.initialize().await.unwrap();
        provider.set_auto_loop(false);

        let mut ids = Vec::new();
        for _ in 0..7 {
            if let Some(item) = provider.next().await.unwrap() {
                ids.push(item.metadata.filename.clone().unwrap_or_default());
            }
        }
        // Descending tie at 94: g before f by reversed id order
        assert_eq!(ids[5], "g.jpg");
        assert_eq!(ids[6], "f.jpg");
    }

    #[tokio::test]
    async fn test_loop_back_clears_cursor_and_exclusions() {
        let provider = provider(5, index_hub());
        provider.initialize().await.unwrap();

        let first = provider.next().await.unwrap().unwrap();
        assert_eq!(first.effective_timestamp(), 100);

        // Drain the remaining 11, then the next call loops
        let drained = drain(&provider, 11).await;
        assert_eq!(drained.len(), 11);

        let looped = provider.next().await.unwrap().unwrap();
        assert_eq!(looped.effective_timestamp(), 100);
    }

    #[tokio::test]
    async fn test_auto_loop_suppression_returns_none() {
        let provider = provider(5, index_hub());
        provider.initialize().await.unwrap();
        provider.set_auto_loop(false);
        drain(&provider, 12).await;
        assert!(provider.next().await.unwrap().is_none());

        provider.set_auto_loop(true);
        assert!(provider.next().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_undated_rows_stabilized_and_cursor_recomputed() {
        // Rows where one item lacks date_taken entirely but has
        // modified_time; the client-side sort must place it by fallback
        // and the cursor must match the sorted tail.
        let mut hub = MockHubClient::new();
        hub.expect_call_service().returning(|_d, _s, data, _rr| {
            let after = data.get("after_value").and_then(Value::as_i64);
            if after.is_none() {
                Ok(json!({
                    "items": [
                        {"path": "/p/x.jpg", "date_taken": 50},
                        {"path": "/p/y.jpg", "modified_time": 80},
                        {"path": "/p/z.jpg", "date_taken": 70},
                    ]
                }))
            } else {
                // Second request must start strictly after the sorted tail
                assert_eq!(after, Some(50));
                Ok(json!({ "items": [] }))
            }
        });
        let provider = provider(3, hub);
        provider.initialize().await.unwrap();
        provider.set_auto_loop(false);

        let timestamps = drain(&provider, 4).await;
        assert_eq!(timestamps, vec![80, 70, 50]);
    }

    #[tokio::test]
    async fn test_empty_with_filters_is_no_matching_items() {
        let mut hub = MockHubClient::new();
        hub.expect_call_service()
            .returning(|_d, _s, _data, _rr| Ok(json!({ "items": [] })));
        let config = CardConfig {
            folder: crate::config::FolderConfig {
                path: Some("/photos".to_string()),
                ..crate::config::FolderConfig::default()
            },
            slideshow_window: 5,
            ..CardConfig::default()
        };
        let ctx = ProviderContext::new(
            Arc::new(hub),
            Arc::new(EmptyHistory),
            Arc::new(ExclusionRegistry::new()),
        );
        let filters = shared_filters(ResolvedFilters {
            favorites_only: Some(true),
            date_from: None,
            date_to: None,
        });
        let provider = MediaIndexSequential::new(&config, ctx, filters);

        let err = provider.initialize().await.unwrap_err();
        assert!(matches!(err, ProviderError::NoMatchingItems));
    }
}
