// Subfolder Queue
//
// Filesystem-side provider for trees only reachable through per-folder
// browse calls: no aggregate counts, no index. Random mode samples files
// with a Bernoulli draw while walking the tree; sequential mode preserves
// discovery order and caps the walk at the slideshow window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

use framecast_hub::media_source::{
    classify_extension, decode_id, is_integration_uri, MediaClass,
};

use super::error::{ProviderError, Result};
use super::queue::ItemQueue;
use super::traits::{MediaProvider, ProviderContext, RescanOutcome};
use crate::config::{CardConfig, FolderMode, MediaTypeFilter, PriorityFolder};
use crate::models::{ContentType, MediaItem};

/// Concurrent browse calls during a scan
const SCAN_CONCURRENCY: usize = 3;

/// Per-folder browse budget; a slow folder is skipped, not fatal
const FOLDER_BROWSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Re-shuffle cadence so early folders do not dominate temporally
const RESHUFFLE_INTERVAL: usize = 10;

/// Sampling probability when no library-size estimate is configured
const DEFAULT_SELECTION_PROBABILITY: f64 = 0.1;

/// Bound on the reservoir of unsampled files kept for queue top-up
const FALLBACK_RESERVOIR_FACTOR: usize = 4;

/// FIFO-bounded set of ids already delivered this session
#[derive(Debug)]
struct ShownSet {
    ids: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl ShownSet {
    fn new(cap: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: String) {
        if self.ids.insert(id.clone()) {
            self.order.push_back(id);
            while self.order.len() > self.cap {
                if let Some(evicted) = self.order.pop_front() {
                    self.ids.remove(&evicted);
                }
            }
        }
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }
}

struct ScanState {
    queue: ItemQueue,
    shown: ShownSet,
    fallback: Vec<MediaItem>,
    rng: StdRng,
    /// Incremented per scan; a folder is visited at most once per epoch
    epoch: u64,
    scan_complete: bool,
    enqueued_since_shuffle: usize,
    files_seen: usize,
}

pub struct SubfolderQueue {
    ctx: ProviderContext,
    root: String,
    mode: FolderMode,
    media_type: MediaTypeFilter,
    scan_depth: Option<u32>,
    priority_folders: Vec<PriorityFolder>,
    estimated_total: Option<u64>,
    state: Mutex<ScanState>,
}

impl SubfolderQueue {
    pub fn new(config: &CardConfig, ctx: ProviderContext) -> Result<Self> {
        Self::with_seed(config, ctx, None)
    }

    /// Seeded constructor for deterministic sampling in tests.
    pub fn with_seed(
        config: &CardConfig,
        ctx: ProviderContext,
        seed: Option<u64>,
    ) -> Result<Self> {
        let root = config.folder.path.clone().ok_or_else(|| {
            ProviderError::InvalidConfig("folder mode requires folder.path".to_string())
        })?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let capacity = config.slideshow_window;
        Ok(Self {
            ctx,
            root,
            mode: config.folder.mode,
            media_type: config.media_type,
            scan_depth: config.folder.effective_scan_depth(),
            priority_folders: config.folder.priority_folders.clone(),
            estimated_total: config.folder.estimated_total_photos,
            state: Mutex::new(ScanState {
                queue: ItemQueue::new(capacity),
                shown: ShownSet::new(config.folder.max_shown_items_history),
                fallback: Vec::new(),
                rng,
                epoch: 0,
                scan_complete: false,
                enqueued_since_shuffle: 0,
                files_seen: 0,
            }),
        })
    }

    fn base_probability(&self) -> f64 {
        match self.estimated_total {
            Some(n) if n > 0 => (1.0 / n as f64).max(f64::MIN_POSITIVE),
            _ => DEFAULT_SELECTION_PROBABILITY,
        }
    }

    /// Weight of the first matching priority pattern; weights do not
    /// compound across nested matches.
    fn priority_weight(&self, folder_id: &str) -> f64 {
        let decoded = decode_id(folder_id);
        for priority in &self.priority_folders {
            if decoded.contains(&priority.pattern) {
                return priority.weight;
            }
        }
        1.0
    }

    fn wants(&self, content_type: ContentType) -> bool {
        match self.media_type {
            MediaTypeFilter::All => content_type != ContentType::Unknown,
            MediaTypeFilter::Image => content_type == ContentType::Image,
            MediaTypeFilter::Video => content_type == ContentType::Video,
        }
    }

    fn item_from_child(&self, child: &framecast_hub::media_source::BrowseChild) -> Option<MediaItem> {
        let content_type = match classify_extension(&child.media_content_id) {
            Some(kind) => ContentType::from(kind),
            // Integration ids may carry no extension; trust the media class
            None => match child.media_class {
                MediaClass::Image => ContentType::Image,
                MediaClass::Video => ContentType::Video,
                _ => return None,
            },
        };
        if !self.wants(content_type) {
            return None;
        }
        let mut item = MediaItem::from_id(child.media_content_id.clone());
        item.content_type = content_type;
        if item.metadata.filename.is_none() {
            item.metadata.filename = Some(child.title.clone());
        }
        Some(item)
    }

    /// One full scan epoch: walk the tree level by level with bounded
    /// concurrency, sampling files into the queue.
    async fn scan(&self, state: &mut ScanState) -> Result<()> {
        state.epoch += 1;
        state.scan_complete = false;
        state.fallback.clear();
        state.files_seen = 0;

        let mut visited: HashSet<String> = HashSet::new();
        let mut pending: Vec<(String, u32)> = vec![(self.root.clone(), 0)];
        let sequential = self.mode == FolderMode::Sequential;
        let fallback_cap = state.queue.capacity() * FALLBACK_RESERVOIR_FACTOR;
        let mut root_failed = false;

        while !pending.is_empty() && !state.queue.is_full() {
            let batch: Vec<(String, u32)> = pending
                .drain(..)
                .filter(|(id, _)| visited.insert(id.clone()))
                .collect();
            if batch.is_empty() {
                break;
            }

            let hub = self.ctx.hub.clone();
            let mut browses = futures::stream::iter(batch)
                .map(|(folder_id, depth)| {
                    let hub = hub.clone();
                    async move {
                        let result =
                            timeout(FOLDER_BROWSE_TIMEOUT, hub.browse_media(&folder_id)).await;
                        (folder_id, depth, result)
                    }
                })
                .buffer_unordered(SCAN_CONCURRENCY)
                .collect::<Vec<_>>()
                .await;

            // Keep results deterministic for a given browse order
            browses.sort_by(|a, b| a.0.cmp(&b.0));

            for (folder_id, depth, result) in browses {
                let page = match result {
                    Ok(Ok(page)) => page,
                    Ok(Err(err)) => {
                        if depth == 0 {
                            root_failed = true;
                        }
                        tracing::warn!(folder = %folder_id, error = %err, "folder browse failed, skipping");
                        continue;
                    }
                    Err(_) => {
                        if depth == 0 {
                            root_failed = true;
                        }
                        tracing::warn!(folder = %folder_id, "folder browse timed out, skipping");
                        continue;
                    }
                };

                let weight = self.priority_weight(&folder_id);
                for child in &page.children {
                    if child.can_expand {
                        let descend = match self.scan_depth {
                            Some(limit) => depth < limit,
                            None => true,
                        };
                        if descend && !is_leaf_only_source(&self.root) {
                            pending.push((child.media_content_id.clone(), depth + 1));
                        }
                        continue;
                    }

                    let Some(item) = self.item_from_child(child) else {
                        continue;
                    };
                    if state.shown.contains(&item.id)
                        || self.ctx.exclusions.contains(&item.id)
                        || self.ctx.history.contains_id(&item.id)
                        || state.queue.contains_id(&item.id)
                    {
                        continue;
                    }
                    state.files_seen += 1;

                    if sequential {
                        if state.queue.is_full() {
                            break;
                        }
                        state.queue.push_back(item);
                        continue;
                    }

                    let p = (self.base_probability() * weight).clamp(0.0, 1.0);
                    if state.rng.gen::<f64>() < p {
                        if state.queue.push_back(item) {
                            state.enqueued_since_shuffle += 1;
                            if state.enqueued_since_shuffle >= RESHUFFLE_INTERVAL {
                                state.queue.shuffle(&mut state.rng);
                                state.enqueued_since_shuffle = 0;
                            }
                        }
                    } else if state.fallback.len() < fallback_cap {
                        state.fallback.push(item);
                    }

                    if state.queue.is_full() {
                        break;
                    }
                }
            }
        }

        if root_failed && state.files_seen == 0 && state.queue.is_empty() {
            return Err(ProviderError::Transport(
                framecast_hub::HubError::MediaSource(format!(
                    "browse of {} failed",
                    self.root
                )),
            ));
        }

        // Tree exhausted before the window filled: draw the remainder from
        // the unsampled reservoir at random.
        if !sequential && !state.queue.is_full() && !state.fallback.is_empty() {
            let mut reservoir = std::mem::take(&mut state.fallback);
            use rand::seq::SliceRandom;
            reservoir.shuffle(&mut state.rng);
            for item in reservoir {
                if state.queue.is_full() {
                    break;
                }
                state.queue.push_back(item);
            }
        }

        state.scan_complete = true;
        tracing::debug!(
            epoch = state.epoch,
            queued = state.queue.len(),
            seen = state.files_seen,
            mode = ?self.mode,
            "subfolder scan complete"
        );
        Ok(())
    }

    async fn refill_if_needed(&self, state: &mut ScanState) -> Result<()> {
        if state.queue.below_refill_threshold() && state.scan_complete {
            self.scan(state).await?;
        }
        Ok(())
    }
}

/// Integration roots that only expose a flat listing are walked once;
/// their children never expand into further browse calls.
fn is_leaf_only_source(root: &str) -> bool {
    is_integration_uri(root)
}

#[async_trait]
impl MediaProvider for SubfolderQueue {
    fn name(&self) -> &'static str {
        "subfolder"
    }

    async fn initialize(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.queue.clear();
        state.shown.clear();
        self.scan(&mut state).await?;
        if state.queue.is_empty() {
            return Err(ProviderError::EmptyCollection);
        }
        Ok(())
    }

    async fn next(&self) -> Result<Option<MediaItem>> {
        let mut state = self.state.lock().await;
        if state.queue.is_empty() {
            self.scan(&mut state).await?;
        }
        let item = state.queue.pop_allowed(&self.ctx.exclusions);
        if let Some(item) = &item {
            state.shown.insert(item.id.clone());
        }
        self.refill_if_needed(&mut state).await?;
        Ok(item)
    }

    async fn peek(&self) -> Result<Option<MediaItem>> {
        let mut state = self.state.lock().await;
        Ok(state.queue.peek_allowed(&self.ctx.exclusions).cloned())
    }

    async fn files_newer_than(&self, _threshold: DateTime<Utc>) -> Result<Vec<MediaItem>> {
        // Browse children carry no timestamps; new files surface through
        // rescan instead.
        Ok(Vec::new())
    }

    async fn rescan(&self, _current_id: Option<&str>) -> Result<RescanOutcome> {
        let mut state = self.state.lock().await;
        let previous_first = state.queue.first_id();
        state.queue.clear();
        self.scan(&mut state).await?;
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
        state.shown.clear();
        state.fallback.clear();
        state.scan_complete = false;
        self.scan(&mut state).await?;
        Ok(())
    }

    fn queue_len(&self) -> usize {
        self.state
            .try_lock()
            .map(|state| state.queue.len())
            .unwrap_or(0)
    }
}
