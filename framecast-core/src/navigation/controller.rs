//! Navigation controller: the card core.
//!
//! Owns the history, the auto-advance timer and the provider; everything
//! the renderer sees flows through the view-state watch channel.
//! Advances are serialized: concurrent requests collapse into at most one
//! in-flight advance, and a new one does not begin until the prior one
//! produced an item or failed.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use framecast_hub::HubClientArc;

use crate::config::{AutoAdvanceMode, CardConfig};
use crate::error::Result;
use crate::filter::FilterResolver;
use crate::models::{shared_filters, MediaItem, QueueStats, ResolvedFilters, StatsEmitter};
use crate::provider::{
    FolderProvider, MediaProvider, ProviderContext, ProviderError, RescanOutcome,
};

use super::exclusion::{ExclusionRegistry, ExclusionReason};
use super::history::SharedHistory;

/// Bad items skipped within a single advance before giving up
const MAX_SKIPS_PER_ADVANCE: usize = 10;

/// Cadence of the background new-file check when priorityNewFiles is on
const NEW_FILES_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);

/// What the renderer should display
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Loading,
    Showing { item: MediaItem, url: String },
    NoMoreItems,
    NoMatchingItems,
    EmptyCollection,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NavSource {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Copy)]
enum TimerCmd {
    Restart,
    Cancel,
    /// Visibility pause: keep the remaining interval
    Suspend,
    /// Visibility resume: continue from the remaining interval
    Resume,
}

struct Inner {
    provider: Arc<FolderProvider>,
    history: SharedHistory,
    exclusions: Arc<ExclusionRegistry>,
    resolver: Arc<FilterResolver>,
    stats: Arc<StatsEmitter>,

    auto_advance_seconds: Option<f64>,
    auto_advance_mode: AutoAdvanceMode,
    pause_on_interaction: bool,
    new_files_check: bool,

    advance_gate: Mutex<()>,
    user_paused: AtomicBool,
    visible: AtomicBool,
    retry_used: AtomicBool,

    view_tx: watch::Sender<ViewState>,
    timer_tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<TimerCmd>>>,
    cancel: CancellationToken,
    session_start: DateTime<Utc>,
}

#[derive(Clone)]
pub struct NavigationController {
    inner: Arc<Inner>,
}

impl NavigationController {
    pub fn new(config: &CardConfig, hub: HubClientArc) -> Result<Self> {
        config.validate()?;

        let exclusions = Arc::new(ExclusionRegistry::new());
        let history = SharedHistory::new(config.history_size);
        let filters = shared_filters(ResolvedFilters::default());
        let resolver = Arc::new(FilterResolver::new(
            hub.clone(),
            config.filters.clone(),
            filters.clone(),
        ));
        let stats = Arc::new(StatsEmitter::new(hub.clone()));
        let ctx = ProviderContext::new(hub, history.view(), exclusions.clone());
        let provider = Arc::new(FolderProvider::new(config, ctx, filters, stats.clone())?);

        let (view_tx, _) = watch::channel(ViewState::Loading);
        Ok(Self {
            inner: Arc::new(Inner {
                provider,
                history,
                exclusions,
                resolver,
                stats,
                auto_advance_seconds: config.auto_advance_seconds,
                auto_advance_mode: config.auto_advance_mode,
                pause_on_interaction: config.pause_on_interaction,
                new_files_check: config.folder.priority_new_files,
                advance_gate: Mutex::new(()),
                user_paused: AtomicBool::new(false),
                visible: AtomicBool::new(true),
                retry_used: AtomicBool::new(false),
                view_tx,
                timer_tx: parking_lot::Mutex::new(None),
                cancel: CancellationToken::new(),
                session_start: Utc::now(),
            }),
        })
    }

    /// Renderer-facing view state channel
    #[must_use]
    pub fn view(&self) -> watch::Receiver<ViewState> {
        self.inner.view_tx.subscribe()
    }

    /// Queue statistics channel
    #[must_use]
    pub fn queue_stats(&self) -> watch::Receiver<Option<QueueStats>> {
        self.inner.stats.subscribe()
    }

    #[must_use]
    pub fn current_item(&self) -> Option<MediaItem> {
        self.inner.history.with(|h| h.current().cloned())
    }

    /// Resolve filters, initialize the provider, start the filter watch
    /// and the auto-advance timer, and show the first item. Returns
    /// whether an item is on screen; empty/no-match results surface
    /// through the view state and keep the filter watch alive so a later
    /// filter change can recover.
    pub async fn start(&self) -> Result<bool> {
        self.inner.resolver.prime().await;
        self.spawn_filter_watch();
        self.spawn_timer();
        self.spawn_single_refresh();
        self.spawn_new_files_check();

        match self.inner.provider.initialize().await {
            Ok(()) => {
                self.advance_from(NavSource::Auto).await;
                Ok(matches!(
                    *self.inner.view_tx.borrow(),
                    ViewState::Showing { .. }
                ))
            }
            Err(err) => {
                tracing::warn!(error = %err, "provider initialization failed");
                self.set_failure_view(&err);
                Ok(false)
            }
        }
    }

    fn set_failure_view(&self, err: &ProviderError) {
        let state = match err {
            ProviderError::NoMatchingItems => ViewState::NoMatchingItems,
            ProviderError::EmptyCollection => ViewState::EmptyCollection,
            other => ViewState::Error(other.to_string()),
        };
        self.inner.view_tx.send_replace(state);
    }

    /// Manual forward navigation.
    pub async fn advance(&self) {
        self.apply_manual_timer_policy();
        self.advance_from(NavSource::Manual).await;
    }

    /// Manual backward navigation; a no-op at the beginning of history.
    pub async fn retreat(&self) {
        self.apply_manual_timer_policy();
        let item = self.inner.history.with_mut(|h| h.retreat());
        if let Some(item) = item {
            self.inner.retry_used.store(false, Ordering::SeqCst);
            self.show(item).await;
        }
    }

    async fn advance_from(&self, _source: NavSource) {
        // Collapse concurrent advances into the one in flight
        let Ok(_gate) = self.inner.advance_gate.try_lock() else {
            return;
        };

        // Replaying forward history takes priority over fresh dequeues
        let replay = self.inner.history.with_mut(|h| h.advance_replay());
        if let Some(item) = replay {
            self.inner.retry_used.store(false, Ordering::SeqCst);
            self.show(item).await;
            return;
        }

        for _ in 0..MAX_SKIPS_PER_ADVANCE {
            match self.inner.provider.next().await {
                Ok(Some(item)) => {
                    self.inner.history.with_mut(|h| h.push(item.clone()));
                    self.inner.retry_used.store(false, Ordering::SeqCst);
                    if self.show(item).await {
                        self.preload_next().await;
                        return;
                    }
                    // Resolve failed twice; item was excluded, try the next
                }
                Ok(None) => {
                    self.inner.view_tx.send_replace(ViewState::NoMoreItems);
                    return;
                }
                Err(err) => {
                    // Transport and friends: retain queue/state, surface
                    // once; the next user action retries.
                    tracing::warn!(error = %err, "advance failed");
                    self.set_failure_view(&err);
                    return;
                }
            }
        }
        self.inner.view_tx.send_replace(ViewState::NoMoreItems);
    }

    /// Resolve and publish. Returns false when the item had to be
    /// excluded (resolve failed twice).
    async fn show(&self, item: MediaItem) -> bool {
        let url = match self.inner.provider.resolve_url(&item).await {
            Ok(url) => url,
            Err(first_err) => {
                tracing::debug!(id = %item.id, error = %first_err, "resolve failed, retrying once");
                match self.inner.provider.resolve_url_fresh(&item).await {
                    Ok(url) => url,
                    Err(_second) => {
                        self.exclude_internal(&item.id, ExclusionReason::FileMissing);
                        return false;
                    }
                }
            }
        };
        self.inner
            .view_tx
            .send_replace(ViewState::Showing { item, url });
        true
    }

    /// Re-resolve the current item's URL without touching history.
    pub async fn reload_current(&self) {
        let Some(item) = self.current_item() else {
            return;
        };
        match self.inner.provider.resolve_url_fresh(&item).await {
            Ok(url) => {
                self.inner
                    .view_tx
                    .send_replace(ViewState::Showing { item, url });
            }
            Err(err) => {
                tracing::warn!(id = %item.id, error = %err, "reload failed");
            }
        }
    }

    /// Renderer reported a media load error on the current item: retry
    /// once by re-resolving, then exclude and move on.
    pub async fn on_media_error(&self) {
        let Some(item) = self.current_item() else {
            return;
        };
        if !self.inner.retry_used.swap(true, Ordering::SeqCst) {
            if let Ok(url) = self.inner.provider.resolve_url_fresh(&item).await {
                self.inner
                    .view_tx
                    .send_replace(ViewState::Showing { item, url });
                return;
            }
        }
        self.exclude(&item.id, ExclusionReason::FileMissing).await;
    }

    /// Exclude an item (404, delete, edit) and advance if it was on
    /// screen.
    pub async fn exclude(&self, id: &str, reason: ExclusionReason) {
        let was_current = self
            .current_item()
            .is_some_and(|current| current.id == id);
        self.exclude_internal(id, reason);
        if was_current {
            self.advance_from(NavSource::Auto).await;
        }
    }

    fn exclude_internal(&self, id: &str, reason: ExclusionReason) {
        self.inner.exclusions.insert(id, reason);
        self.inner.history.with_mut(|h| h.remove_id(id));
    }

    /// A video finishing playback counts as an auto-advance tick, except
    /// when the user explicitly paused.
    pub async fn on_video_finished(&self) {
        if self.inner.user_paused.load(Ordering::SeqCst) {
            return;
        }
        self.advance_from(NavSource::Auto).await;
    }

    /// User pause/resume of the slideshow.
    pub fn set_paused(&self, paused: bool) {
        self.inner.user_paused.store(paused, Ordering::SeqCst);
        self.send_timer(if paused {
            TimerCmd::Cancel
        } else {
            TimerCmd::Restart
        });
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.user_paused.load(Ordering::SeqCst)
    }

    /// User interaction hook (tap, zoom); pauses when configured to.
    pub fn on_interaction(&self) {
        if self.inner.pause_on_interaction {
            self.set_paused(true);
        }
    }

    /// Host view visibility. Hiding suspends the timer with its
    /// remaining interval; showing resumes from it rather than
    /// restarting.
    pub fn set_visible(&self, visible: bool) {
        self.inner.visible.store(visible, Ordering::SeqCst);
        self.send_timer(if visible {
            TimerCmd::Resume
        } else {
            TimerCmd::Suspend
        });
    }

    /// Periodic refresh: ask the provider for files newer than the
    /// session start and put them at the front of the queue. Deferred
    /// while the view is hidden.
    pub async fn refresh_new_files(&self) -> Result<usize> {
        if !self.inner.visible.load(Ordering::SeqCst) {
            return Ok(0);
        }
        let found = self
            .inner
            .provider
            .files_newer_than(self.inner.session_start)
            .await
            .map_err(crate::error::Error::from)?;
        let count = found.len();
        if count > 0 {
            tracing::info!(count, "new files discovered, prepending");
            self.inner.provider.prepend(found).await;
        }
        Ok(count)
    }

    /// Full rebuild of the provider queue.
    pub async fn rescan(&self) -> Result<RescanOutcome> {
        let current_id = self.current_item().map(|item| item.id);
        let outcome = self
            .inner
            .provider
            .rescan(current_id.as_deref())
            .await
            .map_err(crate::error::Error::from)?;
        Ok(outcome)
    }

    /// Filter change: drop everything shown so far and requery. The
    /// epoch gate drops this reload when a newer change already landed.
    async fn apply_filter_change(&self, epoch: u64) {
        self.inner.history.with_mut(|h| h.clear());
        self.inner.view_tx.send_replace(ViewState::Loading);

        let result = self.inner.provider.initialize().await;
        if self.inner.resolver.epoch() != epoch {
            tracing::debug!(epoch, "stale filter reload dropped");
            return;
        }
        match result {
            Ok(()) => {
                self.advance_from(NavSource::Auto).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "filter reload failed");
                self.set_failure_view(&err);
            }
        }
    }

    fn spawn_filter_watch(&self) {
        let mut changes = self.inner.resolver.clone().watch();
        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    change = changes.recv() => {
                        let Some(change) = change else { break };
                        let Some(controller) = revive(&weak) else { break };
                        controller.apply_filter_change(change.epoch).await;
                    }
                }
            }
        });
    }

    fn apply_manual_timer_policy(&self) {
        match self.inner.auto_advance_mode {
            AutoAdvanceMode::Reset => self.send_timer(TimerCmd::Restart),
            AutoAdvanceMode::Pause => self.send_timer(TimerCmd::Cancel),
            AutoAdvanceMode::Continue => {}
        }
    }

    fn send_timer(&self, cmd: TimerCmd) {
        if let Some(tx) = self.inner.timer_tx.lock().as_ref() {
            let _ = tx.send(cmd);
        }
    }

    fn spawn_timer(&self) {
        let Some(seconds) = self.inner.auto_advance_seconds else {
            return;
        };
        if seconds <= 0.0 {
            return;
        }
        let interval = std::time::Duration::from_secs_f64(seconds);
        let (tx, mut rx) = mpsc::unbounded_channel::<TimerCmd>();
        *self.inner.timer_tx.lock() = Some(tx);

        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        tokio::spawn(async move {
            let mut deadline = Some(tokio::time::Instant::now() + interval);
            let mut suspended_remaining: Option<std::time::Duration> = None;
            loop {
                let sleep_target =
                    deadline.unwrap_or_else(|| tokio::time::Instant::now() + interval);
                tokio::select! {
                    () = cancel.cancelled() => break,
                    cmd = rx.recv() => match cmd {
                        None => break,
                        Some(TimerCmd::Restart) => {
                            deadline = Some(tokio::time::Instant::now() + interval);
                            suspended_remaining = None;
                        }
                        Some(TimerCmd::Cancel) => {
                            deadline = None;
                            suspended_remaining = None;
                        }
                        Some(TimerCmd::Suspend) => {
                            if let Some(d) = deadline.take() {
                                suspended_remaining = Some(
                                    d.saturating_duration_since(tokio::time::Instant::now()),
                                );
                            }
                        }
                        Some(TimerCmd::Resume) => {
                            if let Some(remaining) = suspended_remaining.take() {
                                deadline = Some(tokio::time::Instant::now() + remaining);
                            }
                        }
                    },
                    () = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
                        deadline = Some(tokio::time::Instant::now() + interval);
                        let Some(controller) = revive(&weak) else { break };
                        controller.advance_from(NavSource::Auto).await;
                    }
                }
            }
        });
    }

    /// Single mode with refreshSeconds: re-resolve the same id on a
    /// clock, deferred while hidden.
    fn spawn_single_refresh(&self) {
        let Some(seconds) = self.inner.provider.refresh_seconds() else {
            return;
        };
        if seconds == 0 {
            return;
        }
        let interval = std::time::Duration::from_secs(seconds);
        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {
                        let Some(controller) = revive(&weak) else { break };
                        if controller.inner.visible.load(Ordering::SeqCst) {
                            controller.reload_current().await;
                        }
                    }
                }
            }
        });
    }

    /// Background new-file detection; only runs when the novelty
    /// preference is configured.
    fn spawn_new_files_check(&self) {
        if !self.inner.new_files_check {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(NEW_FILES_CHECK_INTERVAL) => {
                        let Some(controller) = revive(&weak) else { break };
                        if let Err(err) = controller.refresh_new_files().await {
                            tracing::debug!(error = %err, "new-file check failed");
                        }
                    }
                }
            }
        });
    }

    /// Eagerly resolve the upcoming item's URL so the renderer can swap
    /// without a round-trip. Runs under the advance gate, with looping
    /// suppressed so a spurious end-of-sequence cannot trigger a full
    /// loop.
    async fn preload_next(&self) {
        self.inner.provider.set_auto_loop(false);
        let upcoming = self.inner.provider.peek().await;
        self.inner.provider.set_auto_loop(true);
        if let Ok(Some(item)) = upcoming {
            if let Err(err) = self.inner.provider.resolve_url(&item).await {
                tracing::debug!(id = %item.id, error = %err, "preload resolve failed");
            }
        }
    }

    /// Tear down: timer, filter subscription, provider.
    pub async fn dispose(&self) {
        self.inner.cancel.cancel();
        *self.inner.timer_tx.lock() = None;
        self.inner.resolver.dispose();
        self.inner.provider.dispose().await;
    }
}

impl std::fmt::Debug for NavigationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationController")
            .field("paused", &self.is_paused())
            .finish()
    }
}

fn revive(weak: &Weak<Inner>) -> Option<NavigationController> {
    weak.upgrade().map(|inner| NavigationController { inner })
}
