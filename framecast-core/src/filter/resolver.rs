// Filter Resolver
//
// Resolves filter configuration against live entity states and watches
// for changes. The transport only offers one global state_changed stream,
// so routing is a tagged dispatch keyed by entity id: the stream handler
// does a set lookup and forwards matches, and the re-resolution work
// happens on a task, never in the event callback.
//
// Each accepted change bumps a monotonic epoch; consumers drop in-flight
// results that carry an older epoch.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use framecast_hub::{EntityState, HubClientArc, Subscription};

use crate::models::filter::{is_entity_reference, FavoritesFilter, FilterSpec};
use crate::models::{ResolvedFilters, SharedFilters};

/// A filter change accepted after structural comparison
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChange {
    pub filters: ResolvedFilters,
    pub epoch: u64,
}

pub struct FilterResolver {
    hub: HubClientArc,
    spec: FilterSpec,
    shared: SharedFilters,
    epoch: Arc<AtomicU64>,
    /// Entity ids this resolver routes on
    watched: Arc<DashMap<String, ()>>,
    subscription: parking_lot::Mutex<Option<Subscription>>,
    task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl FilterResolver {
    #[must_use]
    pub fn new(hub: HubClientArc, spec: FilterSpec, shared: SharedFilters) -> Self {
        let watched = Arc::new(DashMap::new());
        for entity in spec.referenced_entities() {
            watched.insert(entity, ());
        }
        Self {
            hub,
            spec,
            shared,
            epoch: Arc::new(AtomicU64::new(0)),
            watched,
            subscription: parking_lot::Mutex::new(None),
            task: parking_lot::Mutex::new(None),
        }
    }

    /// Current filter epoch; responses carrying an older value are stale.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Resolve every slot and publish into the shared filter state.
    /// Called once before the provider's first fetch.
    pub async fn prime(&self) -> ResolvedFilters {
        let resolved = self.resolve_all().await;
        *self.shared.write() = resolved.clone();
        resolved
    }

    /// Resolve the full spec against current entity states.
    pub async fn resolve_all(&self) -> ResolvedFilters {
        let favorites_only = match &self.spec.favorites {
            None => None,
            Some(FavoritesFilter::Static(on)) => Some(*on),
            Some(FavoritesFilter::Entity(id)) => self.resolve_bool_entity(id).await,
        };
        let (date_from, date_to) = match &self.spec.date_range {
            None => (None, None),
            Some(range) => (
                self.resolve_date_slot(range.start.as_deref()).await,
                self.resolve_date_slot(range.end.as_deref()).await,
            ),
        };
        ResolvedFilters {
            favorites_only,
            date_from,
            date_to,
        }
    }

    async fn entity_state(&self, entity_id: &str) -> Option<EntityState> {
        match self.hub.get_state(entity_id).await {
            Ok(Some(state)) => {
                let lowered = state.state.to_lowercase();
                if lowered == "unknown" || lowered == "unavailable" {
                    return None;
                }
                Some(state)
            }
            Ok(None) => {
                tracing::debug!(entity_id, "filter entity missing, filter not applied");
                None
            }
            Err(err) => {
                tracing::debug!(entity_id, error = %err, "filter entity read failed");
                None
            }
        }
    }

    async fn resolve_bool_entity(&self, entity_id: &str) -> Option<bool> {
        let state = self.entity_state(entity_id).await?;
        match state.domain() {
            "input_boolean" => Some(state.state == "on"),
            // text helpers carry the raw state; it has to already be a
            // recognizable boolean form
            "input_text" | "input_select" => parse_bool(&state.state),
            // sensors are parsed per the slot's expected type
            "sensor" => parse_bool(&state.state),
            other => {
                tracing::debug!(
                    entity_id,
                    domain = other,
                    "unsupported domain for boolean filter, not applied"
                );
                None
            }
        }
    }

    async fn resolve_date_slot(&self, slot: Option<&str>) -> Option<String> {
        let slot = slot?;
        if !is_entity_reference(slot) {
            return Some(slot.to_string());
        }
        let state = self.entity_state(slot).await?;
        match state.domain() {
            // input_datetime may carry a time portion; keep the date
            "input_datetime" => date_portion(&state.state),
            // text helpers pass their raw state through uncoerced
            "input_text" | "input_select" => Some(state.state.clone()),
            // sensors are parsed per the slot's expected type
            "sensor" => date_portion(&state.state),
            other => {
                tracing::debug!(
                    entity_id = slot,
                    domain = other,
                    "unsupported domain for date filter, not applied"
                );
                None
            }
        }
    }

    /// Subscribe to the state stream and return a channel of accepted
    /// filter changes. Change detection is structural: only genuinely
    /// different resolutions are forwarded.
    pub fn watch(self: Arc<Self>) -> mpsc::UnboundedReceiver<FilterChange> {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        if self.watched.is_empty() {
            // Purely static filters never change
            return change_rx;
        }

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<String>();
        let watched = self.watched.clone();
        let subscription = self.hub.subscribe_state_changes(Arc::new(move |event| {
            if watched.contains_key(&event.entity_id) {
                let _ = event_tx.send(event.entity_id);
            }
        }));
        *self.subscription.lock() = Some(subscription);

        let resolver = Arc::clone(&self);
        let task = tokio::spawn(async move {
            while let Some(entity_id) = event_rx.recv().await {
                let resolved = resolver.resolve_all().await;
                let changed = {
                    let current = resolver.shared.read();
                    *current != resolved
                };
                if !changed {
                    continue;
                }
                let epoch = resolver.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                *resolver.shared.write() = resolved.clone();
                tracing::info!(entity_id = %entity_id, epoch, "filter values changed");
                if change_tx
                    .send(FilterChange {
                        filters: resolved,
                        epoch,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });
        *self.task.lock() = Some(task);
        change_rx
    }

    /// Drop the stream subscription and the routing task.
    pub fn dispose(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for FilterResolver {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for FilterResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterResolver")
            .field("watched", &self.watched.len())
            .field("epoch", &self.epoch())
            .finish()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// `YYYY-MM-DD` prefix of a state that may carry a time portion
fn date_portion(raw: &str) -> Option<String> {
    let candidate = raw
        .split(|c| c == ' ' || c == 'T')
        .next()
        .unwrap_or(raw);
    (candidate.len() == 10 && candidate.chars().filter(|c| *c == '-').count() == 2)
        .then(|| candidate.to_string())
}
