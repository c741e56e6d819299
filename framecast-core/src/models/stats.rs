//! Queue statistics.
//!
//! A pure value object with a single emitter: observers inside the
//! process get a watch channel, external sensors get the hub bus event.
//! The stats shape is not coupled to the transport event format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use framecast_hub::{HubClientArc, QUEUE_STATS_EVENT};

use super::filter::ResolvedFilters;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub active_filters: Vec<String>,
    pub filter_config: Value,
    pub timestamp: DateTime<Utc>,
}

impl QueueStats {
    #[must_use]
    pub fn snapshot(queue_size: usize, queue_capacity: usize, filters: &ResolvedFilters) -> Self {
        Self {
            queue_size,
            queue_capacity,
            active_filters: filters
                .active_filter_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            filter_config: serde_json::to_value(filters).unwrap_or(Value::Null),
            timestamp: Utc::now(),
        }
    }
}

/// Emits queue statistics to both channels.
pub struct StatsEmitter {
    hub: HubClientArc,
    tx: watch::Sender<Option<QueueStats>>,
}

impl StatsEmitter {
    #[must_use]
    pub fn new(hub: HubClientArc) -> Self {
        let (tx, _) = watch::channel(None);
        Self { hub, tx }
    }

    /// Latest-value channel for in-process observers (overlays, tests)
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<QueueStats>> {
        self.tx.subscribe()
    }

    /// Publish a snapshot. Bus delivery is best-effort; a transport
    /// failure only logs.
    pub async fn emit(&self, stats: QueueStats) {
        let payload = serde_json::to_value(&stats).unwrap_or(Value::Null);
        self.tx.send_replace(Some(stats));
        if let Err(err) = self.hub.fire_event(QUEUE_STATS_EVENT, payload).await {
            tracing::debug!(error = %err, "queue stats event not delivered");
        }
    }
}

impl std::fmt::Debug for StatsEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsEmitter").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_captures_active_filters() {
        let filters = ResolvedFilters {
            favorites_only: Some(true),
            date_from: Some("2024-01-01".to_string()),
            date_to: None,
        };
        let stats = QueueStats::snapshot(7, 100, &filters);
        assert_eq!(stats.queue_size, 7);
        assert_eq!(stats.queue_capacity, 100);
        assert_eq!(stats.active_filters, vec!["favorites", "date_range"]);
        assert_eq!(stats.filter_config["favorites_only"], serde_json::json!(true));
    }
}
