// Hub Event Shapes
//
// Entity states arrive over the same channel as everything else; the
// transport only supports a single global state_changed stream, so
// consumers route by entity_id themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type fired on the hub bus with queue statistics, consumable by
/// template sensors on the hub side.
pub const QUEUE_STATS_EVENT: &str = "media_card_queue_stats";

/// Snapshot of a hub entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,

    /// Raw state string as the hub reports it ("on", "2024-05-01", "42.5", ...)
    pub state: String,

    #[serde(default)]
    pub attributes: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<DateTime<Utc>>,
}

impl EntityState {
    #[must_use]
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Value::Null,
            last_changed: None,
        }
    }

    /// Domain portion of the entity id (`input_boolean.foo` -> `input_boolean`)
    #[must_use]
    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or("")
    }
}

/// A single state_changed occurrence from the global event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedEvent {
    pub entity_id: String,
    pub old_state: Option<EntityState>,
    pub new_state: Option<EntityState>,
}
