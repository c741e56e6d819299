// Hub Client Trait
//
// The engine never opens sockets itself; it is handed an implementation of
// `HubClient` by the host. Two primitives cross the wire: domain service
// calls and typed WebSocket-style commands. The media-source operations
// are typed wrappers that route through the WS channel by default, so a
// minimal transport only implements the primitives.

use crate::error::{HubError, Result};
use crate::events::{EntityState, StateChangedEvent};
use crate::media_source::{BrowsePage, ResolvedMedia};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// WS command type for browsing one level of a media-source tree
pub const WS_BROWSE_MEDIA: &str = "media_source/browse_media";

/// WS command type for resolving a media-content id to a playable URL
pub const WS_RESOLVE_MEDIA: &str = "media_source/resolve_media";

/// Callback invoked for every state_changed event on the global stream.
///
/// The transport cannot filter per entity; receivers route by
/// `event.entity_id` themselves.
pub type StateChangeHandler = Arc<dyn Fn(StateChangedEvent) + Send + Sync>;

/// Handle for an active event subscription.
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) detaches
/// the handler from the stream.
pub struct Subscription {
    unsub: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    #[must_use]
    pub fn new(unsub: Box<dyn FnOnce() + Send + Sync>) -> Self {
        Self { unsub: Some(unsub) }
    }

    /// Subscription that detaches nothing; for transports without
    /// server-side teardown and for test doubles.
    #[must_use]
    pub fn noop() -> Self {
        Self { unsub: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsub.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsub.take() {
            f();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsub.is_some())
            .finish()
    }
}

/// The opaque request/response channel to the hub.
///
/// `call_service` covers domain services (including the `media_index.*`
/// backend); `call_ws` covers typed WebSocket-style commands;
/// `browse_media`/`resolve_media` are the media-source protocol on top of
/// it; `get_state` and `subscribe_state_changes` cover entities.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Call a hub service. When `return_response` is set the hub echoes the
    /// service's response payload back; otherwise `Value::Null` is returned
    /// on success.
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Value,
        return_response: bool,
    ) -> Result<Value>;

    /// Send a typed WebSocket-style command (a message carrying a `type`
    /// field) and await its result payload.
    async fn call_ws(&self, message: Value) -> Result<Value>;

    /// Read the current state of a single entity. `Ok(None)` means the
    /// entity does not exist; transport failures are `Err`.
    async fn get_state(&self, entity_id: &str) -> Result<Option<EntityState>>;

    /// Fire an event on the hub bus.
    async fn fire_event(&self, event_type: &str, payload: Value) -> Result<()>;

    /// Attach a handler to the global state_changed stream.
    fn subscribe_state_changes(&self, handler: StateChangeHandler) -> Subscription;

    /// Browse one level of a media-source tree. Routed through the WS
    /// channel; transports with a dedicated endpoint may override.
    async fn browse_media(&self, media_content_id: &str) -> Result<BrowsePage> {
        let response = self
            .call_ws(json!({
                "type": WS_BROWSE_MEDIA,
                "media_content_id": media_content_id,
            }))
            .await?;
        serde_json::from_value(response).map_err(|err| HubError::Decode(err.to_string()))
    }

    /// Resolve a media-content id into a playable, time-bounded URL.
    /// Routed through the WS channel; transports may override.
    async fn resolve_media(&self, media_content_id: &str) -> Result<ResolvedMedia> {
        let response = self
            .call_ws(json!({
                "type": WS_RESOLVE_MEDIA,
                "media_content_id": media_content_id,
            }))
            .await?;
        serde_json::from_value(response).map_err(|err| HubError::Decode(err.to_string()))
    }
}

pub type HubClientArc = Arc<dyn HubClient>;
