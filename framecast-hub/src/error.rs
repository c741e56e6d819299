// Hub Error Types

/// Transport-level errors for hub round-trips
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Service call failed: {0}")]
    ServiceCall(String),

    #[error("WebSocket request failed: {0}")]
    WebSocket(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Media source error: {0}")]
    MediaSource(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HubError>;
