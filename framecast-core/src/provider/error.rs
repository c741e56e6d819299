// Provider Error Types

use framecast_hub::HubError;

/// Provider-specific errors.
///
/// The first three kinds are terminal for `initialize` until the
/// configuration or filters change; transport errors leave existing queue
/// state intact and the next user action retries.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No items match the active filters")]
    NoMatchingItems,

    #[error("Media collection is empty")]
    EmptyCollection,

    #[error("Transport error: {0}")]
    Transport(#[from] HubError),

    #[error("Failed to resolve media: {0}")]
    Resolve(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// True for failures that should not be retried until config or
    /// filters change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::NoMatchingItems | Self::EmptyCollection
        )
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
