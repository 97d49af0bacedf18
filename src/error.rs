//! Error types for the sync layer.

use thiserror::Error;

/// Errors surfaced by write and connection-test operations.
///
/// Missing configuration and failed reads are not represented here: both
/// degrade to `None` at the call site, since an unconfigured or offline
/// store is an expected steady state for the extension.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Sync cannot run because required settings are absent.
    #[error("GitHub sync is not configured: {0}")]
    NotConfigured(&'static str),

    /// GitHub rejected the request. The message is the human-readable
    /// `message` field from the API error body.
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Network-level failure before any HTTP status was received.
    #[error("network failure while contacting GitHub")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The highlights payload could not be serialized to JSON.
    #[error("cannot encode highlights payload")]
    Encode(#[source] serde_json::Error),

    /// GitHub returned a success status with a body we cannot parse.
    #[error("malformed response from GitHub: {0}")]
    MalformedResponse(String),
}

impl SyncError {
    /// Wrap an underlying transport error.
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(err))
    }
}
