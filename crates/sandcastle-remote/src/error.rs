//! Error types for sandcastle-remote.

use thiserror::Error;

/// Result type alias for sandcastle-remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Errors that can occur while talking to a remote compute backend.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level HTTP failure (connect, TLS, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body as returned by the backend
        body: String,
    },

    /// Backend session does not exist (or is no longer reachable)
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Command could not be rendered for the backend
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Operation is not offered by this backend
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout waiting for the backend
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl RemoteError {
    /// Status code carried by an [`RemoteError::Api`] answer, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the backend reported that the target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound(_)) || self.status() == Some(404)
    }

    /// True when the backend reported that the target already exists.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Api { status, body } => {
                *status == 409 || body.to_ascii_lowercase().contains("already exists")
            }
            _ => false,
        }
    }
}
