//! Error types for sandcastle-core.

use thiserror::Error;

/// Result type alias for sandcastle-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur during sandbox operations.
///
/// A command that runs and exits nonzero is not an error; it is reported
/// through [`CommandResult`](crate::CommandResult). Variants here are
/// infrastructure faults the caller cannot inspect programmatically.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Operation needs a live session and there is none
    #[error("no active sandbox")]
    NoActiveSession,

    /// Backend could not allocate a session
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// Command-line tooling is still missing after the install fallback
    #[error("sandbox tooling unavailable: {stderr}{stdout}")]
    ToolingUnavailable {
        /// Stdout of the final status check
        stdout: String,
        /// Stderr of the final status check
        stderr: String,
    },

    /// Remote read failed
    #[error("file not found: {path}: {stderr}")]
    FileNotFound {
        /// Resolved remote path
        path: String,
        /// Remote stderr (or backend message)
        stderr: String,
    },

    /// Remote write or directory creation failed
    #[error("failed to write {path}: {reason}")]
    FileWrite {
        /// Resolved remote path
        path: String,
        /// Remote stderr (or backend message)
        reason: String,
    },

    /// Factory was asked for a provider it does not know
    #[error("unknown sandbox provider {name:?} (supported: {})", supported.join(", "))]
    UnknownProvider {
        /// Requested name
        name: String,
        /// Every supported name
        supported: Vec<String>,
    },

    /// Required configuration (usually a credential) is missing
    #[error("provider configuration error: {0}")]
    ProviderConfig(String),

    /// Remote call exceeded the configured timeout
    #[error("remote call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Dev server did not answer within the startup ceiling
    #[error("dev server on port {port} not ready after {waited:?}")]
    DevServerNotReady {
        /// Dev server port
        port: u16,
        /// Time spent probing
        waited: std::time::Duration,
    },

    /// Provider instance is already registered under another id
    #[error("provider already registered as {0}")]
    ProviderShared(String),

    /// Transport or backend failure
    #[error("remote error: {0}")]
    Remote(#[from] sandcastle_remote::RemoteError),
}
