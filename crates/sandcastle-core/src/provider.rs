//! The provider contract every backend implements.

use crate::error::Result;
use crate::types::{CommandResult, ProviderCapabilities, ProviderTag, SandboxInfo};
use async_trait::async_trait;
use sandcastle_remote::CommandSpec;

/// A single-session adapter over one remote backend.
///
/// A provider owns at most one live session at a time. Every I/O operation
/// fails with [`CoreError::NoActiveSession`](crate::CoreError::NoActiveSession)
/// before [`create_sandbox`](Self::create_sandbox) or after
/// [`terminate`](Self::terminate).
///
/// Nonzero exits of commands are reported in [`CommandResult`]; only
/// infrastructure faults (no session, transport, timeout) are errors.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Backend family.
    fn tag(&self) -> ProviderTag;

    /// What this provider can do beyond the common contract.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Allocate a new session, destroying any previous one first.
    async fn create_sandbox(&self) -> Result<SandboxInfo>;

    /// Run a command in the working directory (unless it sets its own).
    async fn run_command(&self, command: CommandSpec) -> Result<CommandResult>;

    /// Write `content` to `path`, creating the parent directory.
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Read the full content of `path`.
    async fn read_file(&self, path: &str) -> Result<String>;

    /// Regular files under `directory` (default: working directory), relative
    /// to it and sorted. Dependency, build and VCS directories are skipped.
    async fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>>;

    /// `npm install` the named packages with the configured flags.
    ///
    /// Restarts the dev server after a successful install when auto-restart
    /// is enabled.
    async fn install_packages(&self, packages: &[String]) -> Result<CommandResult>;

    /// Scaffold the Vite + React app, install it and start the dev server.
    async fn setup_vite_app(&self) -> Result<()>;

    /// Kill the dev server, start it detached and wait until it answers.
    async fn restart_vite_server(&self) -> Result<()>;

    /// Tail of the dev-server log.
    async fn dev_server_log(&self) -> Result<String>;

    /// Preview URL of the live session. Never performs I/O.
    fn sandbox_url(&self) -> Option<String>;

    /// Info of the live session. Never performs I/O.
    fn sandbox_info(&self) -> Option<SandboxInfo>;

    /// Destroy the session. Idempotent; failures are logged, never returned,
    /// and local state is always cleared.
    async fn terminate(&self);

    /// Whether local session state is present. Does not contact the backend.
    fn is_alive(&self) -> bool;

    /// Reconnection support, for providers that have it.
    fn as_reconnectable(&self) -> Option<&dyn Reconnectable> {
        None
    }
}

/// Providers that can reattach to an existing session by id.
#[async_trait]
pub trait Reconnectable: Send + Sync {
    /// Attach to session `sandbox_id`, replacing any local session state.
    async fn reconnect(&self, sandbox_id: &str) -> Result<SandboxInfo>;
}
