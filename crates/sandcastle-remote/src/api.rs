//! Backend traits implemented by every remote compute service adapter.

use crate::command::{CommandSpec, ExecOutput};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters for allocating a remote session.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    /// Backend-specific image/template name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Ports the backend should expose publicly.
    pub ports: Vec<u16>,
    /// How long the backend should keep the session alive.
    #[serde(rename = "timeoutMs", serialize_with = "duration_ms")]
    pub lifetime: Duration,
}

fn duration_ms<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// A session allocated by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSession {
    /// Backend-assigned session identifier.
    pub id: String,
    /// Home directory of the session user, when the backend reports it.
    #[serde(default)]
    pub home_dir: Option<String>,
}

/// A remote compute service that hosts sessions.
///
/// Implementations are stateless with respect to sessions: every call names
/// the session it targets, so one client can serve any number of them.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Short backend name used in logs.
    fn backend(&self) -> &str;

    /// Allocate a new session.
    async fn create_session(&self, request: &SessionRequest) -> Result<RemoteSession>;

    /// Look up an existing session by id.
    async fn connect_session(&self, session_id: &str) -> Result<RemoteSession>;

    /// Destroy a session.
    async fn destroy_session(&self, session_id: &str) -> Result<()>;

    /// Run a command. A nonzero exit is reported in [`ExecOutput`], not as
    /// an error.
    async fn exec(&self, session_id: &str, command: &CommandSpec) -> Result<ExecOutput>;

    /// Public hostname that proxies `port` of the session.
    async fn preview_host(&self, session_id: &str, port: u16) -> Result<String>;

    /// Native filesystem API, when the backend offers one.
    fn filesystem(&self) -> Option<&dyn RemoteFilesystem> {
        None
    }
}

/// Native file operations offered by some backends.
#[async_trait]
pub trait RemoteFilesystem: Send + Sync {
    /// Create a directory and its parents.
    async fn make_dir(&self, session_id: &str, path: &str) -> Result<()>;

    /// Write `content` to `path`, replacing any existing file.
    async fn write_file(&self, session_id: &str, path: &str, content: &[u8]) -> Result<()>;

    /// Read the full content of `path`.
    async fn read_file(&self, session_id: &str, path: &str) -> Result<Vec<u8>>;
}
