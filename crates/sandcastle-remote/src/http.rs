//! REST client for sandbox gateways.
//!
//! Backends are not called directly. Each one sits behind a gateway that
//! exposes the resource layout below; backends differ only in gateway URL,
//! authentication and whether the file routes are available.
//!
//! | Operation | Route |
//! |-----------|-------|
//! | create | `POST /sessions` |
//! | connect | `GET /sessions/{id}` |
//! | destroy | `DELETE /sessions/{id}` |
//! | exec | `POST /sessions/{id}/exec` |
//! | preview host | `GET /sessions/{id}/ports/{port}` |
//! | mkdir | `POST /sessions/{id}/fs/dirs` |
//! | write / read | `PUT` / `GET /sessions/{id}/fs/files?path=...` |

use crate::api::{RemoteApi, RemoteFilesystem, RemoteSession, SessionRequest};
use crate::command::{CommandSpec, ExecOutput};
use crate::error::{RemoteError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("sandcastle/", env!("CARGO_PKG_VERSION"));

/// Default timeout for a single HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// How requests authenticate against the backend.
#[derive(Clone)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// API key in a custom header.
    ApiKeyHeader {
        /// Header name
        header: String,
        /// Key value
        key: String,
    },
    /// Token id/secret pair sent as HTTP basic auth.
    TokenPair {
        /// Token id
        id: String,
        /// Token secret
        secret: String,
    },
}

impl std::fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => write!(f, "Bearer(***)"),
            Self::ApiKeyHeader { header, .. } => write!(f, "ApiKeyHeader({header}: ***)"),
            Self::TokenPair { id, .. } => write!(f, "TokenPair({id}:***)"),
        }
    }
}

/// Configuration for [`HttpApi`].
#[derive(Debug, Clone)]
pub struct HttpApiConfig {
    /// Backend name used in logs.
    pub backend: String,
    /// Base URL of the gateway, e.g. `https://sandboxes.internal/e2b`.
    pub base_url: String,
    /// Authentication scheme.
    pub auth: AuthScheme,
    /// Whether the native file routes are available.
    pub native_fs: bool,
    /// Timeout applied to each HTTP request.
    pub request_timeout: Duration,
    /// Extra headers sent with every request (team or project scoping).
    pub headers: Vec<(String, String)>,
}

impl HttpApiConfig {
    /// Create a config with the default request timeout and no file routes.
    pub fn new(backend: impl Into<String>, base_url: impl Into<String>, auth: AuthScheme) -> Self {
        Self {
            backend: backend.into(),
            base_url: base_url.into(),
            auth,
            native_fs: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            headers: Vec::new(),
        }
    }

    /// Enable the native file routes.
    pub fn with_native_fs(mut self, enabled: bool) -> Self {
        self.native_fs = enabled;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// HTTP implementation of [`RemoteApi`].
pub struct HttpApi {
    client: Client,
    base: Url,
    config: HttpApiConfig,
}

impl HttpApi {
    /// Build a client for the given backend.
    pub fn new(config: HttpApiConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            RemoteError::InvalidCommand(format!("invalid base URL {:?}: {e}", config.base_url))
        })?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::InvalidCommand(format!(
                "base URL cannot carry paths: {}",
                config.base_url
            )));
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;
        tracing::debug!(backend = %config.backend, base_url = %base, "HTTP backend client created");
        Ok(Self {
            client,
            base,
            config,
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &HttpApiConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut builder = self.client.request(method, self.endpoint(segments));
        for (name, value) in &self.config.headers {
            builder = builder.header(name.as_str(), value);
        }
        match &self.config.auth {
            AuthScheme::Bearer(token) => builder.bearer_auth(token),
            AuthScheme::ApiKeyHeader { header, key } => builder.header(header.as_str(), key),
            AuthScheme::TokenPair { id, secret } => builder.basic_auth(id, Some(secret)),
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout(self.config.request_timeout)
            } else {
                RemoteError::Http(e)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!(
                backend = %self.config.backend,
                status = status.as_u16(),
                body = %body,
                "Backend returned error status"
            );
            return Err(RemoteError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[derive(Debug, Deserialize)]
struct PreviewHostResponse {
    host: String,
}

#[async_trait]
impl RemoteApi for HttpApi {
    fn backend(&self) -> &str {
        &self.config.backend
    }

    async fn create_session(&self, request: &SessionRequest) -> Result<RemoteSession> {
        tracing::debug!(backend = %self.config.backend, ports = ?request.ports, "Creating remote session");
        let resp = self
            .send(self.request(Method::POST, &["sessions"]).json(request))
            .await?;
        let session: RemoteSession = resp.json().await?;
        tracing::debug!(backend = %self.config.backend, session_id = %session.id, "Remote session created");
        Ok(session)
    }

    async fn connect_session(&self, session_id: &str) -> Result<RemoteSession> {
        tracing::debug!(backend = %self.config.backend, session_id = %session_id, "Connecting to remote session");
        match self
            .send(self.request(Method::GET, &["sessions", session_id]))
            .await
        {
            Ok(resp) => Ok(resp.json().await?),
            Err(e) if e.is_not_found() => Err(RemoteError::SessionNotFound(session_id.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn destroy_session(&self, session_id: &str) -> Result<()> {
        tracing::debug!(backend = %self.config.backend, session_id = %session_id, "Destroying remote session");
        match self
            .send(self.request(Method::DELETE, &["sessions", session_id]))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!(session_id = %session_id, "Session already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn exec(&self, session_id: &str, command: &CommandSpec) -> Result<ExecOutput> {
        let line = command.to_shell_line()?;
        tracing::debug!(backend = %self.config.backend, session_id = %session_id, cmd = %command, "Executing remote command");
        tracing::trace!(line = %line, "Remote command line");
        let body = serde_json::json!({
            "command": line,
            "background": command.is_detached(),
        });
        let resp = self
            .send(
                self.request(Method::POST, &["sessions", session_id, "exec"])
                    .json(&body),
            )
            .await?;
        let output: ExecOutput = resp.json().await?;
        tracing::debug!(
            session_id = %session_id,
            exit_code = output.exit_code,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "Remote command completed"
        );
        Ok(output)
    }

    async fn preview_host(&self, session_id: &str, port: u16) -> Result<String> {
        let port = port.to_string();
        let resp = self
            .send(self.request(Method::GET, &["sessions", session_id, "ports", &port]))
            .await?;
        let host: PreviewHostResponse = resp.json().await?;
        Ok(host.host)
    }

    fn filesystem(&self) -> Option<&dyn RemoteFilesystem> {
        if self.config.native_fs {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl RemoteFilesystem for HttpApi {
    async fn make_dir(&self, session_id: &str, path: &str) -> Result<()> {
        tracing::trace!(session_id = %session_id, path = %path, "Creating remote directory");
        self.send(
            self.request(Method::POST, &["sessions", session_id, "fs", "dirs"])
                .json(&serde_json::json!({ "path": path })),
        )
        .await?;
        Ok(())
    }

    async fn write_file(&self, session_id: &str, path: &str, content: &[u8]) -> Result<()> {
        tracing::trace!(session_id = %session_id, path = %path, size = content.len(), "Writing remote file");
        self.send(
            self.request(Method::PUT, &["sessions", session_id, "fs", "files"])
                .query(&[("path", path)])
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(content.to_vec()),
        )
        .await?;
        Ok(())
    }

    async fn read_file(&self, session_id: &str, path: &str) -> Result<Vec<u8>> {
        tracing::trace!(session_id = %session_id, path = %path, "Reading remote file");
        let resp = self
            .send(
                self.request(Method::GET, &["sessions", session_id, "fs", "files"])
                    .query(&[("path", path)]),
            )
            .await?;
        Ok(resp.bytes().await?.to_vec())
    }
}
