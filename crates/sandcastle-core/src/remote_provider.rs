//! Provider implementation shared by every backend.
//!
//! A [`RemoteProvider`] holds at most one session. Session state lives
//! behind a synchronous mutex that is never held across an await, so the
//! accessors (`sandbox_url`, `sandbox_info`, `is_alive`) stay I/O-free.

use crate::config::SandboxProviderConfig;
use crate::error::{CoreError, Result};
use crate::provider::{Reconnectable, SandboxProvider};
use crate::providers::{BackendProfile, WorkdirStrategy};
use crate::readiness::{poll_until, PollOutcome, TOOLING_POLL_CEILING, TOOLING_POLL_INTERVAL};
use crate::scaffold;
use crate::shell;
use crate::types::{CommandResult, ProviderCapabilities, ProviderTag, SandboxInfo};
use async_trait::async_trait;
use chrono::Utc;
use sandcastle_remote::{CommandSpec, ExecOutput, RemoteApi, RemoteError, SessionRequest};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Lines returned by [`SandboxProvider::dev_server_log`].
const DEV_SERVER_LOG_LINES: u32 = 200;

/// Local view of the live session.
#[derive(Debug, Clone)]
struct ActiveSession {
    info: SandboxInfo,
    home_dir: Option<String>,
    /// Resolved working directory, once known.
    workdir: Option<String>,
}

/// Directories and files this provider believes exist remotely.
///
/// Only used to skip redundant `mkdir` calls; never consulted for reads.
#[derive(Debug, Default)]
struct ShadowFiles {
    dirs: HashSet<String>,
    files: HashSet<String>,
}

/// A [`SandboxProvider`] over any [`RemoteApi`], shaped by a
/// [`BackendProfile`].
pub struct RemoteProvider {
    profile: BackendProfile,
    api: Arc<dyn RemoteApi>,
    config: SandboxProviderConfig,
    tooling_credential: Option<String>,
    session: Mutex<Option<ActiveSession>>,
    shadow: Mutex<ShadowFiles>,
}

impl RemoteProvider {
    /// Create a provider with no session.
    pub fn new(profile: BackendProfile, api: Arc<dyn RemoteApi>, config: SandboxProviderConfig) -> Self {
        tracing::debug!(
            backend = %profile.tag,
            api = api.backend(),
            port = config.port,
            "Provider created"
        );
        Self {
            profile,
            api,
            config,
            tooling_credential: None,
            session: Mutex::new(None),
            shadow: Mutex::new(ShadowFiles::default()),
        }
    }

    /// Credential handed to the tooling installer.
    pub fn with_tooling_credential(mut self, credential: Option<String>) -> Self {
        self.tooling_credential = credential;
        self
    }

    /// Get the effective configuration.
    pub fn config(&self) -> &SandboxProviderConfig {
        &self.config
    }

    /// Get the backend profile.
    pub fn profile(&self) -> &BackendProfile {
        &self.profile
    }

    /// Paths written through this provider during the current session,
    /// relative to the working directory when inside it.
    pub fn known_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self.shadow().files.iter().cloned().collect();
        files.sort();
        files
    }

    fn state(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn shadow(&self) -> MutexGuard<'_, ShadowFiles> {
        self.shadow.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Id of the live session.
    fn session_id(&self) -> Result<String> {
        self.state()
            .as_ref()
            .map(|s| s.info.sandbox_id.clone())
            .ok_or(CoreError::NoActiveSession)
    }

    /// Await a remote call under `limit`, mapping timeouts.
    async fn call<T, F>(&self, limit: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = sandcastle_remote::Result<T>>,
    {
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(RemoteError::Timeout(waited))) => Err(CoreError::Timeout(waited)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                tracing::warn!(backend = %self.profile.tag, timeout_ms = limit.as_millis() as u64, "Remote call timed out");
                Err(CoreError::Timeout(limit))
            }
        }
    }

    async fn exec(&self, id: &str, command: &CommandSpec, limit: Duration) -> Result<ExecOutput> {
        tracing::debug!(sandbox_id = %id, cmd = %command, "Executing command");
        let out = self.call(limit, self.api.exec(id, command)).await?;
        tracing::debug!(
            sandbox_id = %id,
            exit_code = out.exit_code,
            stdout_len = out.stdout.len(),
            stderr_len = out.stderr.len(),
            "Command completed"
        );
        Ok(out)
    }

    /// Resolve the working directory of session `id`.
    async fn workdir(&self, id: &str) -> Result<String> {
        if let Some(dir) = &self.config.working_directory {
            return Ok(dir.clone());
        }
        let home_dir = {
            let state = self.state();
            let session = state.as_ref().ok_or(CoreError::NoActiveSession)?;
            if let Some(dir) = &session.workdir {
                return Ok(dir.clone());
            }
            session.home_dir.clone()
        };

        let dir = match self.profile.workdir {
            WorkdirStrategy::Fixed(dir) => dir.to_string(),
            WorkdirStrategy::HomeRelative { subdir, fallback } => match home_dir {
                Some(home) => shell::resolve_path(&home, subdir),
                None => fallback.to_string(),
            },
            WorkdirStrategy::Probed { subdir } => {
                let out = self
                    .exec(id, &CommandSpec::new("pwd"), self.config.timeout)
                    .await?;
                let base = out.stdout.trim();
                if !out.success() || !base.starts_with('/') {
                    return Err(CoreError::Provisioning(format!(
                        "could not determine working directory: {}",
                        out.stderr.trim()
                    )));
                }
                shell::resolve_path(base, subdir)
            }
        };

        let mut state = self.state();
        if let Some(session) = state.as_mut().filter(|s| s.info.sandbox_id == id) {
            session.workdir = Some(dir.clone());
        }
        tracing::debug!(sandbox_id = %id, workdir = %dir, "Working directory resolved");
        Ok(dir)
    }

    /// Make sure `dir` exists, skipping directories already created.
    async fn ensure_dir(&self, id: &str, dir: &str) -> Result<()> {
        if self.shadow().dirs.contains(dir) {
            return Ok(());
        }

        let mut created = false;
        if let Some(fs) = self.api.filesystem() {
            match self.call(self.config.timeout, fs.make_dir(id, dir)).await {
                Ok(()) => created = true,
                Err(CoreError::Remote(e)) if e.is_already_exists() => created = true,
                Err(CoreError::Timeout(d)) => return Err(CoreError::Timeout(d)),
                Err(e) => {
                    tracing::warn!(sandbox_id = %id, path = %dir, error = %e, "Native mkdir failed, falling back to mkdir -p");
                }
            }
        }

        if !created {
            let out = self.exec(id, &shell::mkdir_p(dir), self.config.timeout).await?;
            if !out.success() {
                return Err(CoreError::FileWrite {
                    path: dir.to_string(),
                    reason: out.stderr.trim().to_string(),
                });
            }
        }

        let mut shadow = self.shadow();
        let mut current = Some(dir);
        while let Some(path) = current {
            if !shadow.dirs.insert(path.to_string()) {
                break;
            }
            current = shell::parent_dir(path);
        }
        Ok(())
    }

    /// Allocate the session and record it locally.
    async fn open_session(&self) -> Result<SandboxInfo> {
        let request = SessionRequest {
            template: self.config.template.clone(),
            ports: vec![self.config.port],
            lifetime: self.config.session_lifetime,
        };
        let session = match self.call(self.config.timeout, self.api.create_session(&request)).await {
            Ok(session) => session,
            Err(CoreError::Remote(e)) => {
                tracing::error!(backend = %self.profile.tag, error = %e, "Session creation failed");
                return Err(CoreError::Provisioning(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        let info = match self.describe(&session.id).await {
            Ok(info) => info,
            Err(e) => {
                self.destroy_quietly(&session.id).await;
                return Err(e);
            }
        };
        *self.state() = Some(ActiveSession {
            info: info.clone(),
            home_dir: session.home_dir,
            workdir: None,
        });
        Ok(info)
    }

    /// Build [`SandboxInfo`] for session `id`, resolving its preview URL.
    async fn describe(&self, id: &str) -> Result<SandboxInfo> {
        let host = self
            .call(self.config.timeout, self.api.preview_host(id, self.config.port))
            .await?;
        let url = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("https://{host}")
        };
        Ok(SandboxInfo {
            sandbox_id: id.to_string(),
            url,
            provider: self.profile.tag,
            created_at: Utc::now(),
        })
    }

    /// Make the session usable: tooling first, then the working directory.
    async fn prepare(&self, id: &str) -> Result<()> {
        self.ensure_tooling(id).await?;
        let workdir = self.workdir(id).await?;
        self.ensure_dir(id, &workdir).await
    }

    /// Poll the tooling status command, installing once if it never
    /// becomes ready.
    async fn ensure_tooling(&self, id: &str) -> Result<()> {
        let Some(tooling) = self.profile.tooling else {
            return Ok(());
        };
        let status = (tooling.status)();
        let timeout = self.config.timeout;
        let this = self;
        let status_ref = &status;

        let outcome = poll_until(TOOLING_POLL_INTERVAL, TOOLING_POLL_CEILING, move || async move {
            let out = this.exec(id, status_ref, timeout).await?;
            Ok::<_, CoreError>((out.success(), out))
        })
        .await?;
        if let PollOutcome::Ready { attempts, .. } = outcome {
            tracing::info!(sandbox_id = %id, attempts, "Tooling ready");
            return Ok(());
        }

        tracing::warn!(
            sandbox_id = %id,
            ceiling_ms = TOOLING_POLL_CEILING.as_millis() as u64,
            "Tooling not ready, running installer"
        );
        let credential = self.tooling_credential.as_deref().unwrap_or_default();
        let install = self
            .exec(id, &(tooling.install)(credential), self.config.install_timeout)
            .await?;
        if !install.success() {
            tracing::warn!(sandbox_id = %id, exit_code = install.exit_code, stderr = %install.stderr.trim(), "Tooling installer failed");
        }

        let last = self.exec(id, &status, timeout).await?;
        if last.success() {
            tracing::info!(sandbox_id = %id, "Tooling ready after install");
            Ok(())
        } else {
            Err(CoreError::ToolingUnavailable {
                stdout: last.stdout,
                stderr: last.stderr,
            })
        }
    }

    async fn destroy_quietly(&self, id: &str) {
        match self.call(self.config.timeout, self.api.destroy_session(id)).await {
            Ok(()) => tracing::debug!(sandbox_id = %id, "Remote session destroyed"),
            Err(e) => tracing::warn!(sandbox_id = %id, error = %e, "Failed to destroy remote session"),
        }
    }

    /// Drop local state and destroy the session, if any.
    async fn close_session(&self) -> Option<String> {
        let previous = self.state().take();
        *self.shadow() = ShadowFiles::default();
        let id = previous?.info.sandbox_id;
        self.destroy_quietly(&id).await;
        Some(id)
    }

    fn install_command(&self, packages: &[String], workdir: &str) -> CommandSpec {
        CommandSpec::new("npm")
            .arg("install")
            .args(packages.iter().cloned())
            .args(self.config.install.flags())
            .cwd(workdir)
    }
}

#[async_trait]
impl SandboxProvider for RemoteProvider {
    fn tag(&self) -> ProviderTag {
        self.profile.tag
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            native_filesystem: self.api.filesystem().is_some(),
            reconnect: self.profile.reconnect,
            tooling_bootstrap: self.profile.tooling.is_some(),
        }
    }

    async fn create_sandbox(&self) -> Result<SandboxInfo> {
        let start = std::time::Instant::now();
        if let Some(previous) = self.close_session().await {
            tracing::info!(sandbox_id = %previous, "Replaced previous session");
        }
        tracing::info!(backend = %self.profile.tag, port = self.config.port, "Creating sandbox");

        let info = self.open_session().await?;
        if let Err(e) = self.prepare(&info.sandbox_id).await {
            tracing::error!(sandbox_id = %info.sandbox_id, error = %e, "Sandbox preparation failed");
            self.close_session().await;
            return Err(e);
        }

        tracing::info!(
            sandbox_id = %info.sandbox_id,
            url = %info.url,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Sandbox ready"
        );
        Ok(info)
    }

    async fn run_command(&self, command: CommandSpec) -> Result<CommandResult> {
        let id = self.session_id()?;
        let workdir = self.workdir(&id).await?;
        let out = self
            .exec(&id, &command.cwd_or(workdir), self.config.timeout)
            .await?;
        Ok(out.into())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let id = self.session_id()?;
        let workdir = self.workdir(&id).await?;
        let full = shell::resolve_path(&workdir, path);
        tracing::debug!(sandbox_id = %id, path = %full, content_len = content.len(), "Writing file");

        if let Some(parent) = shell::parent_dir(&full) {
            self.ensure_dir(&id, parent).await?;
        }

        if let Some(fs) = self.api.filesystem() {
            match self
                .call(self.config.timeout, fs.write_file(&id, &full, content.as_bytes()))
                .await
            {
                Ok(()) => {}
                Err(CoreError::Remote(RemoteError::Api { body, .. })) => {
                    return Err(CoreError::FileWrite { path: full, reason: body });
                }
                Err(e) => return Err(e),
            }
        } else {
            for chunk in shell::write_base64(&full, content.as_bytes()) {
                let out = self.exec(&id, &chunk, self.config.timeout).await?;
                if !out.success() {
                    return Err(CoreError::FileWrite {
                        path: full,
                        reason: out.stderr.trim().to_string(),
                    });
                }
            }
        }

        let known = shell::relative_to(&workdir, &full).unwrap_or(&full).to_string();
        self.shadow().files.insert(known);
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let id = self.session_id()?;
        let workdir = self.workdir(&id).await?;
        let full = shell::resolve_path(&workdir, path);
        tracing::debug!(sandbox_id = %id, path = %full, "Reading file");

        if let Some(fs) = self.api.filesystem() {
            return match self.call(self.config.timeout, fs.read_file(&id, &full)).await {
                Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
                Err(CoreError::Remote(RemoteError::Api { body, .. })) => {
                    Err(CoreError::FileNotFound { path: full, stderr: body })
                }
                Err(e) => Err(e),
            };
        }

        let out = self.exec(&id, &shell::cat(&full), self.config.timeout).await?;
        if !out.success() {
            return Err(CoreError::FileNotFound {
                path: full,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out.stdout)
    }

    async fn list_files(&self, directory: Option<&str>) -> Result<Vec<String>> {
        let id = self.session_id()?;
        let workdir = self.workdir(&id).await?;
        let dir = directory
            .map(|d| shell::resolve_path(&workdir, d))
            .unwrap_or(workdir);

        let out = self.exec(&id, &shell::find_files(&dir), self.config.timeout).await?;
        if !out.success() {
            return Err(CoreError::FileNotFound {
                path: dir,
                stderr: out.stderr.trim().to_string(),
            });
        }
        let files = shell::parse_file_listing(&out.stdout);
        tracing::trace!(sandbox_id = %id, count = files.len(), "Files listed");
        Ok(files)
    }

    async fn install_packages(&self, packages: &[String]) -> Result<CommandResult> {
        let id = self.session_id()?;
        let workdir = self.workdir(&id).await?;
        tracing::info!(sandbox_id = %id, packages = ?packages, "Installing packages");

        let out = self
            .exec(&id, &self.install_command(packages, &workdir), self.config.install_timeout)
            .await?;
        let result = CommandResult::from(out);
        if !result.success {
            tracing::warn!(sandbox_id = %id, exit_code = result.exit_code, "Package install failed");
            return Ok(result);
        }
        if self.config.install.auto_restart {
            self.restart_vite_server().await?;
        }
        Ok(result)
    }

    async fn setup_vite_app(&self) -> Result<()> {
        let id = self.session_id()?;
        let start = std::time::Instant::now();
        tracing::info!(sandbox_id = %id, "Scaffolding Vite app");

        for file in scaffold::vite_app(self.config.port, self.profile.preview_hosts) {
            self.write_file(file.path, &file.content).await?;
        }

        let workdir = self.workdir(&id).await?;
        let out = self
            .exec(&id, &self.install_command(&[], &workdir), self.config.install_timeout)
            .await?;
        if !out.success() {
            return Err(CoreError::Provisioning(format!(
                "npm install failed with exit code {}: {}",
                out.exit_code,
                out.stderr.trim()
            )));
        }

        self.restart_vite_server().await?;
        tracing::info!(
            sandbox_id = %id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Vite app ready"
        );
        Ok(())
    }

    async fn restart_vite_server(&self) -> Result<()> {
        let id = self.session_id()?;
        let workdir = self.workdir(&id).await?;
        let dev = &self.config.dev_server;
        let port = self.config.port;
        tracing::info!(sandbox_id = %id, port, "Restarting dev server");

        // pkill exits 1 when nothing matched
        let kill = CommandSpec::new("pkill").args(["-f", "vite"]);
        let out = self.exec(&id, &kill, self.config.timeout).await?;
        if out.exit_code > 1 {
            tracing::warn!(sandbox_id = %id, exit_code = out.exit_code, stderr = %out.stderr.trim(), "pkill failed");
        }
        tokio::time::sleep(dev.settle_delay).await;

        let start = CommandSpec::new("npm")
            .args(["run", "dev"])
            .cwd(workdir)
            .detached(dev.log_path.clone());
        let out = self.exec(&id, &start, self.config.timeout).await?;
        if !out.success() {
            tracing::warn!(sandbox_id = %id, exit_code = out.exit_code, stderr = %out.stderr.trim(), "Dev server start returned nonzero");
        }

        let probe = CommandSpec::new("curl")
            .args(["-s", "-o", "/dev/null", "-w", "%{http_code}"])
            .arg(format!("http://localhost:{port}/"));
        let timeout = self.config.timeout;
        let this = self;
        let id_ref = id.as_str();
        let probe_ref = &probe;
        let outcome = poll_until(dev.probe_interval, dev.startup_delay, move || async move {
            let out = this.exec(id_ref, probe_ref, timeout).await?;
            let status = out.stdout.trim().parse::<u16>().unwrap_or(0);
            Ok::<_, CoreError>((out.success() && (200..400).contains(&status), status))
        })
        .await?;

        match outcome {
            PollOutcome::Ready { attempts, .. } => {
                tracing::info!(sandbox_id = %id, port, attempts, "Dev server answering");
                Ok(())
            }
            PollOutcome::Exhausted { last, .. } => {
                tracing::warn!(sandbox_id = %id, port, last_status = ?last, "Dev server not ready");
                Err(CoreError::DevServerNotReady {
                    port,
                    waited: dev.startup_delay,
                })
            }
        }
    }

    async fn dev_server_log(&self) -> Result<String> {
        let id = self.session_id()?;
        let path = self.config.dev_server.log_path.clone();
        let tail = CommandSpec::new("tail")
            .arg("-n")
            .arg(DEV_SERVER_LOG_LINES.to_string())
            .arg(path.as_str());
        let out = self.exec(&id, &tail, self.config.timeout).await?;
        if !out.success() {
            return Err(CoreError::FileNotFound {
                path,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out.stdout)
    }

    fn sandbox_url(&self) -> Option<String> {
        self.state().as_ref().map(|s| s.info.url.clone())
    }

    fn sandbox_info(&self) -> Option<SandboxInfo> {
        self.state().as_ref().map(|s| s.info.clone())
    }

    async fn terminate(&self) {
        match self.close_session().await {
            Some(id) => tracing::info!(sandbox_id = %id, backend = %self.profile.tag, "Sandbox terminated"),
            None => tracing::debug!(backend = %self.profile.tag, "Terminate called without a session"),
        }
    }

    fn is_alive(&self) -> bool {
        self.state().is_some()
    }

    fn as_reconnectable(&self) -> Option<&dyn Reconnectable> {
        self.profile.reconnect.then_some(self as &dyn Reconnectable)
    }
}

#[async_trait]
impl Reconnectable for RemoteProvider {
    async fn reconnect(&self, sandbox_id: &str) -> Result<SandboxInfo> {
        if !self.profile.reconnect {
            return Err(RemoteError::Unsupported("reconnect").into());
        }
        tracing::info!(sandbox_id = %sandbox_id, backend = %self.profile.tag, "Reconnecting to sandbox");

        let session = self
            .call(self.config.timeout, self.api.connect_session(sandbox_id))
            .await?;
        let info = self.describe(&session.id).await?;

        let previous = self.state().replace(ActiveSession {
            info: info.clone(),
            home_dir: session.home_dir,
            workdir: None,
        });
        *self.shadow() = ShadowFiles::default();
        if let Some(previous) = previous.filter(|p| p.info.sandbox_id != info.sandbox_id) {
            self.destroy_quietly(&previous.info.sandbox_id).await;
        }

        tracing::info!(sandbox_id = %info.sandbox_id, url = %info.url, "Reconnected to sandbox");
        Ok(info)
    }
}
