//! Provider configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults, or assembled with [`SandboxProviderConfig::builder`].

use crate::error::CoreError;
use crate::types::ProviderTag;
use std::collections::BTreeMap;
use std::time::Duration;

/// Default dev-server port (Vite's default).
pub const DEFAULT_PORT: u16 = 5173;

/// Default timeout for a single remote call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default timeout for dependency installation.
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Default lifetime requested for new sessions.
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Default pause between killing and restarting the dev server.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Default ceiling for the dev server to start answering.
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(7);

/// Default interval between dev-server readiness probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(500);

/// Default dev-server log file inside the session.
pub const DEFAULT_DEV_SERVER_LOG: &str = "/tmp/vite.log";

/// Credentials for every backend. Any subset may be present.
#[derive(Clone, Default)]
pub struct Credentials {
    /// `E2B_API_KEY`
    pub e2b_api_key: Option<String>,
    /// `VERCEL_TOKEN`
    pub vercel_token: Option<String>,
    /// `VERCEL_TEAM_ID`
    pub vercel_team_id: Option<String>,
    /// `VERCEL_PROJECT_ID`
    pub vercel_project_id: Option<String>,
    /// `DAYTONA_API_KEY`
    pub daytona_api_key: Option<String>,
    /// `MODAL_TOKEN_ID`
    pub modal_token_id: Option<String>,
    /// `MODAL_TOKEN_SECRET`
    pub modal_token_secret: Option<String>,
    /// `COMPUTE_API_KEY`
    pub compute_api_key: Option<String>,
}

impl Credentials {
    /// Whether every credential `tag` needs is present.
    pub fn has(&self, tag: ProviderTag) -> bool {
        self.missing(tag).is_empty()
    }

    /// Fail with [`CoreError::ProviderConfig`] naming the missing variables.
    pub fn require(&self, tag: ProviderTag) -> Result<(), CoreError> {
        let missing = self.missing(tag);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ProviderConfig(format!(
                "{tag} requires {}",
                missing.join(", ")
            )))
        }
    }

    fn missing(&self, tag: ProviderTag) -> Vec<&'static str> {
        let required: Vec<(&'static str, &Option<String>)> = match tag {
            ProviderTag::E2b => vec![("E2B_API_KEY", &self.e2b_api_key)],
            ProviderTag::Vercel => vec![("VERCEL_TOKEN", &self.vercel_token)],
            ProviderTag::Daytona => vec![("DAYTONA_API_KEY", &self.daytona_api_key)],
            ProviderTag::Modal => vec![
                ("MODAL_TOKEN_ID", &self.modal_token_id),
                ("MODAL_TOKEN_SECRET", &self.modal_token_secret),
            ],
            ProviderTag::Compute => vec![("COMPUTE_API_KEY", &self.compute_api_key)],
        };
        required
            .into_iter()
            .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| name)
            .collect()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown: Vec<&str> = ProviderTag::ALL
            .iter()
            .filter(|t| self.has(**t))
            .map(|t| t.as_str())
            .collect();
        f.debug_struct("Credentials")
            .field("configured", &shown)
            .finish()
    }
}

/// Options for `npm install`.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Pass `--legacy-peer-deps` (default: true).
    pub legacy_peer_deps: bool,
    /// Extra flags, each passed as one argument.
    pub extra_flags: Vec<String>,
    /// Restart the dev server after a successful install (default: true).
    pub auto_restart: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            legacy_peer_deps: true,
            extra_flags: Vec::new(),
            auto_restart: true,
        }
    }
}

impl InstallOptions {
    /// Flags appended to every install command.
    pub fn flags(&self) -> Vec<String> {
        let mut flags = Vec::with_capacity(self.extra_flags.len() + 1);
        if self.legacy_peer_deps {
            flags.push("--legacy-peer-deps".to_string());
        }
        flags.extend(self.extra_flags.iter().cloned());
        flags
    }
}

/// Dev-server supervision timings.
#[derive(Debug, Clone)]
pub struct DevServerOptions {
    /// Pause after killing the old server.
    pub settle_delay: Duration,
    /// Ceiling for the new server to answer.
    pub startup_delay: Duration,
    /// Interval between readiness probes.
    pub probe_interval: Duration,
    /// Log file inside the session.
    pub log_path: String,
}

impl Default for DevServerOptions {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            startup_delay: DEFAULT_STARTUP_DELAY,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            log_path: DEFAULT_DEV_SERVER_LOG.to_string(),
        }
    }
}

/// Per-backend settings that take precedence over the shared ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendOverrides {
    /// `<BACKEND>_TIMEOUT_MS`
    pub timeout: Option<Duration>,
    /// `<BACKEND>_STARTUP_DELAY_MS`
    pub startup_delay: Option<Duration>,
    /// `<BACKEND>_API_URL`
    pub api_url: Option<String>,
}

/// Configuration passed to providers at construction.
#[derive(Debug, Clone)]
pub struct SandboxProviderConfig {
    /// Provider name (`SANDBOX_PROVIDER`).
    pub provider: Option<String>,
    /// Backend credentials.
    pub credentials: Credentials,
    /// Working directory override.
    pub working_directory: Option<String>,
    /// Dev-server port (default: 5173).
    pub port: u16,
    /// Timeout for a single remote call (default: 120s).
    pub timeout: Duration,
    /// Timeout for dependency installation (default: 300s).
    pub install_timeout: Duration,
    /// Lifetime requested for new sessions (default: 30 min).
    pub session_lifetime: Duration,
    /// Backend template / image name.
    pub template: Option<String>,
    /// Gateway URL override for the selected backend.
    pub api_url: Option<String>,
    /// Dependency installation options.
    pub install: InstallOptions,
    /// Dev-server supervision options.
    pub dev_server: DevServerOptions,
    /// Per-backend overrides, applied by [`for_backend`](Self::for_backend).
    pub backend_overrides: BTreeMap<ProviderTag, BackendOverrides>,
}

impl Default for SandboxProviderConfig {
    fn default() -> Self {
        Self {
            provider: None,
            credentials: Credentials::default(),
            working_directory: None,
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            install_timeout: DEFAULT_INSTALL_TIMEOUT,
            session_lifetime: DEFAULT_SESSION_LIFETIME,
            template: None,
            api_url: None,
            install: InstallOptions::default(),
            dev_server: DevServerOptions::default(),
            backend_overrides: BTreeMap::new(),
        }
    }
}

impl SandboxProviderConfig {
    /// Create a new config builder.
    pub fn builder() -> SandboxProviderConfigBuilder {
        SandboxProviderConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SANDBOX_PROVIDER` | factory default |
    /// | `SANDBOX_WORKING_DIRECTORY` | backend default |
    /// | `SANDBOX_PORT` | `5173` |
    /// | `SANDBOX_TIMEOUT_MS` | `120000` |
    /// | `SANDBOX_INSTALL_TIMEOUT_MS` | `300000` |
    /// | `SANDBOX_LIFETIME_MS` | `1800000` |
    /// | `SANDBOX_TEMPLATE` | backend default |
    /// | `SANDBOX_LEGACY_PEER_DEPS` | `true` |
    /// | `SANDBOX_INSTALL_FLAGS` | empty |
    /// | `SANDBOX_AUTO_RESTART` | `true` |
    /// | `SANDBOX_SETTLE_DELAY_MS` | `2000` |
    /// | `SANDBOX_STARTUP_DELAY_MS` | `7000` |
    /// | `<BACKEND>_TIMEOUT_MS` | shared timeout |
    /// | `<BACKEND>_STARTUP_DELAY_MS` | shared startup delay |
    /// | `<BACKEND>_API_URL` | none, required by the HTTP backends |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let millis = |key: &str| {
            var(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
        };
        let flag = |key: &str, default: bool| {
            var(key)
                .map(|v| v != "false" && v != "0")
                .unwrap_or(default)
        };

        let credentials = Credentials {
            e2b_api_key: var("E2B_API_KEY"),
            vercel_token: var("VERCEL_TOKEN"),
            vercel_team_id: var("VERCEL_TEAM_ID"),
            vercel_project_id: var("VERCEL_PROJECT_ID"),
            daytona_api_key: var("DAYTONA_API_KEY"),
            modal_token_id: var("MODAL_TOKEN_ID"),
            modal_token_secret: var("MODAL_TOKEN_SECRET"),
            compute_api_key: var("COMPUTE_API_KEY"),
        };

        let backend_overrides = ProviderTag::ALL
            .iter()
            .filter_map(|tag| {
                let prefix = tag.env_prefix();
                let overrides = BackendOverrides {
                    timeout: millis(&format!("{prefix}_TIMEOUT_MS")),
                    startup_delay: millis(&format!("{prefix}_STARTUP_DELAY_MS")),
                    api_url: var(&format!("{prefix}_API_URL")),
                };
                (overrides != BackendOverrides::default()).then_some((*tag, overrides))
            })
            .collect();

        Self {
            provider: var("SANDBOX_PROVIDER"),
            credentials,
            working_directory: var("SANDBOX_WORKING_DIRECTORY"),
            port: var("SANDBOX_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default.port),
            timeout: millis("SANDBOX_TIMEOUT_MS").unwrap_or(default.timeout),
            install_timeout: millis("SANDBOX_INSTALL_TIMEOUT_MS").unwrap_or(default.install_timeout),
            session_lifetime: millis("SANDBOX_LIFETIME_MS").unwrap_or(default.session_lifetime),
            template: var("SANDBOX_TEMPLATE"),
            api_url: None,
            install: InstallOptions {
                legacy_peer_deps: flag("SANDBOX_LEGACY_PEER_DEPS", default.install.legacy_peer_deps),
                extra_flags: var("SANDBOX_INSTALL_FLAGS")
                    .map(|v| v.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
                auto_restart: flag("SANDBOX_AUTO_RESTART", default.install.auto_restart),
            },
            dev_server: DevServerOptions {
                settle_delay: millis("SANDBOX_SETTLE_DELAY_MS")
                    .unwrap_or(default.dev_server.settle_delay),
                startup_delay: millis("SANDBOX_STARTUP_DELAY_MS")
                    .unwrap_or(default.dev_server.startup_delay),
                ..default.dev_server
            },
            backend_overrides,
        }
    }

    /// Effective configuration for `tag`, with its overrides applied.
    pub fn for_backend(&self, tag: ProviderTag) -> Self {
        let mut config = self.clone();
        if let Some(overrides) = self.backend_overrides.get(&tag) {
            if let Some(timeout) = overrides.timeout {
                config.timeout = timeout;
            }
            if let Some(delay) = overrides.startup_delay {
                config.dev_server.startup_delay = delay;
            }
            if let Some(url) = &overrides.api_url {
                config.api_url = Some(url.clone());
            }
        }
        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.port == 0 {
            return Err(CoreError::ProviderConfig("port must be > 0".into()));
        }
        if self.timeout.is_zero() {
            return Err(CoreError::ProviderConfig("timeout must be > 0".into()));
        }
        if self.dev_server.probe_interval.is_zero() {
            return Err(CoreError::ProviderConfig(
                "probe interval must be > 0".into(),
            ));
        }
        if let Some(dir) = &self.working_directory {
            if !dir.starts_with('/') {
                return Err(CoreError::ProviderConfig(format!(
                    "working directory must be absolute: {dir}"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for SandboxProviderConfig.
#[derive(Debug, Default)]
pub struct SandboxProviderConfigBuilder {
    config: SandboxProviderConfig,
}

impl SandboxProviderConfigBuilder {
    /// Set the provider name.
    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.config.provider = Some(name.into());
        self
    }

    /// Set the credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    /// Set the working directory override.
    pub fn working_directory(mut self, dir: impl Into<String>) -> Self {
        self.config.working_directory = Some(dir.into());
        self
    }

    /// Set the dev-server port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the remote call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the install timeout.
    pub fn install_timeout(mut self, timeout: Duration) -> Self {
        self.config.install_timeout = timeout;
        self
    }

    /// Set the gateway URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = Some(url.into());
        self
    }

    /// Set the backend template.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.config.template = Some(template.into());
        self
    }

    /// Toggle `--legacy-peer-deps`.
    pub fn legacy_peer_deps(mut self, enabled: bool) -> Self {
        self.config.install.legacy_peer_deps = enabled;
        self
    }

    /// Add an extra install flag.
    pub fn install_flag(mut self, flag: impl Into<String>) -> Self {
        self.config.install.extra_flags.push(flag.into());
        self
    }

    /// Toggle dev-server restart after install.
    pub fn auto_restart(mut self, enabled: bool) -> Self {
        self.config.install.auto_restart = enabled;
        self
    }

    /// Set the settle delay.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.dev_server.settle_delay = delay;
        self
    }

    /// Set the startup ceiling.
    pub fn startup_delay(mut self, delay: Duration) -> Self {
        self.config.dev_server.startup_delay = delay;
        self
    }

    /// Set the readiness probe interval.
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.config.dev_server.probe_interval = interval;
        self
    }

    /// Build the configuration, validating all fields.
    pub fn build(self) -> Result<SandboxProviderConfig, CoreError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
