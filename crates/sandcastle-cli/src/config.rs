//! Settings that only the binary cares about.
//!
//! Provider settings live in [`sandcastle_core::SandboxProviderConfig`].

use std::time::Duration;

/// Settings for the `sandcastle` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// How often the reaper looks for idle sessions (default: 60s).
    pub reap_interval: Duration,

    /// Idle time after which a session is evicted (default: 30m).
    pub max_idle: Duration,

    /// Skip scaffolding the Vite app after provisioning (default: false).
    pub skip_setup: bool,
}

/// Configuration validation error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reap interval must be > 0")]
    ZeroReapInterval,

    #[error("max idle ({max_idle:?}) is shorter than the reap interval ({interval:?})")]
    IdleShorterThanInterval {
        max_idle: Duration,
        interval: Duration,
    },
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            reap_interval: Duration::from_secs(60),
            max_idle: Duration::from_secs(30 * 60),
            skip_setup: false,
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SANDCASTLE_REAP_INTERVAL_SECS` | `60` |
    /// | `SANDCASTLE_MAX_IDLE_SECS` | `1800` |
    /// | `SANDCASTLE_SKIP_SETUP` | `false` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        let secs = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        };

        Self {
            reap_interval: secs("SANDCASTLE_REAP_INTERVAL_SECS").unwrap_or(default.reap_interval),
            max_idle: secs("SANDCASTLE_MAX_IDLE_SECS").unwrap_or(default.max_idle),
            skip_setup: lookup("SANDCASTLE_SKIP_SETUP")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(default.skip_setup),
        }
    }

    /// Check that the reaper settings make sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reap_interval.is_zero() {
            return Err(ConfigError::ZeroReapInterval);
        }
        if self.max_idle < self.reap_interval {
            return Err(ConfigError::IdleShorterThanInterval {
                max_idle: self.max_idle,
                interval: self.reap_interval,
            });
        }
        Ok(())
    }
}
