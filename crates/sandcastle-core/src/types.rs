//! Shared data types: provider tags, session info and command results.

use chrono::{DateTime, Utc};
use sandcastle_remote::ExecOutput;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which backend family hosts a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    /// E2B cloud sandboxes
    E2b,
    /// Vercel sandboxes
    Vercel,
    /// Daytona workspaces
    Daytona,
    /// Modal sandboxes
    Modal,
    /// Generic compute sessions bootstrapped with the compute CLI
    Compute,
}

impl ProviderTag {
    /// Every supported tag, in factory order.
    pub const ALL: [ProviderTag; 5] = [
        ProviderTag::E2b,
        ProviderTag::Vercel,
        ProviderTag::Daytona,
        ProviderTag::Modal,
        ProviderTag::Compute,
    ];

    /// Lowercase name used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E2b => "e2b",
            Self::Vercel => "vercel",
            Self::Daytona => "daytona",
            Self::Modal => "modal",
            Self::Compute => "compute",
        }
    }

    /// Prefix for per-backend environment variables (`E2B`, `VERCEL`, ...).
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::E2b => "E2B",
            Self::Vercel => "VERCEL",
            Self::Daytona => "DAYTONA",
            Self::Modal => "MODAL",
            Self::Compute => "COMPUTE",
        }
    }

    /// Names of all supported tags.
    pub fn supported_names() -> Vec<String> {
        Self::ALL.iter().map(|t| t.as_str().to_string()).collect()
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderTag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "e2b" => Ok(Self::E2b),
            "vercel" => Ok(Self::Vercel),
            "daytona" => Ok(Self::Daytona),
            "modal" => Ok(Self::Modal),
            "compute" => Ok(Self::Compute),
            _ => Err(()),
        }
    }
}

/// Public description of a live session.
///
/// Immutable once created; a new session produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxInfo {
    /// Backend-assigned session id.
    pub sandbox_id: String,
    /// Public preview URL of the dev server.
    pub url: String,
    /// Backend family.
    pub provider: ProviderTag,
    /// When the session was created (or reconnected).
    pub created_at: DateTime<Utc>,
}

/// Outcome of a remote command.
///
/// A nonzero exit is reported here, never as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Process exit code.
    pub exit_code: i32,
    /// `exit_code == 0`.
    pub success: bool,
}

impl From<ExecOutput> for CommandResult {
    fn from(out: ExecOutput) -> Self {
        Self {
            success: out.exit_code == 0,
            stdout: out.stdout,
            stderr: out.stderr,
            exit_code: out.exit_code,
        }
    }
}

/// What a provider can do beyond the common contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProviderCapabilities {
    /// Backend has native file read/write/mkdir.
    pub native_filesystem: bool,
    /// Provider can reattach to an existing session by id.
    pub reconnect: bool,
    /// Provider checks (and installs) CLI tooling before first use.
    pub tooling_bootstrap: bool,
}
