//! Generic compute sessions.
//!
//! Sessions start from a bare image, so the `compute` CLI is polled for
//! readiness after creation and installed with the API key when missing.

use super::{secret, BackendProfile, ToolingBootstrap, WorkdirStrategy};
use crate::config::SandboxProviderConfig;
use crate::types::ProviderTag;
use sandcastle_remote::{AuthScheme, CommandSpec, HttpApiConfig};

/// Project root unless configured otherwise.
pub const WORKDIR: &str = "/workspace/app";

/// Installer run when the CLI is not ready in time.
pub(crate) const INSTALL_SCRIPT: &str = "curl -fsSL https://get.compute.sh/install.sh | sh";

/// Compute profile.
pub const PROFILE: BackendProfile = BackendProfile {
    tag: ProviderTag::Compute,
    workdir: WorkdirStrategy::Fixed(WORKDIR),
    preview_hosts: &[],
    reconnect: false,
    tooling: Some(ToolingBootstrap {
        status: status_command,
        install: install_command,
    }),
};

fn status_command() -> CommandSpec {
    CommandSpec::new("compute").arg("status")
}

fn install_command(api_key: &str) -> CommandSpec {
    CommandSpec::shell(INSTALL_SCRIPT).env("COMPUTE_API_KEY", api_key)
}

pub(super) fn api_config(config: &SandboxProviderConfig, base_url: String) -> HttpApiConfig {
    HttpApiConfig::new(
        "compute",
        base_url,
        AuthScheme::Bearer(secret(&config.credentials.compute_api_key)),
    )
}
