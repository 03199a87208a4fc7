//! Daytona workspaces.
//!
//! Native file API; the project lives under the home directory the
//! workspace reports at creation.

use super::{secret, BackendProfile, WorkdirStrategy};
use crate::config::SandboxProviderConfig;
use crate::types::ProviderTag;
use sandcastle_remote::{AuthScheme, HttpApiConfig};

/// Daytona profile.
pub const PROFILE: BackendProfile = BackendProfile {
    tag: ProviderTag::Daytona,
    workdir: WorkdirStrategy::HomeRelative {
        subdir: "app",
        fallback: "/home/daytona/app",
    },
    preview_hosts: &[".proxy.daytona.works", ".daytona.app"],
    reconnect: false,
    tooling: None,
};

pub(super) fn api_config(config: &SandboxProviderConfig, base_url: String) -> HttpApiConfig {
    HttpApiConfig::new(
        "daytona",
        base_url,
        AuthScheme::Bearer(secret(&config.credentials.daytona_api_key)),
    )
    .with_native_fs(true)
}
