//! E2B cloud sandboxes.
//!
//! Native file API, fixed working directory, and sessions can be
//! reattached by id.

use super::{secret, BackendProfile, WorkdirStrategy};
use crate::config::SandboxProviderConfig;
use crate::types::ProviderTag;
use sandcastle_remote::{AuthScheme, HttpApiConfig};

/// Project root inside E2B sessions.
pub const WORKDIR: &str = "/home/user/app";

/// E2B profile.
pub const PROFILE: BackendProfile = BackendProfile {
    tag: ProviderTag::E2b,
    workdir: WorkdirStrategy::Fixed(WORKDIR),
    preview_hosts: &[".e2b.app", ".e2b.dev"],
    reconnect: true,
    tooling: None,
};

pub(super) fn api_config(config: &SandboxProviderConfig, base_url: String) -> HttpApiConfig {
    HttpApiConfig::new(
        "e2b",
        base_url,
        AuthScheme::ApiKeyHeader {
            header: "X-API-Key".into(),
            key: secret(&config.credentials.e2b_api_key),
        },
    )
    .with_native_fs(true)
}
