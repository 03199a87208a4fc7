//! Modal sandboxes.
//!
//! Shell-only file access. The image decides the starting directory, so
//! the working directory is probed once per session.

use super::{secret, BackendProfile, WorkdirStrategy};
use crate::config::SandboxProviderConfig;
use crate::types::ProviderTag;
use sandcastle_remote::{AuthScheme, HttpApiConfig};

/// Modal profile.
pub const PROFILE: BackendProfile = BackendProfile {
    tag: ProviderTag::Modal,
    workdir: WorkdirStrategy::Probed { subdir: "app" },
    preview_hosts: &[".modal.host", ".modal.run"],
    reconnect: false,
    tooling: None,
};

pub(super) fn api_config(config: &SandboxProviderConfig, base_url: String) -> HttpApiConfig {
    let creds = &config.credentials;
    HttpApiConfig::new(
        "modal",
        base_url,
        AuthScheme::TokenPair {
            id: secret(&creds.modal_token_id),
            secret: secret(&creds.modal_token_secret),
        },
    )
}
