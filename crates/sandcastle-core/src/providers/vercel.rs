//! Vercel sandboxes. Shell-only file access.

use super::{secret, BackendProfile, WorkdirStrategy};
use crate::config::SandboxProviderConfig;
use crate::types::ProviderTag;
use sandcastle_remote::{AuthScheme, HttpApiConfig};

/// Project root inside Vercel sessions.
pub const WORKDIR: &str = "/vercel/sandbox";

/// Vercel profile.
pub const PROFILE: BackendProfile = BackendProfile {
    tag: ProviderTag::Vercel,
    workdir: WorkdirStrategy::Fixed(WORKDIR),
    preview_hosts: &[".vercel.run"],
    reconnect: false,
    tooling: None,
};

pub(super) fn api_config(config: &SandboxProviderConfig, base_url: String) -> HttpApiConfig {
    let creds = &config.credentials;
    let mut api = HttpApiConfig::new(
        "vercel",
        base_url,
        AuthScheme::Bearer(secret(&creds.vercel_token)),
    );
    if let Some(team) = &creds.vercel_team_id {
        api = api.with_header("x-vercel-team-id", team.as_str());
    }
    if let Some(project) = &creds.vercel_project_id {
        api = api.with_header("x-vercel-project-id", project.as_str());
    }
    api
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;

    #[test]
    fn test_team_and_project_headers() {
        let config = SandboxProviderConfig {
            credentials: Credentials {
                vercel_token: Some("tok".into()),
                vercel_team_id: Some("team_1".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let api = api_config(&config, "http://gateway.test".into());
        assert_eq!(api.base_url, "http://gateway.test");
        assert!(!api.native_fs);
        assert_eq!(
            api.headers,
            vec![("x-vercel-team-id".to_string(), "team_1".to_string())]
        );
    }
}
