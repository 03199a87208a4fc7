//! Backend profiles.
//!
//! Every backend is driven by the same [`RemoteProvider`]; a
//! [`BackendProfile`] captures the ways they differ: working directory,
//! preview proxy domains, reconnection and tooling bootstrap. The HTTP
//! client for each backend is built by its module's `api_config`.
//!
//! Backends are reached through a sandbox gateway that speaks the route
//! table documented on [`HttpApi`]. There is no built-in gateway address:
//! each backend needs `<BACKEND>_API_URL` (for example `E2B_API_URL`).

pub mod compute;
pub mod daytona;
pub mod e2b;
pub mod modal;
pub mod vercel;

use crate::config::SandboxProviderConfig;
use crate::error::{CoreError, Result};
use crate::remote_provider::RemoteProvider;
use crate::types::ProviderTag;
use sandcastle_remote::{CommandSpec, HttpApi, HttpApiConfig, RemoteApi};
use std::sync::Arc;

/// How a backend's working directory is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkdirStrategy {
    /// Always the same path.
    Fixed(&'static str),
    /// `subdir` under the session's home directory, as reported at
    /// creation; `fallback` when the backend reports none.
    HomeRelative {
        /// Directory under home.
        subdir: &'static str,
        /// Used when no home directory is known.
        fallback: &'static str,
    },
    /// `subdir` under the directory `pwd` reports, probed on first use and
    /// cached for the session.
    Probed {
        /// Directory under the probed one.
        subdir: &'static str,
    },
}

/// Command-line tooling a backend needs inside the session.
#[derive(Debug, Clone, Copy)]
pub struct ToolingBootstrap {
    /// Status check; exit 0 means ready.
    pub status: fn() -> CommandSpec,
    /// One-shot installer, given the backend credential.
    pub install: fn(&str) -> CommandSpec,
}

/// Static description of one backend.
#[derive(Debug, Clone, Copy)]
pub struct BackendProfile {
    /// Backend family.
    pub tag: ProviderTag,
    /// Working directory resolution.
    pub workdir: WorkdirStrategy,
    /// Preview proxy host suffixes allow-listed in the Vite config.
    pub preview_hosts: &'static [&'static str],
    /// Whether sessions can be reattached by id.
    pub reconnect: bool,
    /// Tooling checked after session creation.
    pub tooling: Option<ToolingBootstrap>,
}

/// Profile of `tag`.
pub fn profile(tag: ProviderTag) -> BackendProfile {
    match tag {
        ProviderTag::E2b => e2b::PROFILE,
        ProviderTag::Vercel => vercel::PROFILE,
        ProviderTag::Daytona => daytona::PROFILE,
        ProviderTag::Modal => modal::PROFILE,
        ProviderTag::Compute => compute::PROFILE,
    }
}

/// HTTP client configuration for `tag`.
pub fn api_config(tag: ProviderTag, config: &SandboxProviderConfig) -> Result<HttpApiConfig> {
    config.credentials.require(tag)?;
    let base = base_url(tag, config)?;
    let api = match tag {
        ProviderTag::E2b => e2b::api_config(config, base),
        ProviderTag::Vercel => vercel::api_config(config, base),
        ProviderTag::Daytona => daytona::api_config(config, base),
        ProviderTag::Modal => modal::api_config(config, base),
        ProviderTag::Compute => compute::api_config(config, base),
    };
    // Per-call limits are enforced by the provider; the client must not
    // cut off the longest of them.
    Ok(api.with_request_timeout(config.timeout.max(config.install_timeout)))
}

/// Build the HTTP backend for `tag`.
pub fn http_api(tag: ProviderTag, config: &SandboxProviderConfig) -> Result<Arc<dyn RemoteApi>> {
    let api = HttpApi::new(api_config(tag, config)?)?;
    Ok(Arc::new(api))
}

/// Build the provider for `tag` on top of `api`.
pub fn build(
    tag: ProviderTag,
    api: Arc<dyn RemoteApi>,
    config: SandboxProviderConfig,
) -> RemoteProvider {
    let credential = match tag {
        ProviderTag::Compute => config.credentials.compute_api_key.clone(),
        _ => None,
    };
    RemoteProvider::new(profile(tag), api, config).with_tooling_credential(credential)
}

/// Gateway URL configured for `tag`.
fn base_url(tag: ProviderTag, config: &SandboxProviderConfig) -> Result<String> {
    config
        .api_url
        .clone()
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| {
            CoreError::ProviderConfig(format!(
                "{tag} requires {}_API_URL (sandbox gateway base URL)",
                tag.as_str().to_ascii_uppercase()
            ))
        })
}

/// Credential value, empty when absent. Callers check presence first.
fn secret(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}
