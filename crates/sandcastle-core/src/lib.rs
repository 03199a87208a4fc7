//! # sandcastle-core
//!
//! Provider abstraction and session registry for Sandcastle preview
//! sandboxes.
//!
//! This crate provisions short-lived remote sessions on one of several
//! backends, scaffolds a Vite + React app inside them, supervises the dev
//! server, and tracks live sessions so they can be looked up, reconnected
//! and retired.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  sandcastle-core (host)                  │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │ SandboxManager  │────▶│  HashMap<String,         │   │
//! │  │  - register()   │     │   Arc<dyn Provider>>     │   │
//! │  │  - cleanup()    │     │  + active id             │   │
//! │  └─────────────────┘     └──────────────────────────┘   │
//! │           │                                              │
//! │           ▼                                              │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │ SandboxFactory  │────▶│  RemoteProvider          │   │
//! │  │  - create()     │     │  + BackendProfile        │   │
//! │  └─────────────────┘     │  (e2b, vercel, daytona,  │   │
//! │                          │   modal, compute)        │   │
//! │                          └──────────────────────────┘   │
//! │                                     │                    │
//! │                                     ▼                    │
//! │                          ┌──────────────────────────┐   │
//! │                          │  dyn RemoteApi           │   │
//! │                          │  (sandcastle-remote)     │   │
//! │                          └──────────────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//!                           │ HTTPS
//!                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │              backend sandbox gateway                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use sandcastle_core::{CommandSpec, SandboxFactory, SandboxManager, SandboxProviderConfig};
//!
//! # async fn example() -> sandcastle_core::Result<()> {
//! let factory = SandboxFactory::new(SandboxProviderConfig::from_env());
//! let manager = SandboxManager::new(factory.clone());
//!
//! let provider = factory.create(Some("e2b"), None)?;
//! let info = provider.create_sandbox().await?;
//! provider.setup_vite_app().await?;
//! manager.register_sandbox(&info.sandbox_id, provider.clone()).await?;
//!
//! provider.write_file("src/App.jsx", "export default () => <h1>Hi</h1>\n").await?;
//! provider.install_packages(&["lodash".to_string()]).await?;
//! let out = provider.run_command(CommandSpec::new("ls").arg("-la")).await?;
//! println!("{}\n{}", info.url, out.stdout);
//!
//! manager.terminate_all().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Five backends**: one contract, per-backend profiles
//! - **Safe file transfer**: native file API or base64 over the shell
//! - **Dev-server supervision**: restart with a bounded readiness probe
//! - **Session registry**: active session, reconnect, idle eviction
//! - **Test backend**: in-memory `mock::MockRemote` behind the `mock` feature

mod config;
mod error;
mod factory;
mod manager;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod provider;
pub mod providers;
mod readiness;
mod remote_provider;
mod scaffold;
mod shell;
mod types;

pub use config::{
    BackendOverrides, Credentials, DevServerOptions, InstallOptions, SandboxProviderConfig,
    SandboxProviderConfigBuilder, DEFAULT_DEV_SERVER_LOG, DEFAULT_INSTALL_TIMEOUT, DEFAULT_PORT,
    DEFAULT_PROBE_INTERVAL, DEFAULT_SESSION_LIFETIME, DEFAULT_SETTLE_DELAY, DEFAULT_STARTUP_DELAY,
    DEFAULT_TIMEOUT,
};
pub use error::{CoreError, Result};
pub use factory::{ApiBuilder, SandboxFactory, DEFAULT_PROVIDER};
pub use manager::{ReaperHandle, SandboxEntry, SandboxManager};
pub use provider::{Reconnectable, SandboxProvider};
pub use readiness::{poll_until, PollOutcome, TOOLING_POLL_CEILING, TOOLING_POLL_INTERVAL};
pub use remote_provider::RemoteProvider;
pub use sandcastle_remote::{CommandSpec, RemoteApi};
pub use scaffold::{vite_app, ScaffoldFile};
pub use shell::EXCLUDED_DIRS;
pub use types::{CommandResult, ProviderCapabilities, ProviderTag, SandboxInfo};
