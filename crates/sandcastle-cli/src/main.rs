//! Sandcastle entry point.
//!
//! Provisions one preview sandbox from environment configuration, scaffolds
//! the Vite app, prints the preview URL and keeps the session alive until
//! Ctrl-C. Idle sessions are evicted by a background reaper.

mod config;

use config::CliConfig;
use sandcastle_core::{SandboxFactory, SandboxManager, SandboxProviderConfig};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, stdout carries the preview URL
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("sandcastle=info".parse()?)
                .add_directive("sandcastle_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Sandcastle");

    let cli = CliConfig::from_env();
    cli.validate()?;
    let provider_config = SandboxProviderConfig::from_env();
    tracing::info!(?cli, provider = ?provider_config.provider, "Configuration loaded");

    let factory = SandboxFactory::new(provider_config);
    let available = factory.available_providers();
    if available.is_empty() {
        tracing::warn!("No backend credentials configured");
    } else {
        tracing::info!(?available, "Backends with credentials");
    }

    let manager = Arc::new(SandboxManager::new(factory.clone()));
    let provider = factory.create(None, None)?;
    let info = provider.create_sandbox().await?;

    if cli.skip_setup {
        tracing::info!("Skipping app setup");
    } else if let Err(e) = provider.setup_vite_app().await {
        tracing::error!(sandbox_id = %info.sandbox_id, error = %e, "App setup failed");
        provider.terminate().await;
        return Err(e.into());
    }

    manager.register_sandbox(&info.sandbox_id, provider).await?;
    tracing::info!(
        sandbox_id = %info.sandbox_id,
        provider = %info.provider,
        url = %info.url,
        "Sandbox ready"
    );
    println!("{}", info.url);

    let reaper = manager.spawn_reaper(cli.reap_interval, cli.max_idle);

    signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, cleaning up...");

    reaper.shutdown().await;
    manager.terminate_all().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
