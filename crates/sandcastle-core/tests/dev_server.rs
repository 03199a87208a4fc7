//! Scaffolding, dependency installs, dev-server supervision and tooling
//! bootstrap, against the in-memory backend.

use sandcastle_core::mock::{MockRemote, ToolingBehavior};
use sandcastle_core::{
    providers, CoreError, Credentials, ProviderTag, RemoteProvider, SandboxProvider,
    SandboxProviderConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn setup_with(tag: ProviderTag, mock: MockRemote, config: SandboxProviderConfig) -> (Arc<MockRemote>, RemoteProvider) {
    let mock = Arc::new(mock);
    let provider = providers::build(tag, mock.clone(), config);
    (mock, provider)
}

fn vercel() -> (Arc<MockRemote>, RemoteProvider) {
    setup_with(ProviderTag::Vercel, MockRemote::new("vercel"), SandboxProviderConfig::default())
}

fn compute(behavior: ToolingBehavior) -> (Arc<MockRemote>, RemoteProvider) {
    let config = SandboxProviderConfig {
        credentials: Credentials {
            compute_api_key: Some("ck-test".into()),
            ..Default::default()
        },
        ..Default::default()
    };
    setup_with(
        ProviderTag::Compute,
        MockRemote::new("compute").with_tooling(behavior),
        config,
    )
}

fn is_install_script(c: &sandcastle_core::CommandSpec) -> bool {
    c.program == "sh" && c.env.iter().any(|(k, _)| k == "COMPUTE_API_KEY")
}

/// setup_vite_app writes the starter, installs it and starts the server
#[tokio::test(start_paused = true)]
async fn test_setup_scaffolds_and_starts_dev_server() {
    let (mock, provider) = vercel();
    let info = provider.create_sandbox().await.unwrap();
    provider.setup_vite_app().await.unwrap();

    let files = provider.list_files(None).await.unwrap();
    for expected in [
        "index.html",
        "package.json",
        "postcss.config.js",
        "src/App.jsx",
        "src/index.css",
        "src/main.jsx",
        "tailwind.config.js",
        "vite.config.js",
    ] {
        assert!(files.contains(&expected.to_string()), "missing {expected}");
    }
    assert!(files.iter().all(|f| !f.starts_with("node_modules")));

    let vite_config = provider.read_file("vite.config.js").await.unwrap();
    assert!(vite_config.contains("port: 5173"));
    assert!(vite_config.contains("'.vercel.run'"));

    assert!(mock.dev_server_running(&info.sandbox_id));
    assert_eq!(mock.dev_server_starts(), 1);
}

/// A successful install restarts the dev server exactly once
#[tokio::test(start_paused = true)]
async fn test_install_restarts_dev_server_once() {
    let (mock, provider) = vercel();
    provider.create_sandbox().await.unwrap();
    provider.setup_vite_app().await.unwrap();
    let starts = mock.dev_server_starts();
    let kills = mock.kill_count();

    let result = provider
        .install_packages(&["lodash".to_string()])
        .await
        .unwrap();
    assert!(result.success, "{}", result.stderr);

    assert_eq!(mock.dev_server_starts(), starts + 1);
    assert_eq!(mock.kill_count(), kills + 1);
    let manifest = provider.read_file("package.json").await.unwrap();
    assert!(manifest.contains("\"lodash\""));

    let installs = mock.count_commands(|c| {
        c.program == "npm"
            && c.args == ["install", "lodash", "--legacy-peer-deps"]
            && c.cwd.as_deref() == Some("/vercel/sandbox")
    });
    assert_eq!(installs, 1);
}

/// Extra flags follow the packages, each as its own argument
#[tokio::test(start_paused = true)]
async fn test_install_flags_from_config() {
    let config = SandboxProviderConfig::builder()
        .legacy_peer_deps(false)
        .install_flag("--no-audit")
        .auto_restart(false)
        .build()
        .unwrap();
    let (mock, provider) = setup_with(ProviderTag::Vercel, MockRemote::new("vercel"), config);
    provider.create_sandbox().await.unwrap();
    provider.setup_vite_app().await.unwrap();
    let starts = mock.dev_server_starts();

    provider
        .install_packages(&["zod".to_string(), "clsx".to_string()])
        .await
        .unwrap();

    assert_eq!(mock.dev_server_starts(), starts, "auto-restart disabled");
    let installs = mock.count_commands(|c| c.program == "npm" && c.args == ["install", "zod", "clsx", "--no-audit"]);
    assert_eq!(installs, 1);
}

/// A failed install is reported and does not restart anything
#[tokio::test(start_paused = true)]
async fn test_failed_install_skips_restart() {
    let (mock, provider) = vercel();
    provider.create_sandbox().await.unwrap();

    let result = provider
        .install_packages(&["lodash".to_string()])
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.exit_code, 254);
    assert_eq!(mock.dev_server_starts(), 0);
    assert_eq!(mock.kill_count(), 0);
}

/// Restart returns as soon as the server answers
#[tokio::test(start_paused = true)]
async fn test_restart_returns_on_first_healthy_probe() {
    let (mock, provider) = vercel();
    provider.create_sandbox().await.unwrap();
    mock.set_dev_server_boot_probes(3);

    let start = Instant::now();
    provider.restart_vite_server().await.unwrap();

    // 2s settle delay, then three failed probes 500ms apart
    assert_eq!(start.elapsed(), Duration::from_millis(3500));
    let probes = mock.count_commands(|c| c.program == "curl");
    assert_eq!(probes, 4);
}

/// A server that never answers fails after the startup ceiling
#[tokio::test(start_paused = true)]
async fn test_restart_fails_when_server_never_answers() {
    let (mock, provider) = vercel();
    provider.create_sandbox().await.unwrap();
    mock.set_dev_server_broken(true);

    let start = Instant::now();
    let err = provider.restart_vite_server().await.unwrap_err();
    match err {
        CoreError::DevServerNotReady { port, waited } => {
            assert_eq!(port, 5173);
            assert_eq!(waited, Duration::from_secs(7));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(start.elapsed(), Duration::from_secs(9));
}

/// The dev server is started detached with its log redirected
#[tokio::test(start_paused = true)]
async fn test_dev_server_started_detached_with_log() {
    let (mock, provider) = vercel();
    provider.create_sandbox().await.unwrap();
    provider.restart_vite_server().await.unwrap();

    let detached = mock.count_commands(|c| {
        c.program == "npm" && c.detach_log.as_deref() == Some("/tmp/vite.log")
    });
    assert_eq!(detached, 1);

    let log = provider.dev_server_log().await.unwrap();
    assert!(log.contains("VITE ready"));
}

/// Tooling that becomes ready during polling needs no installer
#[tokio::test(start_paused = true)]
async fn test_tooling_ready_after_polling() {
    let (mock, provider) = compute(ToolingBehavior::ReadyAfter(3));

    let start = Instant::now();
    let info = provider.create_sandbox().await.unwrap();

    assert_eq!(mock.status_checks(&info.sandbox_id), 4);
    assert_eq!(mock.count_commands(is_install_script), 0);
    assert_eq!(start.elapsed(), Duration::from_millis(1500));
}

/// Missing tooling is installed after the ceiling, then checked once more
#[tokio::test(start_paused = true)]
async fn test_tooling_installed_after_ceiling() {
    let (mock, provider) = compute(ToolingBehavior::NeedsInstall);

    let start = Instant::now();
    let info = provider.create_sandbox().await.unwrap();

    assert_eq!(start.elapsed(), Duration::from_secs(10));
    // 21 polls over 10s plus the final check
    assert_eq!(mock.status_checks(&info.sandbox_id), 22);
    assert_eq!(mock.count_commands(is_install_script), 1);
    let key_passed = mock.count_commands(|c| {
        c.env.iter().any(|(k, v)| k == "COMPUTE_API_KEY" && v == "ck-test")
    });
    assert_eq!(key_passed, 1);
    assert!(provider.is_alive());
}

/// Tooling still missing after install fails creation and frees the session
#[tokio::test(start_paused = true)]
async fn test_tooling_unavailable() {
    let (mock, provider) = compute(ToolingBehavior::Broken);

    let err = provider.create_sandbox().await.unwrap_err();
    match err {
        CoreError::ToolingUnavailable { stderr, .. } => {
            assert!(stderr.contains("compute: not found"), "{stderr}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!provider.is_alive());
    assert!(mock.live_sessions().is_empty());
    assert_eq!(mock.destroyed_sessions().len(), 1);
}
