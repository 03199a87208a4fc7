//! Contract tests run against every backend profile.
//!
//! Each provider is backed by an in-memory `MockRemote`, so these tests
//! need no network access.

use sandcastle_core::mock::MockRemote;
use sandcastle_core::{
    providers, CommandSpec, CoreError, ProviderTag, RemoteProvider, SandboxProvider,
    SandboxProviderConfig,
};
use std::sync::Arc;
use std::time::Duration;

fn native_fs(tag: ProviderTag) -> bool {
    matches!(tag, ProviderTag::E2b | ProviderTag::Daytona)
}

fn expected_workdir(tag: ProviderTag) -> &'static str {
    match tag {
        ProviderTag::E2b => "/home/user/app",
        ProviderTag::Vercel => "/vercel/sandbox",
        ProviderTag::Daytona => "/home/user/app",
        ProviderTag::Modal => "/home/user/app",
        ProviderTag::Compute => "/workspace/app",
    }
}

fn setup_with(tag: ProviderTag, config: SandboxProviderConfig) -> (Arc<MockRemote>, RemoteProvider) {
    let mock = Arc::new(MockRemote::new(tag.as_str()).with_native_fs(native_fs(tag)));
    let provider = providers::build(tag, mock.clone(), config);
    (mock, provider)
}

fn setup(tag: ProviderTag) -> (Arc<MockRemote>, RemoteProvider) {
    setup_with(tag, SandboxProviderConfig::default())
}

async fn assert_io_rejected(provider: &RemoteProvider) {
    let tag = provider.tag();
    assert!(matches!(
        provider.run_command(CommandSpec::new("ls")).await,
        Err(CoreError::NoActiveSession)
    ), "{tag}: run_command");
    assert!(matches!(
        provider.write_file("a.txt", "x").await,
        Err(CoreError::NoActiveSession)
    ), "{tag}: write_file");
    assert!(matches!(
        provider.read_file("a.txt").await,
        Err(CoreError::NoActiveSession)
    ), "{tag}: read_file");
    assert!(matches!(
        provider.list_files(None).await,
        Err(CoreError::NoActiveSession)
    ), "{tag}: list_files");
    assert!(matches!(
        provider.install_packages(&["lodash".to_string()]).await,
        Err(CoreError::NoActiveSession)
    ), "{tag}: install_packages");
    assert!(matches!(
        provider.setup_vite_app().await,
        Err(CoreError::NoActiveSession)
    ), "{tag}: setup_vite_app");
    assert!(matches!(
        provider.restart_vite_server().await,
        Err(CoreError::NoActiveSession)
    ), "{tag}: restart_vite_server");
    assert!(!provider.is_alive(), "{tag}");
    assert!(provider.sandbox_url().is_none(), "{tag}");
    assert!(provider.sandbox_info().is_none(), "{tag}");
}

/// Every I/O operation fails before a session exists
#[tokio::test(start_paused = true)]
async fn test_io_before_create_fails() {
    for tag in ProviderTag::ALL {
        let (_mock, provider) = setup(tag);
        assert_io_rejected(&provider).await;
    }
}

/// Every I/O operation fails after terminate
#[tokio::test(start_paused = true)]
async fn test_io_after_terminate_fails() {
    for tag in ProviderTag::ALL {
        let (mock, provider) = setup(tag);
        provider.create_sandbox().await.expect("create should succeed");
        assert!(provider.is_alive());

        provider.terminate().await;
        assert_io_rejected(&provider).await;
        assert!(mock.live_sessions().is_empty(), "{tag}: remote session leaked");
    }
}

/// terminate() can be called any number of times
#[tokio::test(start_paused = true)]
async fn test_terminate_is_idempotent() {
    for tag in ProviderTag::ALL {
        let (mock, provider) = setup(tag);
        provider.terminate().await;
        assert!(!provider.is_alive());

        provider.create_sandbox().await.unwrap();
        provider.terminate().await;
        provider.terminate().await;
        assert!(!provider.is_alive());
        assert_eq!(mock.destroyed_sessions().len(), 1, "{tag}");
    }
}

/// Local state is cleared even when the backend refuses to destroy
#[tokio::test(start_paused = true)]
async fn test_terminate_clears_state_when_destroy_fails() {
    let (mock, provider) = setup(ProviderTag::Vercel);
    let info = provider.create_sandbox().await.unwrap();

    mock.fail_destroy(true);
    provider.terminate().await;

    assert!(!provider.is_alive());
    assert!(provider.sandbox_info().is_none());
    assert_eq!(mock.live_sessions(), vec![info.sandbox_id]);
}

/// Content with shell metacharacters and multibyte text survives a round trip
#[tokio::test(start_paused = true)]
async fn test_write_read_round_trip() {
    let content = "line one\nsay \"hi\" and 'bye'\n`whoami` $HOME ${PATH} $(id)\n\\n is not a newline\nünïcødé 日本語 🚀\n\n";
    for tag in ProviderTag::ALL {
        let (_mock, provider) = setup(tag);
        provider.create_sandbox().await.unwrap();

        provider.write_file("src/tricky.txt", content).await.unwrap();
        assert_eq!(provider.read_file("src/tricky.txt").await.unwrap(), content, "{tag}");

        provider.write_file("/tmp/abs.txt", content).await.unwrap();
        assert_eq!(provider.read_file("/tmp/abs.txt").await.unwrap(), content, "{tag}");
    }
}

/// Files far larger than one shell argument are written in pieces
#[tokio::test(start_paused = true)]
async fn test_large_file_round_trip() {
    let big = "row 日本語 $x `y` 'z'\n".repeat(9 * 1024);
    assert!(big.len() > 200 * 1024);
    for tag in ProviderTag::ALL {
        let (mock, provider) = setup(tag);
        provider.create_sandbox().await.unwrap();

        provider.write_file("bundle.js", &big).await.unwrap();
        assert_eq!(provider.read_file("bundle.js").await.unwrap(), big, "{tag}");

        // A later, shorter write replaces the whole file
        provider.write_file("bundle.js", "small\n").await.unwrap();
        assert_eq!(provider.read_file("bundle.js").await.unwrap(), "small\n", "{tag}");

        let base64_writes = mock.count_commands(|c| c.program == "sh" && c.args.len() == 4);
        if native_fs(tag) {
            assert_eq!(base64_writes, 0, "{tag}");
        } else {
            assert!(base64_writes >= 6, "{tag}: {base64_writes} write commands");
        }
    }
}

/// Relative paths land under the working directory
#[tokio::test(start_paused = true)]
async fn test_relative_paths_resolve_against_workdir() {
    for tag in ProviderTag::ALL {
        let (mock, provider) = setup(tag);
        let info = provider.create_sandbox().await.unwrap();

        provider.write_file("a/b/c/deep.txt", "deep").await.unwrap();
        let full = format!("{}/a/b/c/deep.txt", expected_workdir(tag));
        assert_eq!(mock.file(&info.sandbox_id, &full).as_deref(), Some("deep"), "{tag}");
        assert_eq!(provider.known_files(), vec!["a/b/c/deep.txt".to_string()]);
    }
}

/// Reading a missing file reports the remote error
#[tokio::test(start_paused = true)]
async fn test_read_missing_file_is_not_found() {
    for tag in ProviderTag::ALL {
        let (_mock, provider) = setup(tag);
        provider.create_sandbox().await.unwrap();

        match provider.read_file("nope.txt").await {
            Err(CoreError::FileNotFound { path, stderr }) => {
                assert!(path.ends_with("/nope.txt"), "{tag}: {path}");
                assert!(!stderr.is_empty(), "{tag}");
            }
            other => panic!("{tag}: unexpected result: {other:?}"),
        }
    }
}

/// Dependency, build and VCS directories never show up in listings
#[tokio::test(start_paused = true)]
async fn test_list_files_skips_excluded_dirs() {
    for tag in ProviderTag::ALL {
        let (_mock, provider) = setup(tag);
        provider.create_sandbox().await.unwrap();

        for path in [
            "package.json",
            "src/App.jsx",
            "node_modules/react/index.js",
            ".git/HEAD",
            ".next/cache/x",
            "dist/index.js",
            "build/out.js",
            "src/dist/inner.js",
        ] {
            provider.write_file(path, "x").await.unwrap();
        }

        assert_eq!(
            provider.list_files(None).await.unwrap(),
            vec!["package.json".to_string(), "src/App.jsx".to_string()],
            "{tag}"
        );
        assert_eq!(
            provider.list_files(Some("src")).await.unwrap(),
            vec!["App.jsx".to_string()],
            "{tag}"
        );
    }
}

/// A failing command is a result, not an error
#[tokio::test(start_paused = true)]
async fn test_nonzero_exit_is_reported_in_result() {
    for tag in ProviderTag::ALL {
        let (_mock, provider) = setup(tag);
        provider.create_sandbox().await.unwrap();

        let result = provider.run_command(CommandSpec::new("false")).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, 1);

        let result = provider
            .run_command(CommandSpec::new("echo").args(["hello", "world"]))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout, "hello world\n");
    }
}

/// Commands run in the backend's working directory
#[tokio::test(start_paused = true)]
async fn test_commands_run_in_workdir() {
    for tag in ProviderTag::ALL {
        let (_mock, provider) = setup(tag);
        provider.create_sandbox().await.unwrap();

        let result = provider.run_command(CommandSpec::new("pwd")).await.unwrap();
        assert_eq!(result.stdout.trim(), expected_workdir(tag), "{tag}");

        let result = provider
            .run_command(CommandSpec::new("pwd").cwd("/tmp"))
            .await
            .unwrap();
        assert_eq!(result.stdout.trim(), "/tmp", "{tag}");
    }
}

/// A configured working directory wins over the backend default
#[tokio::test(start_paused = true)]
async fn test_working_directory_override() {
    for tag in ProviderTag::ALL {
        let config = SandboxProviderConfig::builder()
            .working_directory("/srv/site")
            .build()
            .unwrap();
        let (_mock, provider) = setup_with(tag, config);
        provider.create_sandbox().await.unwrap();

        let result = provider.run_command(CommandSpec::new("pwd")).await.unwrap();
        assert_eq!(result.stdout.trim(), "/srv/site", "{tag}");
    }
}

/// Daytona derives its workdir from the reported home directory
#[tokio::test(start_paused = true)]
async fn test_daytona_workdir_follows_home() {
    let mock = Arc::new(
        MockRemote::new("daytona")
            .with_native_fs(true)
            .with_home_dir("/home/daytona"),
    );
    let provider = providers::build(ProviderTag::Daytona, mock.clone(), SandboxProviderConfig::default());
    provider.create_sandbox().await.unwrap();

    let result = provider.run_command(CommandSpec::new("pwd")).await.unwrap();
    assert_eq!(result.stdout.trim(), "/home/daytona/app");
}

/// Modal probes its workdir once and caches it
#[tokio::test(start_paused = true)]
async fn test_modal_workdir_probed_once() {
    let (mock, provider) = setup(ProviderTag::Modal);
    provider.create_sandbox().await.unwrap();
    provider.write_file("a.txt", "a").await.unwrap();
    provider.read_file("a.txt").await.unwrap();
    provider.list_files(None).await.unwrap();

    let probes = mock.count_commands(|c| c.program == "pwd" && c.cwd.is_none());
    assert_eq!(probes, 1);
}

/// create_sandbox replaces and destroys the previous session
#[tokio::test(start_paused = true)]
async fn test_create_replaces_previous_session() {
    for tag in ProviderTag::ALL {
        let (mock, provider) = setup(tag);
        let first = provider.create_sandbox().await.unwrap();
        provider.write_file("old.txt", "old").await.unwrap();

        let second = provider.create_sandbox().await.unwrap();
        assert_ne!(first.sandbox_id, second.sandbox_id);
        assert_eq!(mock.live_sessions(), vec![second.sandbox_id.clone()], "{tag}");
        assert_eq!(mock.destroyed_sessions(), vec![first.sandbox_id], "{tag}");
        assert!(provider.known_files().is_empty(), "{tag}: shadow set not reset");
        assert_eq!(provider.sandbox_info().unwrap().sandbox_id, second.sandbox_id);
    }
}

/// A backend that cannot allocate a session yields a provisioning error
#[tokio::test(start_paused = true)]
async fn test_create_failure_is_provisioning_error() {
    let (mock, provider) = setup(ProviderTag::E2b);
    mock.fail_create(true);

    let err = provider.create_sandbox().await.unwrap_err();
    assert!(matches!(err, CoreError::Provisioning(ref m) if m.contains("no capacity")), "{err}");
    assert!(!provider.is_alive());
}

/// Info and URL come from cached state
#[tokio::test(start_paused = true)]
async fn test_info_and_url() {
    let (_mock, provider) = setup(ProviderTag::E2b);
    let info = provider.create_sandbox().await.unwrap();

    assert_eq!(info.provider, ProviderTag::E2b);
    assert_eq!(info.url, format!("https://5173-{}.e2b.mock", info.sandbox_id));
    assert_eq!(provider.sandbox_url(), Some(info.url.clone()));
    assert_eq!(provider.sandbox_info(), Some(info));
}

/// A remote call exceeding the timeout is an error, not a result
#[tokio::test(start_paused = true)]
async fn test_slow_command_times_out() {
    let config = SandboxProviderConfig::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let (mock, provider) = setup_with(ProviderTag::Vercel, config);
    provider.create_sandbox().await.unwrap();

    mock.set_exec_delay(Some(Duration::from_secs(5)));
    let err = provider
        .run_command(CommandSpec::new("echo").arg("slow"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Timeout(d) if d == Duration::from_secs(1)), "{err}");
    assert!(provider.is_alive());
}

/// Capabilities reflect the backend profile
#[tokio::test]
async fn test_capabilities() {
    let (_mock, e2b) = setup(ProviderTag::E2b);
    let caps = e2b.capabilities();
    assert!(caps.native_filesystem && caps.reconnect && !caps.tooling_bootstrap);
    assert!(e2b.as_reconnectable().is_some());

    let (_mock, compute) = setup(ProviderTag::Compute);
    let caps = compute.capabilities();
    assert!(!caps.native_filesystem && !caps.reconnect && caps.tooling_bootstrap);
    assert!(compute.as_reconnectable().is_none());
}

/// Native mkdir reporting "already exists" is not an error
#[tokio::test(start_paused = true)]
async fn test_native_mkdir_tolerates_existing_dir() {
    let (mock, provider) = setup(ProviderTag::E2b);
    let info = provider.create_sandbox().await.unwrap();
    mock.put_file(&info.sandbox_id, "/home/user/app/pre/seed.txt", "seed");

    provider.write_file("pre/x.txt", "x").await.unwrap();
    assert_eq!(mock.count_commands(|c| c.program == "mkdir"), 0);
    assert_eq!(
        mock.file(&info.sandbox_id, "/home/user/app/pre/x.txt").as_deref(),
        Some("x")
    );
}

/// Other native mkdir failures fall back to mkdir -p, whose failure is fatal
#[tokio::test(start_paused = true)]
async fn test_native_mkdir_failure_falls_back_to_shell() {
    let (mock, provider) = setup(ProviderTag::Daytona);
    let info = provider.create_sandbox().await.unwrap();
    mock.put_file(&info.sandbox_id, "/home/user/app/blocker", "i am a file");

    let err = provider.write_file("blocker/x.txt", "x").await.unwrap_err();
    match err {
        CoreError::FileWrite { path, reason } => {
            assert_eq!(path, "/home/user/app/blocker");
            assert!(reason.contains("File exists"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.count_commands(|c| c.program == "mkdir"), 1);
}
