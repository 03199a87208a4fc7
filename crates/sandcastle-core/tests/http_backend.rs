//! Providers driven over HTTP against a local gateway.
//!
//! A wiremock server stands in for the sandbox gateway, so timeouts here
//! run on the real clock.

use sandcastle_core::{
    CommandSpec, CoreError, Credentials, InstallOptions, SandboxFactory, SandboxProviderConfig,
};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn exec_ok() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_json(serde_json::json!({ "stdout": "", "stderr": "", "exitCode": 0 }))
}

/// Gateway with one vercel session whose commands answer at once, except
/// those containing `slow`, which answer after `delay`.
async fn gateway(slow: &str, delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "sbx-1" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sessions/sbx-1/ports/5173"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "host": "5173-sbx-1.vercel.run" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/sbx-1/exec"))
        .and(body_string_contains(slow))
        .respond_with(exec_ok().set_delay(delay))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions/sbx-1/exec"))
        .respond_with(exec_ok())
        .with_priority(10)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/sessions/sbx-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    server
}

fn config(server: &MockServer) -> SandboxProviderConfig {
    SandboxProviderConfig {
        provider: Some("vercel".into()),
        credentials: Credentials {
            vercel_token: Some("tok".into()),
            ..Default::default()
        },
        api_url: Some(server.uri()),
        timeout: Duration::from_secs(1),
        install_timeout: Duration::from_secs(10),
        install: InstallOptions {
            auto_restart: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// An install may outlive the ordinary call timeout
#[tokio::test]
async fn test_install_uses_install_timeout() {
    let server = gateway("npm install", Duration::from_secs(2)).await;
    let factory = SandboxFactory::new(config(&server));
    let provider = factory.create(None, None).expect("provider should build");
    let info = provider.create_sandbox().await.expect("create should succeed");
    assert_eq!(info.url, "https://5173-sbx-1.vercel.run");

    let result = provider
        .install_packages(&["lodash".to_string()])
        .await
        .expect("install should finish within the install timeout");
    assert!(result.success);

    provider.terminate().await;
}

/// Ordinary commands are still cut off at the call timeout
#[tokio::test]
async fn test_command_keeps_call_timeout() {
    let server = gateway("sleep", Duration::from_secs(3)).await;
    let factory = SandboxFactory::new(config(&server));
    let provider = factory.create(None, None).expect("provider should build");
    provider.create_sandbox().await.expect("create should succeed");

    let err = provider
        .run_command(CommandSpec::new("sleep").arg("5"))
        .await
        .expect_err("command should time out");
    assert!(matches!(err, CoreError::Timeout(d) if d == Duration::from_secs(1)), "{err}");

    provider.terminate().await;
}

/// Without a gateway URL the HTTP backends refuse to build
#[tokio::test]
async fn test_gateway_url_required() {
    let config = SandboxProviderConfig {
        api_url: None,
        ..config(&MockServer::start().await)
    };
    let err = SandboxFactory::new(config)
        .create(None, None)
        .err()
        .expect("missing URL should fail");
    assert!(matches!(err, CoreError::ProviderConfig(ref m) if m.contains("VERCEL_API_URL")), "{err}");
}
