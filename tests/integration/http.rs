//! The reconciler wired from a deploy config against local HTTP servers.

use appsync_cli::config::{DeployConfig, ProvisionEntry};
use appsync_cli::core::{DeployError, ErrorClass};
use appsync_cli::reconcile::{Reconciler, Shutdown};
use appsync_cli::snapshot::StagingArea;
use appsync_cli::state::StateStore;
use appsync_cli::test_utils::zip_with_root;
use httpmock::prelude::*;
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

const SHA: &str = "9f2c4e1b7a5d3c8e6f0a1b2c3d4e5f60718293a4";

fn config_for(server: &MockServer, temp: &TempDir) -> DeployConfig {
    let mut config =
        DeployConfig::new("acme/widget", temp.path().join("apps").join("widget").display().to_string());
    config.source.oracle_endpoint = server.url("/repos/{repository}/commits/{channel}");
    config.source.snapshot_endpoint_template = server.url("/{repository}/archive/{version}.zip");
    config.paths.state_path = Some(temp.path().join("state.json").display().to_string());
    config.retry.max_attempts = 3;
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 10;
    config
}

fn commit_body(sha: &str) -> serde_json::Value {
    json!({
        "sha": sha,
        "commit": {
            "committer": { "date": "2024-05-01T12:00:00Z" },
            "message": "Release widget\n\nWith notes"
        }
    })
}

fn live_path(temp: &TempDir) -> PathBuf {
    temp.path().join("apps").join("widget")
}

#[tokio::test]
async fn test_sync_installs_and_provisions() {
    let server = MockServer::start_async().await;
    let oracle = server.mock(|when, then| {
        when.method(GET).path("/repos/acme/widget/commits/main");
        then.status(200).json_body(commit_body(SHA));
    });
    let archive = server.mock(|when, then| {
        when.method(GET).path(format!("/acme/widget/archive/{SHA}.zip"));
        then.status(200).body(zip_with_root(
            &format!("widget-{SHA}"),
            &[("package.json", "{\"name\":\"widget\"}"), ("src/main.js", "run()")],
        ));
    });

    let temp = TempDir::new().unwrap();
    let secrets = temp.path().join("widget.env");
    std::fs::write(&secrets, "API_URL=https://example.invalid\n").unwrap();
    let mut config = config_for(&server, &temp);
    config.provision.push(ProvisionEntry {
        source: secrets.display().to_string(),
        target: ".env".to_string(),
    });

    let reconciler = Reconciler::from_config(&config.resolve().unwrap()).unwrap();
    let report = reconciler.sync(&mut Shutdown::never()).await.unwrap();

    assert!(report.cycle.outcome.installed());
    assert_eq!(report.cycle.outcome.version().summary(), Some("Release widget"));
    assert!(report.provisioning.as_ref().is_some_and(|p| p.succeeded()));
    assert!(!report.launched);

    let live = live_path(&temp);
    assert_eq!(std::fs::read_to_string(live.join("src/main.js")).unwrap(), "run()");
    assert_eq!(
        std::fs::read_to_string(live.join(".env")).unwrap(),
        "API_URL=https://example.invalid\n"
    );
    let state = StateStore::new(temp.path().join("state.json")).read().await.unwrap();
    assert_eq!(state.installed_id, SHA);

    // Provisioned files are not part of the snapshot and do not count as drift
    let again = reconciler.sync(&mut Shutdown::never()).await.unwrap();
    assert!(!again.cycle.outcome.installed());
    oracle.assert_calls(2);
    archive.assert_calls(1);
}

#[tokio::test]
async fn test_server_errors_are_retried_then_exhausted() {
    let server = MockServer::start_async().await;
    let oracle = server.mock(|when, then| {
        when.method(GET);
        then.status(503).body("unavailable");
    });

    let temp = TempDir::new().unwrap();
    let reconciler =
        Reconciler::from_config(&config_for(&server, &temp).resolve().unwrap()).unwrap();
    let err = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap_err();

    assert!(matches!(err, DeployError::RetriesExhausted { attempts: 3, .. }));
    oracle.assert_calls(3);
    assert!(!live_path(&temp).exists());
}

#[tokio::test]
async fn test_missing_repository_is_not_retried() {
    let server = MockServer::start_async().await;
    let oracle = server.mock(|when, then| {
        when.method(GET);
        then.status(404).json_body(json!({ "message": "Not Found" }));
    });

    let temp = TempDir::new().unwrap();
    let reconciler =
        Reconciler::from_config(&config_for(&server, &temp).resolve().unwrap()).unwrap();
    let err = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Malformed);
    oracle.assert_calls(1);
}

#[tokio::test]
async fn test_archive_download_failure_is_retried() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/repos/acme/widget/commits/main");
        then.status(200).json_body(commit_body(SHA));
    });
    let archive = server.mock(|when, then| {
        when.method(GET).path(format!("/acme/widget/archive/{SHA}.zip"));
        then.status(502);
    });

    let temp = TempDir::new().unwrap();
    let config = config_for(&server, &temp).resolve().unwrap();
    let staging_root = config.staging_root.clone();
    let reconciler = Reconciler::from_config(&config).unwrap();
    let err = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap_err();

    assert!(matches!(err, DeployError::RetriesExhausted { .. }));
    archive.assert_calls(3);
    let leftovers = std::fs::read_dir(&staging_root).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_bearer_token_comes_from_environment() {
    let server = MockServer::start_async().await;
    let oracle = server.mock(|when, then| {
        when.method(GET).header("authorization", "Bearer integration-token");
        then.status(200).json_body(commit_body(SHA));
    });

    // SAFETY: the variable name is unique to this test
    unsafe { std::env::set_var("APPSYNC_INTEGRATION_TOKEN", "integration-token") };

    let temp = TempDir::new().unwrap();
    let mut config = config_for(&server, &temp);
    config.source.token_env = Some("APPSYNC_INTEGRATION_TOKEN".to_string());
    let reconciler = Reconciler::from_config(&config.resolve().unwrap()).unwrap();

    let check = reconciler.check().await.unwrap();
    assert_eq!(check.latest.id, SHA);
    assert!(check.update_available());
    oracle.assert_calls(1);

    unsafe { std::env::remove_var("APPSYNC_INTEGRATION_TOKEN") };
}

#[tokio::test]
async fn test_sibling_installation_keeps_its_in_flight_snapshot() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/repos/acme/widget/commits/main");
        then.status(200).json_body(commit_body(SHA));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("/acme/widget/archive/{SHA}.zip"));
        then.status(200).body(zip_with_root("widget-main", &[("index.js", "a")]));
    });

    let temp = TempDir::new().unwrap();
    let a = config_for(&server, &temp).resolve().unwrap();
    let mut b = config_for(&server, &temp);
    b.paths.live_path = temp.path().join("apps").join("gadget").display().to_string();
    b.paths.state_path = Some(temp.path().join("gadget-state.json").display().to_string());
    let b = b.resolve().unwrap();
    assert_ne!(a.staging_root, b.staging_root);

    // A fetch for the other installation that has not been promoted yet
    let in_flight = StagingArea::new(&b.staging_root)
        .stage_bytes("next", &zip_with_root("gadget-next", &[("main.js", "b")]))
        .await
        .unwrap();

    let report = Reconciler::from_config(&a).unwrap().sync(&mut Shutdown::never()).await.unwrap();

    assert!(report.cycle.outcome.installed());
    assert_eq!(std::fs::read_to_string(in_flight.root.join("main.js")).unwrap(), "b");
}
