//! The `appsync` binary end to end.

use appsync_cli::config::DeployConfig;
use appsync_cli::test_utils::zip_with_root;
use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SHA: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

fn appsync(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("appsync").unwrap();
    cmd.arg("--config").arg(config).env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn serve_release(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/repos/acme/widget/commits/main");
        then.status(200).json_body(json!({
            "sha": SHA,
            "commit": {
                "committer": { "date": "2024-05-01T12:00:00Z" },
                "message": "Ship it"
            }
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("/acme/widget/archive/{SHA}.zip"));
        then.status(200).body(zip_with_root("widget-main", &[("index.js", "start()")]));
    });
}

fn write_config(temp: &TempDir, server: &MockServer, edit: impl FnOnce(&mut DeployConfig)) -> PathBuf {
    let mut config =
        DeployConfig::new("acme/widget", temp.path().join("apps").join("widget").display().to_string());
    config.source.oracle_endpoint = server.url("/repos/{repository}/commits/{channel}");
    config.source.snapshot_endpoint_template = server.url("/{repository}/archive/{version}.zip");
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    edit(&mut config);

    let path = temp.path().join("config.toml");
    std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
    path
}

#[test]
fn test_config_init_and_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("appsync").join("config.toml");

    appsync(&path)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config"));
    assert!(path.exists());

    appsync(&path)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));

    appsync(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_missing_config_fails_with_suggestion() {
    let temp = TempDir::new().unwrap();

    appsync(&temp.path().join("missing.toml"))
        .arg("sync")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("appsync config init"));
}

#[test]
fn test_invalid_config_is_reported() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "[source]\nrepository = \n").unwrap();

    appsync(&path).arg("status").assert().failure().stderr(predicate::str::contains("error"));
}

#[test]
fn test_status_before_install() {
    let server = MockServer::start();
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, &server, |_| {});

    appsync(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing installed yet"));
}

#[test]
fn test_sync_then_status_and_check() {
    let server = MockServer::start();
    serve_release(&server);
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, &server, |_| {});

    appsync(&config)
        .args(["sync", "--no-launch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed").and(predicate::str::contains("4b825dc642cb")));
    assert_eq!(
        std::fs::read_to_string(temp.path().join("apps").join("widget").join("index.js")).unwrap(),
        "start()"
    );

    appsync(&config)
        .args(["sync", "--no-launch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));

    appsync(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("verified"));

    let output = appsync(&config).args(["check", "--json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["update_available"], false);
    assert_eq!(value["latest"]["id"], SHA);
}

#[test]
fn test_watch_stops_after_max_cycles() {
    let server = MockServer::start();
    serve_release(&server);
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp, &server, |_| {});

    appsync(&config)
        .args(["watch", "--interval", "0", "--max-cycles", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 cycles: 1 installs, 0 failures"));
}

#[cfg(unix)]
#[test]
fn test_broken_dependencies_fail_sync_but_keep_install() {
    let server = MockServer::start();
    serve_release(&server);
    let temp = TempDir::new().unwrap();
    let marker = temp.path().join("launched");
    let config = write_config(&temp, &server, |config| {
        config.hooks.dependency_install =
            Some(vec!["sh".into(), "-c".into(), "echo missing peer >&2; exit 3".into()]);
        config.hooks.launch =
            Some(vec!["sh".into(), "-c".into(), format!("touch {}", marker.display())]);
    });

    appsync(&config)
        .arg("sync")
        .assert()
        .failure()
        .stdout(predicate::str::contains("not launching"))
        .stderr(predicate::str::contains("exit code 3"));

    assert!(temp.path().join("apps").join("widget").join("index.js").exists());
    assert!(!marker.exists());

    appsync(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("failed"));
}
