//! Reconciliation scenarios through the public API.

use super::Deployment;
use appsync_cli::core::{DeployError, ErrorClass, UnavailableCause};
use appsync_cli::reconcile::{CycleOutcome, ReconcilePhase, Shutdown};
use appsync_cli::snapshot::{StagingArea, tree_digest};
use appsync_cli::swap::InstallLock;
use std::time::Duration;

#[tokio::test]
async fn test_first_run_installs_and_records() {
    let d = Deployment::new();
    d.oracle.push_ok("A");

    let report = d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap();

    assert!(matches!(report.outcome, CycleOutcome::Installed { previous_id: None, .. }));
    assert_eq!(d.fetcher.fetches(), vec!["A".to_string()]);
    assert_eq!(report.count(ReconcilePhase::Swapping), 1);
    assert_eq!(d.read_live("index.js"), "console.log('A')");
    assert_eq!(d.store.read().await.unwrap().installed_id, "A");
}

#[tokio::test]
async fn test_reconcile_twice_fetches_once() {
    let d = Deployment::new();
    d.oracle.push_ok("A");
    d.oracle.push_ok("A");
    let reconciler = d.reconciler();

    let first = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();
    let installed_at = d.store.read().await.unwrap().installed_at;
    let second = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

    assert!(first.outcome.installed());
    assert!(matches!(second.outcome, CycleOutcome::UpToDate { .. }));
    assert_eq!(second.count(ReconcilePhase::Fetching), 0);
    assert_eq!(d.fetcher.fetches().len(), 1);

    let state = d.store.read().await.unwrap();
    assert_eq!(state.installed_at, installed_at);
    assert!(state.last_checked_at >= installed_at);
}

#[tokio::test]
async fn test_update_replaces_tree_completely() {
    let d = Deployment::new();
    d.oracle.push_ok("A");
    d.oracle.push_ok("B");
    let reconciler = d.reconciler();

    reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();
    let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

    match report.outcome {
        CycleOutcome::Installed { previous_id, .. } => assert_eq!(previous_id.as_deref(), Some("A")),
        other => panic!("expected install, got {other:?}"),
    }
    assert_eq!(d.read_live("lib/util.js"), "exports.b = 1");
    assert!(!d.live.join("package.json").exists());
}

#[tokio::test]
async fn test_unreachable_oracle_is_no_regression() {
    let d = Deployment::new();
    d.oracle.push_ok("A");
    d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap();
    let state_before = d.store.read().await.unwrap();
    let tree_before = tree_digest(&d.live).unwrap();

    d.oracle.push_err(UnavailableCause::Network);
    let err = d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap_err();

    assert!(matches!(err, DeployError::RetriesExhausted { attempts: 4, .. }));
    assert_eq!(d.store.read().await.unwrap().installed_id, state_before.installed_id);
    assert_eq!(d.store.read().await.unwrap(), state_before);
    assert_eq!(tree_digest(&d.live).unwrap(), tree_before);
    assert_eq!(d.fetcher.fetches().len(), 1);
}

#[tokio::test]
async fn test_fetch_fails_three_times_then_succeeds() {
    let d = Deployment::new();
    d.oracle.push_ok("A");
    d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap();

    d.oracle.push_ok("B");
    d.fetcher.fail_next(3);
    let report = d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap();

    assert_eq!(report.attempts, 4);
    assert_eq!(report.count(ReconcilePhase::RetryWait), 3);
    assert_eq!(report.count(ReconcilePhase::Swapping), 1);
    assert_eq!(
        report.retry_delays,
        vec![Duration::from_millis(5), Duration::from_millis(10), Duration::from_millis(20)]
    );
    assert_eq!(d.fetcher.fetches(), vec!["A", "B", "B", "B", "B"]);
    assert_eq!(d.store.read().await.unwrap().installed_id, "B");
}

#[tokio::test]
async fn test_rate_limited_oracle_is_retried() {
    let d = Deployment::new();
    d.oracle.push_err(UnavailableCause::RateLimited);
    d.oracle.push_ok("A");

    let report = d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(d.oracle.calls(), 2);
    assert!(report.outcome.installed());
}

#[tokio::test]
async fn test_malformed_archive_is_not_retried() {
    let d = Deployment::new();
    d.fetcher.publish("C", b"definitely not a zip".to_vec());
    d.oracle.push_ok("C");

    let err = d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::Malformed);
    assert_eq!(d.fetcher.fetches().len(), 1);
    assert!(!d.live.exists());
    assert!(d.store.read().await.is_none());
}

#[tokio::test]
async fn test_corrupt_state_triggers_reinstall() {
    let d = Deployment::new();
    d.oracle.push_ok("A");
    let reconciler = d.reconciler();
    reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

    std::fs::write(d.store.path(), "{ not json").unwrap();
    let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

    assert!(report.outcome.installed());
    assert_eq!(d.store.read().await.unwrap().installed_id, "A");
}

#[tokio::test]
async fn test_deleted_live_tree_is_reinstalled() {
    let d = Deployment::new();
    d.oracle.push_ok("A");
    let reconciler = d.reconciler();
    reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

    std::fs::remove_dir_all(&d.live).unwrap();
    let report = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

    assert!(report.outcome.installed());
    assert_eq!(d.read_live("index.js"), "console.log('A')");
}

#[tokio::test]
async fn test_concurrent_reconciler_fails_fast() {
    let d = Deployment::new();
    d.oracle.push_ok("A");
    let held = InstallLock::acquire(&d.live, Duration::ZERO).await.unwrap();

    let err = d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap_err();
    assert!(matches!(err, DeployError::LockUnavailable { .. }));
    assert!(d.fetcher.fetches().is_empty());

    drop(held);
    d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap();
    assert_eq!(d.store.read().await.unwrap().installed_id, "A");
}

#[tokio::test]
async fn test_stale_staging_is_swept() {
    let d = Deployment::new();
    let stale = d.fetcher.staging().root().join("abandoned-run");
    std::fs::create_dir_all(stale.join("content")).unwrap();
    d.oracle.push_ok("A");

    d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap();

    assert!(!stale.exists());
    let leftovers = std::fs::read_dir(d.fetcher.staging().root()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_sweep_spares_live_tree_and_foreign_directories() {
    let d = Deployment::new();
    let apps = d.live.parent().unwrap().to_path_buf();
    let photos = apps.join("photos");
    std::fs::create_dir_all(&photos).unwrap();
    std::fs::write(photos.join("a.jpg"), "jpeg").unwrap();
    d.oracle.push_ok("A");

    // Staging root deliberately set to the directory holding the live tree
    let reconciler = d.reconciler().with_staging(StagingArea::new(&apps));
    let first = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();
    let second = reconciler.run_cycle(&mut Shutdown::never()).await.unwrap();

    assert!(first.outcome.installed());
    assert!(matches!(second.outcome, CycleOutcome::UpToDate { .. }));
    assert_eq!(std::fs::read_to_string(photos.join("a.jpg")).unwrap(), "jpeg");
    assert_eq!(d.read_live("index.js"), "console.log('A')");
    assert_eq!(d.fetcher.fetches().len(), 1);
}

#[tokio::test]
async fn test_unusable_staging_root_is_retried() {
    let d = Deployment::new();
    let staging_root = d.fetcher.staging().root().to_path_buf();
    std::fs::create_dir_all(staging_root.parent().unwrap()).unwrap();
    std::fs::write(&staging_root, "in the way").unwrap();
    d.oracle.push_ok("A");

    let err = d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap_err();

    match err {
        DeployError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 4);
            assert!(matches!(*last, DeployError::StagingIo { .. }), "last error: {last}");
        }
        other => panic!("expected retries to be exhausted, got {other:?}"),
    }
    assert_eq!(d.fetcher.fetches().len(), 4);
    assert!(!d.live.exists());

    std::fs::remove_file(&staging_root).unwrap();
    let report = d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap();
    assert!(report.outcome.installed());
}
