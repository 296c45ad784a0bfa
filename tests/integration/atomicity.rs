//! Crash at every promote step: the live path is always one complete version.

use super::Deployment;
use appsync_cli::reconcile::Shutdown;
use appsync_cli::snapshot::{SnapshotFetcher, tree_digest};
use appsync_cli::swap::{InstallationSwapper, SwapStep};

const CRASH_POINTS: [SwapStep; 4] =
    [SwapStep::Verified, SwapStep::Staged, SwapStep::Retired, SwapStep::Committed];

fn siblings(d: &Deployment) -> Vec<String> {
    let parent = d.live.parent().unwrap();
    let mut names: Vec<String> = std::fs::read_dir(parent)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("widget.appsync-"))
        .filter(|name| !name.ends_with(".lock"))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_crash_during_update_leaves_old_or_new() {
    for crash_at in CRASH_POINTS {
        let d = Deployment::new();
        d.oracle.push_ok("A");
        d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap();
        let old_digest = tree_digest(&d.live).unwrap();

        let snapshot = d.fetcher.fetch("B").await.unwrap();
        let new_digest = snapshot.digest.clone();
        let swapper = InstallationSwapper::new();
        swapper.promote_until(snapshot, &d.live, crash_at).await.unwrap();

        swapper.recover(&d.live).await.unwrap();

        let live_digest = tree_digest(&d.live).unwrap();
        if crash_at >= SwapStep::Committed {
            assert_eq!(live_digest, new_digest, "crash after {crash_at:?}");
        } else {
            assert_eq!(live_digest, old_digest, "crash after {crash_at:?}");
        }
        assert!(siblings(&d).is_empty(), "leftovers after {crash_at:?}: {:?}", siblings(&d));
    }
}

#[tokio::test]
async fn test_crash_during_first_install_leaves_absent_or_new() {
    for crash_at in CRASH_POINTS {
        let d = Deployment::new();

        let snapshot = d.fetcher.fetch("A").await.unwrap();
        let new_digest = snapshot.digest.clone();
        let swapper = InstallationSwapper::new();
        swapper.promote_until(snapshot, &d.live, crash_at).await.unwrap();

        swapper.recover(&d.live).await.unwrap();

        if crash_at >= SwapStep::Committed {
            assert_eq!(tree_digest(&d.live).unwrap(), new_digest);
        } else {
            assert!(!d.live.exists(), "partial live tree after {crash_at:?}");
        }
        assert!(siblings(&d).is_empty());
    }
}

#[tokio::test]
async fn test_next_cycle_converges_after_crash() {
    for crash_at in CRASH_POINTS {
        let d = Deployment::new();
        d.oracle.push_ok("A");
        d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap();

        let snapshot = d.fetcher.fetch("B").await.unwrap();
        let expected = snapshot.digest.clone();
        InstallationSwapper::new().promote_until(snapshot, &d.live, crash_at).await.unwrap();

        // No recover() here: the reconciler repairs under its own lock
        d.oracle.push_ok("B");
        let report = d.reconciler().run_cycle(&mut Shutdown::never()).await.unwrap();

        assert!(report.outcome.installed(), "crash after {crash_at:?}");
        assert_eq!(tree_digest(&d.live).unwrap(), expected);
        assert_eq!(d.store.read().await.unwrap().installed_id, "B");
        assert!(siblings(&d).is_empty());
        assert_eq!(std::fs::read_dir(d.fetcher.staging().root()).unwrap().count(), 0);
    }
}
