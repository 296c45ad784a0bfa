//! Promotion of staged snapshots to the live installation.
//!
//! The live directory is never modified in place. A promote moves the snapshot
//! next to the live path, retires the current tree under a sibling name, and
//! then renames the snapshot into place. That final same-volume rename is the
//! commit point:
//!
//! ```text
//! <parent>/<name>.appsync-incoming-<token>   staged next to live
//! <parent>/<name>.appsync-retired-<token>    prior tree, between retire and cleanup
//! <parent>/<name>                            live
//! ```
//!
//! If the process dies between retire and commit, the live path is briefly
//! missing. [`InstallationSwapper::recover`] restores the retired tree, and the
//! reconciler runs it under the install lock before every attempt.

mod lock;

pub use lock::InstallLock;

use crate::constants::{INCOMING_MARKER, RETIRED_MARKER};
use crate::core::DeployError;
use crate::snapshot::{Snapshot, StagingArea, verify_tree};
use crate::utils::fs::{copy_dir, is_non_empty_dir, remove_dir_all};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Steps of a promote, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SwapStep {
    /// Snapshot is non-empty and matches its digest.
    Verified,
    /// Snapshot sits next to the live path on the same volume.
    Staged,
    /// Prior live tree renamed aside (skipped on first install).
    Retired,
    /// Snapshot renamed into the live path.
    Committed,
    /// Retired tree and staging directory removed.
    Cleaned,
}

/// What [`InstallationSwapper::recover`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// A retired tree was moved back into the missing live path.
    pub restored: bool,
    /// Leftover incoming or retired trees removed.
    pub removed: usize,
}

/// Moves snapshots into a live installation path.
#[derive(Debug, Clone, Default)]
pub struct InstallationSwapper;

impl InstallationSwapper {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Atomically replaces the tree at `live_path` with `snapshot`.
    ///
    /// On failure before the commit rename the prior live tree is untouched
    /// and the snapshot's staging directory is removed.
    pub async fn promote(&self, snapshot: Snapshot, live_path: &Path) -> Result<(), DeployError> {
        self.promote_until(snapshot, live_path, SwapStep::Cleaned).await
    }

    /// Runs a promote up to and including `last`, then stops as if the process died.
    ///
    /// Only [`SwapStep::Cleaned`] completes a promote; anything earlier leaves
    /// the filesystem in the state a crash at that point would, for
    /// [`recover`](Self::recover) to repair.
    #[doc(hidden)]
    pub async fn promote_until(
        &self,
        snapshot: Snapshot,
        live_path: &Path,
        last: SwapStep,
    ) -> Result<(), DeployError> {
        let live = live_path.to_path_buf();
        let staging_dir = snapshot.staging_dir.clone();

        let result = tokio::task::spawn_blocking(move || run_promote(&snapshot, &live, last))
            .await
            .map_err(|e| DeployError::SwapFailed {
                live_path: live_path.display().to_string(),
                reason: format!("swap task failed: {e}"),
            })
            .and_then(|inner| inner);

        if result.is_err() || last == SwapStep::Cleaned {
            StagingArea::discard(&staging_dir).await;
        }
        result
    }

    /// Repairs the leftovers of an interrupted promote at `live_path`.
    ///
    /// When the live path is missing, the most recent retired tree is renamed
    /// back. All other incoming and retired siblings are deleted.
    pub async fn recover(&self, live_path: &Path) -> Result<RecoveryReport, DeployError> {
        let live = live_path.to_path_buf();
        tokio::task::spawn_blocking(move || run_recover(&live))
            .await
            .map_err(|e| DeployError::SwapFailed {
                live_path: live_path.display().to_string(),
                reason: format!("recovery task failed: {e}"),
            })?
    }
}

fn swap_failed(live: &Path, reason: String) -> DeployError {
    DeployError::SwapFailed {
        live_path: live.display().to_string(),
        reason,
    }
}

fn sibling(live: &Path, marker: &str) -> Result<PathBuf, DeployError> {
    let name = live
        .file_name()
        .ok_or_else(|| swap_failed(live, "live path has no file name".to_string()))?;
    Ok(live.with_file_name(format!(
        "{}{marker}{}",
        name.to_string_lossy(),
        Uuid::new_v4().simple()
    )))
}

fn run_promote(snapshot: &Snapshot, live: &Path, last: SwapStep) -> Result<(), DeployError> {
    // Verify
    if !is_non_empty_dir(&snapshot.root) {
        return Err(DeployError::IntegrityViolation {
            reason: format!("snapshot root {} is missing or empty", snapshot.root.display()),
        });
    }
    verify_tree(&snapshot.root, &snapshot.digest)?;
    debug!(step = ?SwapStep::Verified, version_id = %snapshot.version_id, "Snapshot verified");
    if last == SwapStep::Verified {
        return Ok(());
    }

    // Stage on the live volume
    if let Some(parent) = live.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| swap_failed(live, format!("cannot create {}: {e}", parent.display())))?;
    }
    let incoming = sibling(live, INCOMING_MARKER)?;
    match fs::rename(&snapshot.root, &incoming) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(live_path = %live.display(), "Staging is on another volume, copying snapshot");
            if let Err(copy_err) = copy_dir(&snapshot.root, &incoming) {
                let _ = remove_dir_all(&incoming);
                return Err(swap_failed(live, format!("{copy_err:#}")));
            }
        }
        Err(e) => {
            return Err(swap_failed(live, format!("cannot stage snapshot next to live path: {e}")));
        }
    }
    debug!(step = ?SwapStep::Staged, incoming = %incoming.display(), "Snapshot staged next to live path");
    if last == SwapStep::Staged {
        return Ok(());
    }

    // Retire
    let retired = match fs::symlink_metadata(live) {
        Ok(_) => {
            let retired = sibling(live, RETIRED_MARKER)?;
            if let Err(e) = fs::rename(live, &retired) {
                let _ = remove_dir_all(&incoming);
                return Err(swap_failed(live, format!("cannot retire live tree: {e}")));
            }
            Some(retired)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            let _ = remove_dir_all(&incoming);
            return Err(swap_failed(live, format!("cannot inspect live tree: {e}")));
        }
    };
    debug!(step = ?SwapStep::Retired, first_install = retired.is_none(), "Live tree retired");
    if last == SwapStep::Retired {
        return Ok(());
    }

    // Commit
    if let Err(e) = fs::rename(&incoming, live) {
        if let Some(retired) = &retired
            && let Err(restore_err) = fs::rename(retired, live)
        {
            warn!(
                live_path = %live.display(),
                error = %restore_err,
                "Failed to restore retired tree; recovery will retry"
            );
        }
        let _ = remove_dir_all(&incoming);
        return Err(swap_failed(live, format!("commit rename failed: {e}")));
    }
    info!(step = ?SwapStep::Committed, version_id = %snapshot.version_id, live_path = %live.display(), "Snapshot promoted");
    if last == SwapStep::Committed {
        return Ok(());
    }

    // Cleanup
    if let Some(retired) = retired
        && let Err(e) = remove_dir_all(&retired)
    {
        warn!(retired = %retired.display(), error = %format!("{e:#}"), "Failed to remove retired tree");
    }
    debug!(step = ?SwapStep::Cleaned, "Promote complete");
    Ok(())
}

fn run_recover(live: &Path) -> Result<RecoveryReport, DeployError> {
    let Some(parent) = live.parent() else {
        return Ok(RecoveryReport::default());
    };
    let name = live.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let retired_prefix = format!("{name}{RETIRED_MARKER}");
    let incoming_prefix = format!("{name}{INCOMING_MARKER}");

    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RecoveryReport::default()),
        Err(e) => return Err(swap_failed(live, format!("cannot scan {}: {e}", parent.display()))),
    };

    let mut retired: Vec<(SystemTime, PathBuf)> = Vec::new();
    let mut incoming: Vec<PathBuf> = Vec::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.starts_with(&retired_prefix) {
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            retired.push((modified, entry.path()));
        } else if file_name.starts_with(&incoming_prefix) {
            incoming.push(entry.path());
        }
    }

    let mut report = RecoveryReport::default();
    let live_exists = fs::symlink_metadata(live).is_ok();

    if !live_exists && !retired.is_empty() {
        retired.sort();
        if let Some((_, newest)) = retired.pop() {
            fs::rename(&newest, live).map_err(|e| {
                swap_failed(live, format!("cannot restore {}: {e}", newest.display()))
            })?;
            warn!(live_path = %live.display(), "Restored prior installation after interrupted promote");
            report.restored = true;
        }
    }

    for leftover in retired.into_iter().map(|(_, path)| path).chain(incoming) {
        match remove_dir_all(&leftover) {
            Ok(()) => report.removed += 1,
            Err(e) => {
                warn!(path = %leftover.display(), error = %format!("{e:#}"), "Failed to remove leftover tree");
            }
        }
    }

    if report.removed > 0 {
        debug!(live_path = %live.display(), removed = report.removed, "Removed leftovers of interrupted promote");
    }
    Ok(report)
}
