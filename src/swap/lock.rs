//! Cross-process lock scoped to one live installation path.
//!
//! The lock file sits next to the live directory (`<live>.appsync.lock`) so it
//! survives the directory being replaced. Locking uses OS-level advisory locks
//! via fs4; all file operations run in `spawn_blocking`.

use crate::constants::{LOCK_POLL_MAX_MS, LOCK_POLL_START_MS, LOCK_SUFFIX};
use crate::core::DeployError;
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_retry::strategy::ExponentialBackoff;
use tracing::debug;

/// Exclusive lock on a live installation path, released on drop.
///
/// # Example
///
/// ```rust,no_run
/// use appsync_cli::swap::InstallLock;
/// use std::path::Path;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), appsync_cli::core::DeployError> {
/// let _lock = InstallLock::acquire(Path::new("/opt/app"), Duration::ZERO).await?;
/// // promote, persist...
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InstallLock {
    /// The lock is held as long as this handle is open
    _file: Arc<File>,
    lock_path: PathBuf,
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        // The file itself stays: deleting it would let a waiter and a newcomer
        // lock two different inodes.
        debug!(lock_path = %self.lock_path.display(), "Install lock released");
    }
}

impl InstallLock {
    /// Returns the lock file guarding `live_path`.
    #[must_use]
    pub fn path_for(live_path: &Path) -> PathBuf {
        let name = live_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "install".to_string());
        live_path.with_file_name(format!("{name}{LOCK_SUFFIX}"))
    }

    /// Acquires the lock for `live_path`, polling for at most `timeout`.
    ///
    /// A zero timeout makes exactly one attempt. Fails with
    /// [`DeployError::LockUnavailable`] if another process holds the lock.
    pub async fn acquire(live_path: &Path, timeout: Duration) -> Result<Self, DeployError> {
        let lock_path = Self::path_for(live_path);
        let unavailable = || DeployError::LockUnavailable {
            live_path: live_path.display().to_string(),
            lock_path: lock_path.display().to_string(),
        };
        let io_failure = |reason: String| DeployError::SwapFailed {
            live_path: live_path.display().to_string(),
            reason,
        };

        if let Some(parent) = lock_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_failure(format!("cannot create {}: {e}", parent.display())))?;
        }

        let open_path = lock_path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().create(true).write(true).truncate(false).open(&open_path)
        })
        .await
        .map_err(|e| io_failure(format!("lock task failed: {e}")))?
        .map_err(|e| io_failure(format!("cannot open {}: {e}", lock_path.display())))?;
        let file = Arc::new(file);

        let start = Instant::now();
        let backoff = ExponentialBackoff::from_millis(LOCK_POLL_START_MS)
            .max_delay(Duration::from_millis(LOCK_POLL_MAX_MS));

        for delay in backoff {
            let handle = Arc::clone(&file);
            let locked = tokio::task::spawn_blocking(move || handle.try_lock_exclusive())
                .await
                .map_err(|e| io_failure(format!("lock task failed: {e}")))?;

            if let Ok(true) = locked {
                debug!(
                    lock_path = %lock_path.display(),
                    wait_ms = start.elapsed().as_millis(),
                    "Install lock acquired"
                );
                return Ok(Self {
                    _file: file,
                    lock_path,
                });
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(unavailable());
            }
            tokio::time::sleep(delay.min(remaining)).await;
        }

        Err(unavailable())
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}
