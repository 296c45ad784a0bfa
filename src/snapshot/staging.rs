//! Fetch-local staging directories.

use super::Snapshot;
use super::archive::{discover_root, extract_zip};
use super::digest::{manifest_digest, tree_manifest};
use crate::core::DeployError;
use crate::utils::fs::remove_dir_all;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const ARCHIVE_FILE: &str = "snapshot.zip";
const CONTENT_DIR: &str = "content";
const PREFIX_LEN: usize = 12;

/// Allocates unique staging directories below one root.
///
/// Each fetch gets `<root>/<id-prefix>-<uuid>`, so concurrent or repeated
/// fetches of the same version never share a directory.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a fresh, empty staging directory for `version_id`.
    pub async fn allocate(&self, version_id: &str) -> Result<PathBuf, DeployError> {
        let prefix: String =
            version_id.chars().filter(char::is_ascii_alphanumeric).take(PREFIX_LEN).collect();
        let prefix = if prefix.is_empty() { "snapshot".to_string() } else { prefix };
        let dir = self.root.join(format!("{prefix}-{}", Uuid::new_v4().simple()));

        tokio::fs::create_dir_all(&dir).await.map_err(|e| DeployError::StagingIo {
            path: dir.display().to_string(),
            reason: format!("failed to create staging directory: {e}"),
        })?;
        debug!(staging_dir = %dir.display(), version_id, "Allocated staging directory");
        Ok(dir)
    }

    /// Location inside a staging directory where the archive is downloaded.
    #[must_use]
    pub fn archive_path(staging_dir: &Path) -> PathBuf {
        staging_dir.join(ARCHIVE_FILE)
    }

    /// Extracts the downloaded archive inside `staging_dir` into a [`Snapshot`].
    ///
    /// On failure the whole staging directory is removed before the error is returned.
    pub async fn unpack(
        &self,
        staging_dir: PathBuf,
        version_id: &str,
    ) -> Result<Snapshot, DeployError> {
        let dir = staging_dir.clone();
        let version = version_id.to_string();

        let result = tokio::task::spawn_blocking(move || unpack_blocking(&dir, version))
            .await
            .map_err(|e| DeployError::ExtractError {
                reason: format!("extraction task failed: {e}"),
            })
            .and_then(|inner| inner);

        if result.is_err() {
            discard_dir(&staging_dir).await;
        }
        result
    }

    /// Stages an in-memory archive; used for local sources and tests.
    pub async fn stage_bytes(
        &self,
        version_id: &str,
        archive: &[u8],
    ) -> Result<Snapshot, DeployError> {
        let staging_dir = self.allocate(version_id).await?;
        let archive_path = Self::archive_path(&staging_dir);
        if let Err(e) = tokio::fs::write(&archive_path, archive).await {
            discard_dir(&staging_dir).await;
            return Err(DeployError::StagingIo {
                path: archive_path.display().to_string(),
                reason: format!("failed to write archive: {e}"),
            });
        }
        self.unpack(staging_dir, version_id).await
    }

    /// Best-effort removal of one staging directory.
    pub async fn discard(staging_dir: &Path) {
        discard_dir(staging_dir).await;
    }

    /// Removes staging directories left behind by interrupted runs.
    ///
    /// Only directories named the way [`allocate`](Self::allocate) names them are
    /// touched; anything else below the root is left alone. Must only be called
    /// while holding the install lock.
    pub async fn sweep(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            let ours = entry.file_name().to_str().is_some_and(is_staging_dir_name);
            if is_dir && ours {
                discard_dir(&entry.path()).await;
                removed += 1;
            } else {
                debug!(entry = %entry.path().display(), "Leaving foreign entry in staging root");
            }
        }
        if removed > 0 {
            debug!(staging_root = %self.root.display(), removed, "Swept stale staging directories");
        }
        removed
    }
}

/// Whether `name` has the `<prefix>-<uuid>` shape produced by [`StagingArea::allocate`].
fn is_staging_dir_name(name: &str) -> bool {
    let Some((prefix, token)) = name.rsplit_once('-') else {
        return false;
    };
    !prefix.is_empty()
        && prefix.len() <= PREFIX_LEN
        && prefix.chars().all(|c| c.is_ascii_alphanumeric())
        && token.len() == 32
        && token.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

fn unpack_blocking(staging_dir: &Path, version_id: String) -> Result<Snapshot, DeployError> {
    let archive = StagingArea::archive_path(staging_dir);
    let content = staging_dir.join(CONTENT_DIR);

    extract_zip(&archive, &content)?;
    let root = discover_root(&content)?;

    // The archive is no longer needed once extracted
    let _ = std::fs::remove_file(&archive);

    let manifest = tree_manifest(&root).map_err(|e| DeployError::ExtractError {
        reason: format!("cannot list extracted content: {e:#}"),
    })?;
    let digest = manifest_digest(&root, &manifest).map_err(|e| DeployError::StagingIo {
        path: root.display().to_string(),
        reason: format!("failed to hash extracted content: {e:#}"),
    })?;

    Ok(Snapshot {
        version_id,
        staging_dir: staging_dir.to_path_buf(),
        root,
        digest,
        manifest,
    })
}

/// Best-effort removal of a staging directory.
pub(crate) async fn discard_dir(dir: &Path) {
    let path = dir.to_path_buf();
    let result = tokio::task::spawn_blocking(move || remove_dir_all(&path)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(staging_dir = %dir.display(), error = %format!("{e:#}"), "Failed to remove staging directory"),
        Err(e) => warn!(staging_dir = %dir.display(), error = %e, "Staging cleanup task failed"),
    }
}
