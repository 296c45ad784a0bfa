//! Durable record of the installed version.
//!
//! The record lives in a small JSON file outside the live installation so it
//! survives the installation being wiped and recreated. Writes go through
//! [`atomic_write`](crate::utils::fs::atomic_write): a crash mid-write leaves the
//! previous record intact, never a truncated one.
//!
//! An unreadable or corrupt record is treated exactly like a missing one. The
//! reconciler then reinstalls rather than trusting damaged data.

use crate::core::DeployError;
use crate::utils::fs::atomic_write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// What is currently installed at the live path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationState {
    /// Version identifier last promoted to live.
    pub installed_id: String,
    /// When that promotion completed.
    pub installed_at: DateTime<Utc>,
    /// Most recent reconciliation attempt (observability only).
    pub last_checked_at: DateTime<Utc>,
    /// `sha256:<hex>` digest of the promoted tree.
    ///
    /// Records written before digests existed deserialize with `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<String>,
    /// Outcome of the last dependency install; `None` if none has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies_ok: Option<bool>,
}

impl InstallationState {
    /// A record for a promotion that just completed.
    pub fn promoted(installed_id: impl Into<String>, content_digest: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            installed_id: installed_id.into(),
            installed_at: now,
            last_checked_at: now,
            content_digest,
            dependencies_ok: None,
        }
    }

    /// Returns a copy with `last_checked_at` set to now.
    #[must_use]
    pub fn checked_now(&self) -> Self {
        Self {
            last_checked_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Reads and writes the [`InstallationState`] file.
///
/// The file list covered by `content_digest` is kept in a sidecar next to the
/// record (`<state>.manifest`) so the record itself stays small.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored record, or `None` if it is absent or unusable.
    pub async fn read(&self) -> Option<InstallationState> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No installation state recorded");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Installation state is unreadable");
                return None;
            }
        };

        match serde_json::from_str::<InstallationState>(&content) {
            Ok(state) if !state.installed_id.trim().is_empty() => Some(state),
            Ok(_) => {
                warn!(path = %self.path.display(), "Installation state has an empty identifier");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Installation state is corrupt");
                None
            }
        }
    }

    /// Replaces the stored record atomically.
    pub async fn write(&self, state: &InstallationState) -> Result<(), DeployError> {
        let content = serde_json::to_vec_pretty(state).map_err(|e| self.persist_error(e))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || atomic_write(&path, &content))
            .await
            .map_err(|e| self.persist_error(e))?
            .map_err(|e| self.persist_error(format!("{e:#}")))?;

        debug!(path = %self.path.display(), installed_id = %state.installed_id, "Installation state written");
        Ok(())
    }

    /// Location of the manifest sidecar.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".manifest");
        self.path.with_file_name(name)
    }

    /// Returns the recorded manifest, or `None` if absent or unusable.
    pub async fn read_manifest(&self) -> Option<Vec<String>> {
        let path = self.manifest_path();
        let content = fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Installation manifest is corrupt");
                None
            }
        }
    }

    /// Replaces the manifest sidecar atomically.
    ///
    /// Must be written before the record it belongs to.
    pub async fn write_manifest(&self, manifest: &[String]) -> Result<(), DeployError> {
        let content = serde_json::to_vec(manifest).map_err(|e| self.persist_error(e))?;
        let path = self.manifest_path();

        tokio::task::spawn_blocking(move || atomic_write(&path, &content))
            .await
            .map_err(|e| self.persist_error(e))?
            .map_err(|e| self.persist_error(format!("{e:#}")))
    }

    fn persist_error(&self, reason: impl ToString) -> DeployError {
        DeployError::PersistError {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
