//! Copies locally held files (credentials, environment files) into the live tree.
//!
//! Sources live outside the installation and are never part of a snapshot, so
//! they must be re-applied after every promote. Targets are written atomically
//! with owner-only permissions.

use super::InstallHook;
use crate::config::ResolvedProvision;
use crate::core::DeployError;
use crate::utils::fs::atomic_write;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Provisioner {
    entries: Vec<ResolvedProvision>,
}

impl Provisioner {
    pub fn new(entries: Vec<ResolvedProvision>) -> Self {
        Self {
            entries,
        }
    }

    pub fn entries(&self) -> &[ResolvedProvision] {
        &self.entries
    }

    fn failed(reason: String) -> DeployError {
        DeployError::HookFailed {
            name: "provisioning".to_string(),
            reason,
        }
    }
}

#[async_trait]
impl InstallHook for Provisioner {
    fn name(&self) -> &str {
        "provisioning"
    }

    async fn run(&self, live_path: &Path) -> Result<(), DeployError> {
        for entry in &self.entries {
            let content = tokio::fs::read(&entry.source).await.map_err(|e| {
                Self::failed(format!("cannot read {}: {e}", entry.source.display()))
            })?;
            let target = live_path.join(&entry.target);

            if tokio::fs::read(&target).await.is_ok_and(|existing| existing == content) {
                debug!(target = %target.display(), "Provisioned file already current");
                continue;
            }

            let write_target = target.clone();
            tokio::task::spawn_blocking(move || atomic_write(&write_target, &content))
                .await
                .map_err(|e| Self::failed(format!("provisioning task failed: {e}")))?
                .map_err(|e| Self::failed(format!("{e:#}")))?;
            debug!(source = %entry.source.display(), target = %target.display(), "Provisioned file");
        }
        Ok(())
    }
}
