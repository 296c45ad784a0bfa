//! Snapshot retrieval.
//!
//! A [`SnapshotFetcher`] downloads the complete content of one version into a
//! fresh staging directory and extracts it. The result is a [`Snapshot`]: an
//! immutable tree with a known content root and digest that the
//! [`InstallationSwapper`](crate::swap::InstallationSwapper) can promote.
//!
//! Staging layout:
//!
//! ```text
//! <staging_root>/<live_name>-<hash>/<id-prefix>-<uuid>/
//!     snapshot.zip          (removed after extraction)
//!     content/<root>/...    (the discovered content root)
//! ```
//!
//! Fetchers never leave residue on failure and never retry internally.

pub mod archive;
pub mod digest;
mod http;
mod staging;

pub use digest::{manifest_digest, tree_digest, tree_manifest, verify_manifest, verify_tree};
pub use http::HttpSnapshotFetcher;
pub use staging::StagingArea;

use crate::core::DeployError;
use async_trait::async_trait;
use std::path::PathBuf;

/// A staged, fully extracted copy of one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Version this content belongs to.
    pub version_id: String,
    /// Fetch-local directory owning everything below it.
    pub staging_dir: PathBuf,
    /// The single content root discovered inside the archive.
    pub root: PathBuf,
    /// `sha256:<hex>` digest of `root`, computed right after extraction.
    pub digest: String,
    /// Entries of `root` covered by `digest`, in hashing order.
    pub manifest: Vec<String>,
}

impl Snapshot {
    /// Deletes the staging directory of a snapshot that will not be promoted.
    pub async fn discard(self) {
        StagingArea::discard(&self.staging_dir).await;
    }
}

/// Retrieves the content of a version into a staging location.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Fails with [`DeployError::NetworkError`], [`DeployError::StagingIo`],
    /// [`DeployError::CorruptArchive`] or [`DeployError::ExtractError`].
    async fn fetch(&self, version_id: &str) -> Result<Snapshot, DeployError>;
}
