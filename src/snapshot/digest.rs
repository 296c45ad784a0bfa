//! Content digests of directory trees.
//!
//! A tree digest covers every entry below a root: its relative path (with `/`
//! separators), its kind, and for files the exact bytes. Entries are visited in
//! sorted order, so the same content yields the same digest on every platform.

use crate::core::DeployError;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

const DIGEST_PREFIX: &str = "sha256:";

/// Lists every entry below `root` as a `/`-separated relative path, in walk order.
///
/// Fails on file names that are not valid UTF-8, since they could not be
/// reopened from the recorded manifest.
pub fn tree_manifest(root: &Path) -> Result<Vec<String>> {
    let mut manifest = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("Entry escaped root: {}", entry.path().display()))?;
        let segments = relative
            .components()
            .map(|c| {
                c.as_os_str().to_str().with_context(|| {
                    format!("File name is not valid UTF-8: {}", entry.path().display())
                })
            })
            .collect::<Result<Vec<_>>>()?;
        manifest.push(segments.join("/"));
    }
    Ok(manifest)
}

/// Computes the `sha256:<hex>` digest of the manifest entries below `root`.
///
/// Entries not in `manifest` are ignored. A listed entry that is missing fails.
pub fn manifest_digest(root: &Path, manifest: &[String]) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    for name in manifest {
        let path = root.join(name);
        let metadata = std::fs::symlink_metadata(&path)
            .with_context(|| format!("Failed to inspect {}", path.display()))?;

        let file_type = metadata.file_type();
        if file_type.is_dir() {
            hasher.update(b"d ");
            hasher.update(name.as_bytes());
            hasher.update([0]);
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(&path)
                .with_context(|| format!("Failed to read link {}", path.display()))?;
            hasher.update(b"l ");
            hasher.update(name.as_bytes());
            hasher.update([0]);
            hasher.update(target.to_string_lossy().as_bytes());
            hasher.update([0]);
        } else {
            let mut file =
                File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
            hasher.update(b"f ");
            hasher.update(name.as_bytes());
            hasher.update([0]);
            hasher.update(metadata.len().to_le_bytes());
            loop {
                let read = file
                    .read(&mut buffer)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[..read]);
            }
        }
    }

    Ok(format!("{DIGEST_PREFIX}{}", hex::encode(hasher.finalize())))
}

/// Computes the `sha256:<hex>` digest of the whole tree rooted at `root`.
pub fn tree_digest(root: &Path) -> Result<String> {
    manifest_digest(root, &tree_manifest(root)?)
}

/// Fails with [`DeployError::DigestMismatch`] unless the whole tree hashes to `expected`.
pub fn verify_tree(root: &Path, expected: &str) -> Result<(), DeployError> {
    let actual = tree_digest(root).map_err(|e| DeployError::IntegrityViolation {
        reason: format!("cannot hash {}: {e:#}", root.display()),
    })?;
    compare(root, expected, actual)
}

/// Like [`verify_tree`], restricted to the entries in `manifest`.
///
/// Files added below `root` after the manifest was taken do not affect the result.
pub fn verify_manifest(root: &Path, manifest: &[String], expected: &str) -> Result<(), DeployError> {
    let actual = manifest_digest(root, manifest).map_err(|e| DeployError::IntegrityViolation {
        reason: format!("cannot hash {}: {e:#}", root.display()),
    })?;
    compare(root, expected, actual)
}

fn compare(root: &Path, expected: &str, actual: String) -> Result<(), DeployError> {
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(DeployError::DigestMismatch {
            path: root.display().to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}
