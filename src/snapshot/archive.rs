//! Zip extraction and content root discovery.

use crate::core::DeployError;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Extracts every entry of the zip at `archive` below `target`.
///
/// Entries with absolute paths or `..` segments are rejected rather than
/// written outside `target`.
pub fn extract_zip(archive: &Path, target: &Path) -> Result<(), DeployError> {
    let corrupt = |reason: String| DeployError::CorruptArchive {
        path: archive.display().to_string(),
        reason,
    };

    let file = File::open(archive).map_err(|e| corrupt(e.to_string()))?;
    let mut zip = ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;

    if zip.is_empty() {
        return Err(DeployError::ExtractError {
            reason: "archive contains no entries".to_string(),
        });
    }

    fs::create_dir_all(target).map_err(|e| staging_io("create", target, &e))?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| corrupt(e.to_string()))?;
        let relative = sanitize_archive_path(entry.name())?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let destination = target.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&destination).map_err(|e| staging_io("create", &destination, &e))?;
            continue;
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| staging_io("create", parent, &e))?;
        }

        let mut output =
            File::create(&destination).map_err(|e| staging_io("create", &destination, &e))?;
        io::copy(&mut entry, &mut output).map_err(|e| {
            // Decompression failures surface as io errors from the entry reader
            if e.kind() == io::ErrorKind::InvalidData {
                corrupt(format!("{}: {e}", entry.name()))
            } else {
                staging_io("write", &destination, &e)
            }
        })?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            fs::set_permissions(&destination, fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|e| staging_io("chmod", &destination, &e))?;
        }
    }

    Ok(())
}

/// Normalizes an archive entry name into a relative path.
pub fn sanitize_archive_path(entry: &str) -> Result<PathBuf, DeployError> {
    let path = Path::new(entry);
    if path.is_absolute() {
        return Err(DeployError::ExtractError {
            reason: format!("archive entry has an absolute path: {entry}"),
        });
    }

    let mut sanitized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            _ => {
                return Err(DeployError::ExtractError {
                    reason: format!("archive entry escapes the extraction root: {entry}"),
                });
            }
        }
    }

    Ok(sanitized)
}

/// Returns the single top-level directory below `extracted`.
///
/// The name of that directory is not predictable (GitHub names it
/// `<repo>-<ref>`), so it is discovered by enumeration. Zero entries, more than
/// one entry, or a lone file all fail with [`DeployError::ExtractError`].
pub fn discover_root(extracted: &Path) -> Result<PathBuf, DeployError> {
    let entries = fs::read_dir(extracted)
        .map_err(|e| staging_io("read", extracted, &e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| staging_io("read", extracted, &e))?;

    match entries.as_slice() {
        [] => Err(DeployError::ExtractError {
            reason: "archive produced no content root".to_string(),
        }),
        [only] => {
            let file_type = only.file_type().map_err(|e| staging_io("inspect", &only.path(), &e))?;
            if file_type.is_dir() {
                Ok(only.path())
            } else {
                Err(DeployError::ExtractError {
                    reason: format!(
                        "archive top-level entry '{}' is not a directory",
                        only.file_name().to_string_lossy()
                    ),
                })
            }
        }
        many => {
            let mut names: Vec<_> =
                many.iter().map(|e| e.file_name().to_string_lossy().into_owned()).collect();
            names.sort();
            Err(DeployError::ExtractError {
                reason: format!(
                    "archive has {} top-level entries, expected exactly one: {}",
                    names.len(),
                    names.join(", ")
                ),
            })
        }
    }
}

fn staging_io(action: &str, path: &Path, error: &io::Error) -> DeployError {
    DeployError::StagingIo {
        path: path.display().to_string(),
        reason: format!("failed to {action}: {error}"),
    }
}
