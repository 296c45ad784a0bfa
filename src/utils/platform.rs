//! Platform helpers for path resolution.
//!
//! Configuration paths may contain `~` and environment variables (`$HOME`,
//! `${XDG_DATA_HOME}`); these helpers expand them the same way on every platform.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Checks if the current platform is Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Resolves a configured path, expanding `~` and environment variables.
///
/// # Examples
///
/// ```rust,no_run
/// use appsync_cli::utils::platform::resolve_path;
///
/// # fn example() -> anyhow::Result<()> {
/// let live = resolve_path("~/.local/share/app")?;
/// assert!(live.is_absolute());
/// # Ok(())
/// # }
/// ```
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| {
        let platform_vars = if is_windows() {
            "Common Windows variables: $USERPROFILE, $APPDATA, $LOCALAPPDATA"
        } else {
            "Common Unix variables: $HOME, $USER, $XDG_DATA_HOME"
        };
        format!(
            "Failed to expand environment variables in path: {path}\n\n\
            Undefined variables are not allowed (use $VAR or ${{VAR}}).\n\n\
            {platform_vars}"
        )
    })?;

    Ok(PathBuf::from(expanded.into_owned()))
}

/// Lexically normalizes a path, folding `.` and `..` without touching the filesystem.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Returns `true` if `path` equals `ancestor` or lies underneath it.
#[must_use]
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    normalize_path(path).starts_with(normalize_path(ancestor))
}
