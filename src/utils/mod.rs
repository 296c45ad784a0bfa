//! Cross-platform utilities shared by the appsync components.
//!
//! - [`fs`]: atomic writes and directory helpers
//! - [`platform`]: path expansion and containment checks
//! - [`backoff`]: exponential backoff arithmetic used by the reconciler

pub mod backoff;
pub mod fs;
pub mod platform;

pub use fs::{atomic_write, copy_dir, ensure_dir, safe_write};
pub use platform::{is_windows, resolve_path};
