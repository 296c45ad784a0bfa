//! File system utilities for the reconciliation components.
//!
//! - **Atomic writes**: state records are written via temp-file-then-rename
//! - **Directory helpers**: creation, recursive copy (used for cross-volume staging), removal

pub mod atomic;
pub mod dirs;

pub use atomic::{atomic_write, safe_write};
pub use dirs::{copy_dir, ensure_dir, is_non_empty_dir, remove_dir_all};
