//! External collaborators invoked around a promote.
//!
//! These wrap OS facilities and carry no invariants of their own. They are
//! specified only at their boundary:
//!
//! - [`InstallHook`]: runs against the live path after a successful cycle
//!   ([`Provisioner`] copies configured files in, a [`CommandHook`] installs dependencies)
//! - [`Launcher`]: starts the installed application and returns without waiting
//!
//! A hook failure never rolls back a promote.

mod command;
mod provision;

pub use command::CommandHook;
pub use provision::Provisioner;

use crate::core::DeployError;
use async_trait::async_trait;
use std::path::Path;

/// Work performed inside the live installation after it is current.
#[async_trait]
pub trait InstallHook: Send + Sync {
    /// Short human-readable name for logs and reports.
    fn name(&self) -> &str;

    /// Runs to completion; fails with [`DeployError::HookFailed`].
    async fn run(&self, live_path: &Path) -> Result<(), DeployError>;
}

/// Starts the installed application.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Spawns the application in `live_path` and returns once it has started.
    async fn launch(&self, live_path: &Path) -> Result<(), DeployError>;
}
