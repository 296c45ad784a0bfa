//! Install the latest version, then launch it.
//!
//! `appsync sync` runs one reconciliation cycle: it resolves the latest
//! version, installs it if the live tree is behind or cannot be trusted,
//! runs provisioning and the dependency installer, and finally starts the
//! application with the configured launch command.
//!
//! # Examples
//!
//! ```bash
//! # Install or confirm the latest version and launch it
//! appsync sync
//!
//! # Update only
//! appsync sync --no-launch
//! ```

use super::common::{ctrl_c_shutdown, display_id, load_reconciler};
use crate::reconcile::{CycleOutcome, HookReport};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::Path;

/// Command to reconcile once and launch the application.
#[derive(Args, Debug, Default)]
pub struct SyncCommand {
    /// Do not start the application after updating
    #[arg(long)]
    no_launch: bool,

    /// Skip the dependency install even if one is configured
    #[arg(long)]
    skip_dependencies: bool,
}

impl SyncCommand {
    pub async fn execute(self, config_path: Option<&Path>) -> Result<()> {
        let (config, reconciler) = load_reconciler(config_path, |config| {
            if self.no_launch {
                config.launch = None;
            }
            if self.skip_dependencies {
                config.dependency_install = None;
            }
        })
        .await?;

        let mut shutdown = ctrl_c_shutdown();
        let report = reconciler.sync(&mut shutdown).await?;

        match &report.cycle.outcome {
            CycleOutcome::UpToDate { version, .. } => {
                println!(
                    "✅ {} is up to date at {}",
                    config.repository.bold(),
                    display_id(&version.id).cyan()
                );
            }
            CycleOutcome::Installed { version, previous_id, .. } => {
                let from = previous_id.as_deref().map_or_else(|| "nothing".to_string(), display_id);
                println!(
                    "✅ Installed {} {} (was {})",
                    config.repository.bold(),
                    display_id(&version.id).cyan(),
                    from
                );
                if let Some(summary) = version.summary() {
                    println!("   {}", summary.dimmed());
                }
            }
        }
        if report.cycle.attempts > 1 {
            println!("   {} attempts needed", report.cycle.attempts);
        }

        if let Some(hook) = &report.provisioning {
            print_hook(hook);
        }
        if let Some(hook) = &report.dependencies {
            print_hook(hook);
            if let Some(error) = &hook.error {
                println!(
                    "{}",
                    "⚠️  The new version is installed but its dependencies are broken; not launching"
                        .yellow()
                );
                return Err(error.clone().into());
            }
        }

        if report.launched {
            println!("🚀 Launched from {}", config.live_path.display());
        }
        Ok(())
    }
}

fn print_hook(hook: &HookReport) {
    match &hook.error {
        None => println!("   {} {}", "✓".green(), hook.name),
        Some(error) => println!("   {} {}: {}", "✗".red(), hook.name, error),
    }
}
