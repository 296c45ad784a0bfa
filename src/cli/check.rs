//! Report whether an update is available without installing it.

use super::common::{display_id, display_time, load_reconciler};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::Path;

/// Command to compare the remote latest with the installed version.
#[derive(Args, Debug, Default)]
pub struct CheckCommand {
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl CheckCommand {
    pub async fn execute(self, config_path: Option<&Path>) -> Result<()> {
        let (config, reconciler) = load_reconciler(config_path, |_| {}).await?;
        let report = reconciler.check().await?;

        if self.json {
            let value = json!({
                "repository": config.repository,
                "channel": config.channel,
                "latest": report.latest,
                "installed_id": report.installed.as_ref().map(|s| s.installed_id.clone()),
                "update_available": report.update_available(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        println!("{} {}@{}", "Source:".bold(), config.repository, config.channel);
        println!(
            "{} {} ({})",
            "Latest:".bold(),
            display_id(&report.latest.id).cyan(),
            display_time(&report.latest.timestamp)
        );
        if let Some(summary) = report.latest.summary() {
            println!("        {}", summary.dimmed());
        }
        match &report.installed {
            Some(state) => println!("{} {}", "Installed:".bold(), display_id(&state.installed_id)),
            None => println!("{} {}", "Installed:".bold(), "nothing".dimmed()),
        }

        if report.update_available() {
            println!("\n{} run 'appsync sync' to install it", "Update available:".yellow());
        } else {
            println!("\n{}", "✅ Up to date".green());
        }
        Ok(())
    }
}
