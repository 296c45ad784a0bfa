//! Show what is installed and whether the live tree can be trusted.

use super::common::{display_id, display_time, load_reconciler};
use crate::reconcile::LiveAssessment;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde_json::json;
use std::path::Path;

/// Command to print the local installation record.
#[derive(Args, Debug, Default)]
pub struct StatusCommand {
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl StatusCommand {
    pub async fn execute(self, config_path: Option<&Path>) -> Result<()> {
        let (_, reconciler) = load_reconciler(config_path, |_| {}).await?;
        let status = reconciler.status().await;

        if self.json {
            let value = json!({
                "live_path": status.live_path,
                "state_path": status.state_path,
                "state": status.state,
                "assessment": status.assessment.to_string(),
                "trusted": status.assessment.is_trusted(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        println!("{} {}", "Live path:".bold(), status.live_path.display());
        println!("{} {}", "State file:".bold(), status.state_path.display());

        let Some(state) = &status.state else {
            println!("\nNothing installed yet. Run 'appsync sync' to install.");
            return Ok(());
        };

        println!("{} {}", "Installed:".bold(), display_id(&state.installed_id).cyan());
        println!("{} {}", "Installed at:".bold(), display_time(&state.installed_at));
        println!("{} {}", "Last checked:".bold(), display_time(&state.last_checked_at));
        match state.dependencies_ok {
            Some(true) => println!("{} {}", "Dependencies:".bold(), "ok".green()),
            Some(false) => println!("{} {}", "Dependencies:".bold(), "failed".red()),
            None => {}
        }

        let assessment = status.assessment.to_string();
        let assessment = match &status.assessment {
            LiveAssessment::Verified => assessment.green(),
            LiveAssessment::Unverified => assessment.yellow(),
            _ => assessment.red(),
        };
        println!("{} {}", "Live tree:".bold(), assessment);
        Ok(())
    }
}
