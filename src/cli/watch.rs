//! Keep the installation current until interrupted.
//!
//! Cycles run every `watch.interval_secs` (or `--interval`). Failed cycles are
//! logged and retried at the next interval; Ctrl-C stops at the next wait.
//! Watch mode never launches the application.

use super::common::{ctrl_c_shutdown, load_reconciler};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::Path;
use std::time::Duration;

/// Command to reconcile repeatedly.
#[derive(Args, Debug, Default)]
pub struct WatchCommand {
    /// Seconds between cycles (overrides watch.interval_secs)
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Stop after this many cycles
    #[arg(long, value_name = "N")]
    max_cycles: Option<u32>,
}

impl WatchCommand {
    pub async fn execute(self, config_path: Option<&Path>) -> Result<()> {
        let (config, reconciler) = load_reconciler(config_path, |_| {}).await?;
        let interval = self.interval.map_or(config.watch_interval, Duration::from_secs);

        let mut shutdown = ctrl_c_shutdown();
        let summary = reconciler.watch(&mut shutdown, interval, self.max_cycles).await;

        println!(
            "{} after {} cycles: {} installs, {} failures",
            "Stopped".bold(),
            summary.cycles,
            summary.installs,
            summary.failures
        );
        Ok(())
    }
}
