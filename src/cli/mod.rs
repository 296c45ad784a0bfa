//! Command-line interface for appsync.
//!
//! # Available Commands
//!
//! - `sync` - Install the latest version if needed, then launch it
//! - `watch` - Keep the installation current until interrupted
//! - `check` - Report whether an update is available without installing
//! - `status` - Show the installed version and whether the live tree is intact
//! - `config` - Create or inspect the deploy configuration
//!
//! # Basic Workflow
//!
//! ```bash
//! # 1. Describe the deployment
//! appsync config init --repository owner/app --live-path ~/apps/app
//!
//! # 2. Install and launch
//! appsync sync
//!
//! # 3. Or keep it current in the background
//! appsync watch --interval 600
//! ```
//!
//! # Logging
//!
//! Diagnostics go to stderr through `tracing`. `RUST_LOG` takes precedence;
//! otherwise `--verbose` selects `debug`, `--quiet` selects `warn`, and the
//! default is `info`. Command results go to stdout.

mod check;
pub mod common;
mod config;
mod status;
mod sync;
mod watch;


use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Main CLI application structure for appsync.
#[derive(Parser, Debug)]
#[command(
    name = "appsync",
    about = "Keep a locally installed application synchronized with its latest published revision",
    version,
    long_about = "appsync resolves the latest revision of a repository, installs it atomically \
                  into a live directory, runs post-install hooks and launches the application."
)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the deploy config file
    #[arg(short, long, global = true, env = "APPSYNC_CONFIG_PATH")]
    config: Option<PathBuf>,
}

/// Available subcommands for the appsync CLI.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the latest version if needed, then launch it
    Sync(sync::SyncCommand),

    /// Reconcile repeatedly until interrupted
    Watch(watch::WatchCommand),

    /// Check whether an update is available
    Check(check::CheckCommand),

    /// Show the installed version and live tree status
    Status(status::StatusCommand),

    /// Manage the deploy configuration
    Config(config::ConfigCommand),
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let config = self.config.as_deref();
        match self.command {
            Commands::Sync(cmd) => cmd.execute(config).await,
            Commands::Watch(cmd) => cmd.execute(config).await,
            Commands::Check(cmd) => cmd.execute(config).await,
            Commands::Status(cmd) => cmd.execute(config).await,
            Commands::Config(cmd) => cmd.execute(config).await,
        }
    }

    /// Log level implied by the verbosity flags.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Installs the stderr log subscriber. `RUST_LOG` overrides the flags.
    pub fn init_logging(&self) {
        let filter = if std::env::var("RUST_LOG").is_ok_and(|v| !v.is_empty()) {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(format!("appsync_cli={}", self.log_level()))
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(self.verbose)
            .try_init();
    }
}
