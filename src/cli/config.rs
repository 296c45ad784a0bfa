//! Manage the appsync deploy configuration file.
//!
//! # Subcommands
//!
//! - `init`: write an annotated example configuration
//! - `show`: print the configuration and the paths it resolves to (default)
//! - `path`: print where the configuration file is looked up
//!
//! # Examples
//!
//! ```bash
//! # Write an example config to the default location
//! appsync config init
//!
//! # Write a ready-to-use config for a repository
//! appsync config init --repository owner/app --live-path ~/apps/app
//!
//! # Inspect what appsync will use
//! appsync config show
//! ```

use super::common::load_config;
use crate::config::{DeployConfig, EXAMPLE_CONFIG};
use crate::utils::fs::safe_write;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::Path;

/// Command to manage the deploy configuration.
#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// Configuration operation to perform
    #[command(subcommand)]
    command: Option<ConfigSubcommands>,
}

#[derive(Subcommand, Debug)]
enum ConfigSubcommands {
    /// Create a configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,

        /// Repository to track, as `owner/name`
        #[arg(long, requires = "live_path")]
        repository: Option<String>,

        /// Directory the application is installed into
        #[arg(long, requires = "repository")]
        live_path: Option<String>,
    },

    /// Show the configuration and resolved paths
    Show,

    /// Show the configuration file location
    Path,
}

impl ConfigCommand {
    pub async fn execute(self, config_path: Option<&Path>) -> Result<()> {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => DeployConfig::default_path()?,
        };

        match self.command {
            Some(ConfigSubcommands::Init {
                force,
                repository,
                live_path,
            }) => Self::init(&path, force, repository.zip(live_path)).await,
            Some(ConfigSubcommands::Show) | None => Self::show(&path).await,
            Some(ConfigSubcommands::Path) => {
                println!("{}", path.display());
                Ok(())
            }
        }
    }

    async fn init(path: &Path, force: bool, target: Option<(String, String)>) -> Result<()> {
        if path.exists() && !force {
            println!("❌ Config already exists at: {}", path.display());
            println!("   Use --force to overwrite");
            return Ok(());
        }

        let content = match target {
            Some((repository, live_path)) => {
                let config = DeployConfig::new(repository, live_path);
                config.resolve().context("Refusing to write an invalid config")?;
                toml::to_string_pretty(&config).context("Failed to serialize deploy config")?
            }
            None => EXAMPLE_CONFIG.to_string(),
        };

        let target_path = path.to_path_buf();
        tokio::task::spawn_blocking(move || safe_write(&target_path, &content))
            .await
            .context("spawn_blocking panicked")??;

        println!("✅ Created config at: {}", path.display());
        println!("\n{}", "Next steps:".yellow());
        println!("  1. Set [source] repository and [paths] live_path");
        println!("  2. If the source is private, export a token and set [source] token_env");
        println!("  3. Run 'appsync sync'");
        Ok(())
    }

    async fn show(path: &Path) -> Result<()> {
        let resolved = load_config(Some(path)).await?;
        let config = DeployConfig::load_from(path).await?;

        println!("{}", "Deploy Configuration".bold());
        println!("Location: {}\n", path.display());
        println!("{}", toml::to_string_pretty(&config)?);

        println!("{}", "Resolved".bold());
        println!("  oracle:   {}", resolved.oracle_url);
        println!("  snapshot: {}", resolved.snapshot_template);
        println!("  live:     {}", resolved.live_path.display());
        println!("  staging:  {}", resolved.staging_root.display());
        println!("  state:    {}", resolved.state_path.display());
        if let Some(var) = &resolved.token_env {
            let present = std::env::var(var).is_ok_and(|v| !v.trim().is_empty());
            println!(
                "  token:    ${var} ({})",
                if present { "set".green() } else { "not set".yellow() }
            );
        }
        Ok(())
    }
}
