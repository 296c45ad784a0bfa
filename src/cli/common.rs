//! Common utilities for CLI commands

use crate::config::{DeployConfig, ResolvedConfig};
use crate::oracle::short_id;
use crate::reconcile::{Reconciler, Shutdown};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use std::path::Path;
use tracing::{debug, info};

/// Loads and resolves the deploy configuration for a command.
pub async fn load_config(config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => DeployConfig::default_path()?,
    };
    if !path.exists() {
        anyhow::bail!(
            "No deploy config found at {}. Run 'appsync config init' to create one.",
            path.display()
        );
    }

    debug!(path = %path.display(), "Loading deploy config");
    let config = DeployConfig::load_from(&path).await?;
    let resolved = config
        .resolve()
        .with_context(|| format!("Invalid deploy config at {}", path.display()))?;
    Ok(resolved)
}

/// Builds a reconciler from the configuration at `config_path`.
pub async fn load_reconciler(
    config_path: Option<&Path>,
    configure: impl FnOnce(&mut ResolvedConfig),
) -> Result<(ResolvedConfig, Reconciler)> {
    let mut config = load_config(config_path).await?;
    configure(&mut config);
    let reconciler = Reconciler::from_config(&config)?;
    Ok((config, reconciler))
}

/// A [`Shutdown`] triggered by Ctrl-C.
pub fn ctrl_c_shutdown() -> Shutdown {
    let (tx, shutdown) = Shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping at the next wait");
            let _ = tx.send(true);
        }
    });
    shutdown
}

/// Formats a version identifier for terminal output.
pub fn display_id(id: &str) -> String {
    short_id(id).to_string()
}

/// Formats a UTC timestamp in local time.
pub fn display_time(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %Z").to_string()
}
