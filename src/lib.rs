//! appsync - keeps a local application installation in step with its latest published revision.
//!
//! A single reconciler binary resolves the remote "latest" version, compares it
//! with a durable record of what is installed, and on drift downloads a fresh
//! snapshot and promotes it into the live directory without ever leaving that
//! directory partial or missing.
//!
//! # Architecture Overview
//!
//! - [`oracle`]: resolves the latest version identifier and its timestamp
//! - [`state`]: the persisted record of what is installed
//! - [`snapshot`]: downloads and extracts a version into a staging directory
//! - [`swap`]: atomically replaces the live tree, with crash recovery and locking
//! - [`reconcile`]: the state machine tying them together, with retry and backoff
//! - [`hooks`]: provisioning, dependency install and launch collaborators
//!
//! # Configuration
//!
//! Every remote location, path and timeout comes from a TOML file (see
//! [`config::DeployConfig`]). Credentials are never part of it; a
//! [`config::CredentialProvider`] supplies them at request time.
//!
//! # Example
//!
//! ```rust,no_run
//! use appsync_cli::config::DeployConfig;
//! use appsync_cli::reconcile::{Reconciler, Shutdown};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = DeployConfig::new("owner/app", "~/apps/app").resolve()?;
//! let reconciler = Reconciler::from_config(&config)?;
//! let report = reconciler.run_cycle(&mut Shutdown::never()).await?;
//! println!("installed: {}", report.outcome.installed());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod hooks;
pub mod oracle;
pub mod reconcile;
pub mod snapshot;
pub mod state;
pub mod swap;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
