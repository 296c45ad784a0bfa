//! Global constants used throughout the appsync codebase.
//!
//! This module contains timeout durations, retry parameters, and well-known
//! file names that are used across multiple modules. Defining them centrally
//! keeps the defaults of [`DeployConfig`](crate::config::DeployConfig) and the
//! components that consume them in one place.

use std::time::Duration;

/// Default number of attempts a reconciliation cycle makes before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Starting delay for the reconciler's exponential backoff (500ms).
///
/// This is the delay before the second attempt; it doubles on each retry.
pub const STARTING_BACKOFF_DELAY_MS: u64 = 500;

/// Maximum backoff delay between reconciliation attempts (30 seconds).
pub const MAX_BACKOFF_DELAY_MS: u64 = 30_000;

/// Starting delay when polling for the install lock (10ms).
pub const LOCK_POLL_START_MS: u64 = 10;

/// Maximum delay between install lock polls (500ms).
pub const LOCK_POLL_MAX_MS: u64 = 500;

/// Timeout for a single version oracle query (10 seconds).
pub const ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for downloading one snapshot archive (2 minutes).
///
/// Full repository archives can be large; the download is treated as a
/// transient failure once this elapses.
pub const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for an external collaborator such as the dependency installer (10 minutes).
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(600);

/// Default delay between cycles in watch mode (5 minutes).
pub const WATCH_INTERVAL: Duration = Duration::from_secs(300);

/// User agent sent with every remote request.
pub const USER_AGENT: &str = concat!("appsync/", env!("CARGO_PKG_VERSION"));

/// Name of the staging directory created next to the live installation.
pub const STAGING_DIR_NAME: &str = ".appsync-staging";

/// Marker inserted into the name of a retired live tree during a swap.
pub const RETIRED_MARKER: &str = ".appsync-retired-";

/// Marker inserted into the name of a snapshot moved next to the live path before commit.
pub const INCOMING_MARKER: &str = ".appsync-incoming-";

/// Suffix of the lock file that guards a live installation path.
pub const LOCK_SUFFIX: &str = ".appsync.lock";

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "APPSYNC_CONFIG_PATH";
