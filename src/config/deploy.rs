//! Deploy configuration for appsync.
//!
//! One TOML file describes a single managed installation: where "latest" is
//! resolved from, where snapshots are downloaded from, and where the live tree,
//! staging area and state record live on disk. Nothing about a deployment is
//! hardcoded; the [`Reconciler`](crate::reconcile::Reconciler) receives a
//! [`ResolvedConfig`] at construction.
//!
//! # Configuration File Location
//!
//! - **Unix/macOS**: `~/.appsync/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\appsync\config.toml`
//!
//! The location can be overridden with `--config <path>` or the
//! `APPSYNC_CONFIG_PATH` environment variable.
//!
//! # Endpoint Templates
//!
//! `oracle_endpoint` and `snapshot_endpoint_template` may reference
//! `{repository}` and `{channel}`; the snapshot template must also reference
//! `{version}`, which is replaced by the resolved version identifier.
//!
//! # Secrets
//!
//! Credentials are never stored in this file. `source.token_env` names an
//! environment variable that the [`EnvCredentialProvider`](super::EnvCredentialProvider)
//! reads at request time.

use crate::constants::{
    CONFIG_PATH_ENV, DEFAULT_MAX_ATTEMPTS, HOOK_TIMEOUT, MAX_BACKOFF_DELAY_MS, ORACLE_TIMEOUT,
    SNAPSHOT_TIMEOUT, STAGING_DIR_NAME, STARTING_BACKOFF_DELAY_MS, USER_AGENT, WATCH_INTERVAL,
};
use crate::core::DeployError;
use crate::reconcile::RetryPolicy;
use crate::utils::fs::safe_write;
use crate::utils::platform::{is_within, normalize_path, resolve_path};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;

const DEFAULT_ORACLE_ENDPOINT: &str = "https://api.github.com/repos/{repository}/commits/{channel}";
const DEFAULT_SNAPSHOT_TEMPLATE: &str = "https://github.com/{repository}/archive/{version}.zip";

/// Annotated example written by `appsync config init`.
pub const EXAMPLE_CONFIG: &str = r#"# appsync deploy configuration

[source]
# Resource and channel whose latest revision should be installed
repository = "owner/app"
channel = "main"
# oracle_endpoint = "https://api.github.com/repos/{repository}/commits/{channel}"
# snapshot_endpoint_template = "https://github.com/{repository}/archive/{version}.zip"
# Name of an environment variable holding a bearer token (never put the token here)
# token_env = "APPSYNC_TOKEN"

[paths]
live_path = "~/.local/share/app"
# Each installation stages below its own <live_name>-<hash> subdirectory of this root
# staging_root = "~/.local/share/.appsync-staging"
# state_path = "~/.local/share/app.appsync-state.json"

[retry]
max_attempts = 5
initial_delay_ms = 500
max_delay_ms = 30000

[timeouts]
oracle_secs = 10
snapshot_secs = 120
hook_secs = 600
lock_secs = 0

[watch]
interval_secs = 300

[verify]
live_digest = true

[hooks]
# dependency_install = ["npm", "install"]
# launch = ["npm", "start"]

# [[provision]]
# source = "~/.appsync/secrets/app.env"
# target = ".env"
"#;

/// Top-level deploy configuration as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Remote version and snapshot locations.
    pub source: SourceConfig,

    /// Local filesystem layout.
    pub paths: PathsConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    #[serde(default)]
    pub hooks: HooksConfig,

    /// Files copied into the live tree after every successful promote.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provision: Vec<ProvisionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub repository: String,

    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default = "default_oracle_endpoint")]
    pub oracle_endpoint: String,

    #[serde(default = "default_snapshot_template")]
    pub snapshot_endpoint_template: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub live_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_root: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_oracle_secs")]
    pub oracle_secs: u64,

    #[serde(default = "default_snapshot_secs")]
    pub snapshot_secs: u64,

    #[serde(default = "default_hook_secs")]
    pub hook_secs: u64,

    /// How long to wait for the install lock; 0 fails fast.
    #[serde(default)]
    pub lock_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            oracle_secs: default_oracle_secs(),
            snapshot_secs: default_snapshot_secs(),
            hook_secs: default_hook_secs(),
            lock_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_watch_interval_secs")]
    pub interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_watch_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Re-hash the live tree before trusting a matching state record.
    #[serde(default = "default_true")]
    pub live_digest: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            live_digest: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_install: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionEntry {
    /// File on the local machine, outside the live tree.
    pub source: String,
    /// Destination relative to the live tree root.
    pub target: String,
}

fn default_channel() -> String {
    "main".to_string()
}

fn default_oracle_endpoint() -> String {
    DEFAULT_ORACLE_ENDPOINT.to_string()
}

fn default_snapshot_template() -> String {
    DEFAULT_SNAPSHOT_TEMPLATE.to_string()
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_initial_delay_ms() -> u64 {
    STARTING_BACKOFF_DELAY_MS
}

const fn default_max_delay_ms() -> u64 {
    MAX_BACKOFF_DELAY_MS
}

const fn default_oracle_secs() -> u64 {
    ORACLE_TIMEOUT.as_secs()
}

const fn default_snapshot_secs() -> u64 {
    SNAPSHOT_TIMEOUT.as_secs()
}

const fn default_hook_secs() -> u64 {
    HOOK_TIMEOUT.as_secs()
}

const fn default_watch_interval_secs() -> u64 {
    WATCH_INTERVAL.as_secs()
}

const fn default_true() -> bool {
    true
}

/// A provisioning copy with both ends resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvision {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Deploy configuration with paths expanded, templates filled and defaults applied.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub repository: String,
    pub channel: String,
    pub oracle_url: String,
    pub snapshot_template: String,
    pub user_agent: String,
    pub token_env: Option<String>,
    pub live_path: PathBuf,
    /// Staging directory owned by this installation, below the configured root.
    pub staging_root: PathBuf,
    pub state_path: PathBuf,
    pub retry: RetryPolicy,
    pub oracle_timeout: Duration,
    pub snapshot_timeout: Duration,
    pub hook_timeout: Duration,
    pub lock_timeout: Duration,
    pub watch_interval: Duration,
    pub verify_live_digest: bool,
    pub dependency_install: Option<Vec<String>>,
    pub launch: Option<Vec<String>>,
    pub provision: Vec<ResolvedProvision>,
}

impl ResolvedConfig {
    /// Returns the snapshot archive URL for one version identifier.
    #[must_use]
    pub fn snapshot_url(&self, version_id: &str) -> String {
        self.snapshot_template.replace("{version}", version_id)
    }
}

impl DeployConfig {
    /// Creates a minimal configuration for `repository` installed at `live_path`.
    #[must_use]
    pub fn new(repository: impl Into<String>, live_path: impl Into<String>) -> Self {
        Self {
            source: SourceConfig {
                repository: repository.into(),
                channel: default_channel(),
                oracle_endpoint: default_oracle_endpoint(),
                snapshot_endpoint_template: default_snapshot_template(),
                user_agent: None,
                token_env: None,
            },
            paths: PathsConfig {
                live_path: live_path.into(),
                staging_root: None,
                state_path: None,
            },
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            watch: WatchConfig::default(),
            verify: VerifyConfig::default(),
            hooks: HooksConfig::default(),
            provision: Vec::new(),
        }
    }

    /// Loads and parses the configuration at `path`.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read deploy config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse deploy config from {}", path.display()))
    }

    /// Writes the configuration atomically to `path`.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize deploy config")?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || safe_write(&path, &content))
            .await
            .context("spawn_blocking panicked")?
    }

    /// Returns the configuration file location, honoring `APPSYNC_CONFIG_PATH`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.is_empty()
        {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("appsync")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".appsync")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Expands paths, fills endpoint templates and validates the result.
    pub fn resolve(&self) -> Result<ResolvedConfig, DeployError> {
        let source = &self.source;
        if source.repository.trim().is_empty() {
            return Err(config_error("source.repository must not be empty"));
        }
        if source.channel.trim().is_empty() {
            return Err(config_error("source.channel must not be empty"));
        }
        if !source.snapshot_endpoint_template.contains("{version}") {
            return Err(config_error(
                "source.snapshot_endpoint_template must contain the {version} placeholder",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(config_error("retry.max_attempts must be at least 1"));
        }

        let fill = |template: &str| {
            template.replace("{repository}", &source.repository).replace("{channel}", &source.channel)
        };

        let live_path = normalize_path(&expand(&self.paths.live_path)?);
        let live_name = live_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| config_error("paths.live_path must name a directory"))?;
        let live_parent = live_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| config_error("paths.live_path must have a parent directory"))?;

        let staging_base = match &self.paths.staging_root {
            Some(path) => normalize_path(&expand(path)?),
            None => live_parent.join(STAGING_DIR_NAME),
        };
        let state_path = match &self.paths.state_path {
            Some(path) => normalize_path(&expand(path)?),
            None => live_parent.join(format!("{live_name}.appsync-state.json")),
        };

        if is_within(&state_path, &live_path) {
            return Err(config_error("paths.state_path must be outside paths.live_path"));
        }
        if is_within(&staging_base, &live_path) {
            return Err(config_error("paths.staging_root must be outside paths.live_path"));
        }
        if is_within(&live_path, &staging_base) {
            return Err(config_error("paths.staging_root must not contain paths.live_path"));
        }
        if is_within(&state_path, &staging_base) {
            return Err(config_error("paths.staging_root must not contain paths.state_path"));
        }
        let staging_root = staging_base.join(staging_scope(&live_name, &live_path));

        let mut provision = Vec::with_capacity(self.provision.len());
        for entry in &self.provision {
            let target = PathBuf::from(&entry.target);
            let escapes = target
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if target.as_os_str().is_empty() || escapes {
                return Err(config_error(&format!(
                    "provision target '{}' must be a relative path inside the installation",
                    entry.target
                )));
            }
            provision.push(ResolvedProvision {
                source: expand(&entry.source)?,
                target,
            });
        }

        for (name, command) in
            [("hooks.dependency_install", &self.hooks.dependency_install), ("hooks.launch", &self.hooks.launch)]
        {
            if command.as_ref().is_some_and(|argv| argv.is_empty()) {
                return Err(config_error(&format!("{name} must name a program")));
            }
        }

        Ok(ResolvedConfig {
            repository: source.repository.clone(),
            channel: source.channel.clone(),
            oracle_url: fill(&source.oracle_endpoint),
            snapshot_template: fill(&source.snapshot_endpoint_template),
            user_agent: source.user_agent.clone().unwrap_or_else(|| USER_AGENT.to_string()),
            token_env: source.token_env.clone(),
            live_path,
            staging_root,
            state_path,
            retry: RetryPolicy::new(
                self.retry.max_attempts,
                Duration::from_millis(self.retry.initial_delay_ms),
                Duration::from_millis(self.retry.max_delay_ms),
            ),
            oracle_timeout: Duration::from_secs(self.timeouts.oracle_secs),
            snapshot_timeout: Duration::from_secs(self.timeouts.snapshot_secs),
            hook_timeout: Duration::from_secs(self.timeouts.hook_secs),
            lock_timeout: Duration::from_secs(self.timeouts.lock_secs),
            watch_interval: Duration::from_secs(self.watch.interval_secs),
            verify_live_digest: self.verify.live_digest,
            dependency_install: self.hooks.dependency_install.clone(),
            launch: self.hooks.launch.clone(),
            provision,
        })
    }
}

/// Per-installation directory name below a staging root that may be shared.
fn staging_scope(live_name: &str, live_path: &Path) -> String {
    let digest = Sha256::digest(live_path.as_os_str().as_encoded_bytes());
    format!("{live_name}-{}", &hex::encode(digest)[..8])
}

fn expand(path: &str) -> Result<PathBuf, DeployError> {
    resolve_path(path).map_err(|e| config_error(&format!("{e:#}")))
}

fn config_error(message: &str) -> DeployError {
    DeployError::Config {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(live: &Path) -> DeployConfig {
        DeployConfig::new("acme/widget", live.to_string_lossy())
    }

    #[test]
    fn test_example_config_parses() {
        let config: DeployConfig = toml::from_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.source.repository, "owner/app");
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.verify.live_digest);
        assert!(config.hooks.launch.is_none());
        assert!(config.resolve().is_ok());
    }

    #[test]
    fn test_resolve_defaults() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("widget");
        let resolved = sample(&live).resolve().unwrap();

        assert_eq!(resolved.live_path, live);
        assert_eq!(resolved.staging_root.parent().unwrap(), temp.path().join(".appsync-staging"));
        assert!(
            resolved.staging_root.file_name().unwrap().to_string_lossy().starts_with("widget-")
        );
        assert_eq!(resolved.state_path, temp.path().join("widget.appsync-state.json"));
        assert_eq!(resolved.oracle_url, "https://api.github.com/repos/acme/widget/commits/main");
        assert_eq!(
            resolved.snapshot_url("abc123"),
            "https://github.com/acme/widget/archive/abc123.zip"
        );
        assert_eq!(resolved.retry.max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(resolved.lock_timeout, Duration::ZERO);
    }

    #[test]
    fn test_resolve_rejects_state_inside_live() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("widget");
        let mut config = sample(&live);
        config.paths.state_path = Some(live.join("state.json").to_string_lossy().into_owned());

        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains("state_path"));
    }

    #[test]
    fn test_resolve_rejects_staging_root_containing_live_or_state() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("apps").join("widget");

        let mut config = sample(&live);
        config.paths.staging_root = Some(temp.path().join("apps").to_string_lossy().into_owned());
        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains("must not contain paths.live_path"));

        let mut config = sample(&live);
        config.paths.staging_root = Some(temp.path().join("tmp").to_string_lossy().into_owned());
        config.paths.state_path =
            Some(temp.path().join("tmp").join("state.json").to_string_lossy().into_owned());
        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains("must not contain paths.state_path"));
    }

    #[test]
    fn test_sibling_installations_get_separate_staging() {
        let temp = TempDir::new().unwrap();
        let a = DeployConfig::new("acme/a", temp.path().join("a").to_string_lossy());
        let b = DeployConfig::new("acme/b", temp.path().join("b").to_string_lossy());
        assert_ne!(a.resolve().unwrap().staging_root, b.resolve().unwrap().staging_root);

        // Same directory name in different parents, sharing one explicit root
        let shared = temp.path().join("shared-staging").to_string_lossy().into_owned();
        let mut one = DeployConfig::new("acme/app", temp.path().join("x").join("app").to_string_lossy());
        let mut two = DeployConfig::new("acme/app", temp.path().join("y").join("app").to_string_lossy());
        one.paths.staging_root = Some(shared.clone());
        two.paths.staging_root = Some(shared);
        let (one, two) = (one.resolve().unwrap(), two.resolve().unwrap());
        assert_eq!(one.staging_root.parent(), two.staging_root.parent());
        assert_ne!(one.staging_root, two.staging_root);
    }

    #[test]
    fn test_resolve_rejects_template_without_version() {
        let temp = TempDir::new().unwrap();
        let mut config = sample(&temp.path().join("widget"));
        config.source.snapshot_endpoint_template = "https://example.com/latest.zip".to_string();

        assert!(matches!(config.resolve(), Err(DeployError::Config { .. })));
    }

    #[test]
    fn test_resolve_rejects_escaping_provision_target() {
        let temp = TempDir::new().unwrap();
        let mut config = sample(&temp.path().join("widget"));
        config.provision.push(ProvisionEntry {
            source: temp.path().join("secret.env").to_string_lossy().into_owned(),
            target: "../outside.env".to_string(),
        });

        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_resolve_rejects_zero_attempts() {
        let temp = TempDir::new().unwrap();
        let mut config = sample(&temp.path().join("widget"));
        config.retry.max_attempts = 0;

        assert!(config.resolve().is_err());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let mut config = sample(&temp.path().join("widget"));
        config.hooks.dependency_install = Some(vec!["npm".to_string(), "install".to_string()]);
        config.source.token_env = Some("WIDGET_TOKEN".to_string());

        config.save_to(&path).await.unwrap();
        let loaded = DeployConfig::load_from(&path).await.unwrap();

        assert_eq!(loaded.source.repository, "acme/widget");
        assert_eq!(loaded.source.token_env.as_deref(), Some("WIDGET_TOKEN"));
        assert_eq!(
            loaded.hooks.dependency_install,
            Some(vec!["npm".to_string(), "install".to_string()])
        );
    }

    #[tokio::test]
    async fn test_load_reports_parse_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        tokio::fs::write(&path, "[source\nrepository = 1").await.unwrap();

        let err = DeployConfig::load_from(&path).await.unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse deploy config"));
    }
}
