//! Configuration management for appsync.
//!
//! - [`deploy`]: the TOML deploy configuration and its resolved, validated form
//! - [`credentials`]: bearer token providers for authenticated sources
//!
//! ```toml
//! [source]
//! repository = "owner/app"
//! channel = "main"
//!
//! [paths]
//! live_path = "~/.local/share/app"
//! ```

pub mod credentials;
pub mod deploy;

pub use credentials::{CredentialProvider, EnvCredentialProvider, StaticCredentialProvider};
pub use deploy::{
    DeployConfig, EXAMPLE_CONFIG, HooksConfig, PathsConfig, ProvisionEntry, ResolvedConfig,
    ResolvedProvision, RetryConfig, SourceConfig, TimeoutConfig, VerifyConfig, WatchConfig,
};

use std::sync::Arc;

/// Builds the credential provider described by a resolved configuration.
#[must_use]
pub fn credential_provider(config: &ResolvedConfig) -> Arc<dyn CredentialProvider> {
    match &config.token_env {
        Some(var) => Arc::new(EnvCredentialProvider::new(var.clone())),
        None => Arc::new(StaticCredentialProvider::anonymous()),
    }
}
