//! Credential providers for authenticated remote access.
//!
//! Tokens are resolved at request time and never written to the deploy
//! configuration, the state record, or the installed tree.

use std::fmt;

/// Supplies an optional bearer token for oracle and snapshot requests.
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// Returns the token to send, or `None` for anonymous access.
    fn bearer_token(&self) -> Option<String>;
}

/// Reads the token from a named environment variable.
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    var: String,
}

impl EnvCredentialProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
        }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn bearer_token(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|token| !token.trim().is_empty())
    }
}

/// Fixed token, or no token at all.
#[derive(Clone, Default)]
pub struct StaticCredentialProvider {
    token: Option<String>,
}

impl StaticCredentialProvider {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

impl fmt::Debug for StaticCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the token itself
        f.debug_struct("StaticCredentialProvider")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}
