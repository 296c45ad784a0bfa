//! Version discovery.
//!
//! A [`VersionOracle`] answers one question: what is the identifier of the most
//! recent revision of the configured resource on the configured channel? Every
//! call is a fresh remote query. No caching, no retries; the
//! [`Reconciler`](crate::reconcile::Reconciler) owns the retry policy.

mod http;

pub use http::HttpVersionOracle;

use crate::core::DeployError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The remote truth at one point in time.
///
/// Two records name the same version iff their `id`s are equal. `timestamp`
/// and `message` are advisory and never drive a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VersionRecord {
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            message: None,
        }
    }

    /// First line of the message, if any.
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.message.as_deref().and_then(|m| m.lines().next()).filter(|line| !line.is_empty())
    }

    /// Abbreviated identifier for display.
    #[must_use]
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Shortens a version identifier to at most 12 characters for display.
#[must_use]
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Resolves "latest" to a concrete [`VersionRecord`].
#[async_trait]
pub trait VersionOracle: Send + Sync {
    /// Queries the remote source.
    ///
    /// Fails with [`DeployError::Unavailable`] on network errors, timeouts,
    /// non-success responses, or bodies missing the identifier or timestamp.
    async fn resolve(&self) -> Result<VersionRecord, DeployError>;
}
