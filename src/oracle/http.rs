//! HTTP version oracle for GitHub-style commit endpoints.

use super::{VersionOracle, VersionRecord};
use crate::config::CredentialProvider;
use crate::core::{DeployError, UnavailableCause};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Subset of the GitHub "get a commit" response.
#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: Option<String>,
    commit: Option<CommitDetails>,
}

#[derive(Debug, Deserialize)]
struct CommitDetails {
    committer: Option<Signature>,
    author: Option<Signature>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Signature {
    date: Option<DateTime<Utc>>,
}

/// Resolves the latest commit of a repository channel over HTTP.
#[derive(Debug, Clone)]
pub struct HttpVersionOracle {
    client: Client,
    endpoint: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpVersionOracle {
    /// Creates an oracle for `endpoint` with a per-request `timeout`.
    pub fn new(
        endpoint: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, DeployError> {
        let client = Client::builder().user_agent(user_agent).timeout(timeout).build().map_err(
            |e| DeployError::Config {
                message: format!("Failed to build HTTP client: {e}"),
            },
        )?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn unavailable(&self, cause: UnavailableCause, reason: impl Into<String>) -> DeployError {
        DeployError::Unavailable {
            endpoint: self.endpoint.clone(),
            cause,
            reason: reason.into(),
        }
    }

    fn request_error(&self, error: &reqwest::Error) -> DeployError {
        let cause = if error.is_timeout() {
            UnavailableCause::Timeout
        } else {
            UnavailableCause::Network
        };
        self.unavailable(cause, error.to_string())
    }

    fn parse(&self, body: &str) -> Result<VersionRecord, DeployError> {
        let response: CommitResponse = serde_json::from_str(body)
            .map_err(|e| self.unavailable(UnavailableCause::Malformed, e.to_string()))?;

        let id = response
            .sha
            .filter(|sha| !sha.trim().is_empty())
            .ok_or_else(|| self.unavailable(UnavailableCause::Malformed, "missing 'sha' field"))?;

        let details = response
            .commit
            .ok_or_else(|| self.unavailable(UnavailableCause::Malformed, "missing 'commit' field"))?;

        let timestamp = details
            .committer
            .and_then(|s| s.date)
            .or_else(|| details.author.and_then(|s| s.date))
            .ok_or_else(|| {
                self.unavailable(UnavailableCause::Malformed, "missing 'commit.committer.date' field")
            })?;

        Ok(VersionRecord {
            id,
            timestamp,
            message: details.message,
        })
    }
}

#[async_trait]
impl VersionOracle for HttpVersionOracle {
    async fn resolve(&self) -> Result<VersionRecord, DeployError> {
        debug!(endpoint = %self.endpoint, "Querying version oracle");

        let mut request =
            self.client.get(&self.endpoint).header(header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = self.credentials.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.request_error(&e))?;
        let status = response.status();

        if !status.is_success() {
            let exhausted = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.trim() == "0");
            if status == StatusCode::TOO_MANY_REQUESTS
                || (status == StatusCode::FORBIDDEN && exhausted)
            {
                return Err(self.unavailable(UnavailableCause::RateLimited, status.to_string()));
            }
            return Err(self.unavailable(UnavailableCause::Status(status.as_u16()), status.to_string()));
        }

        let body = response.text().await.map_err(|e| self.request_error(&e))?;
        let record = self.parse(&body)?;

        debug!(version_id = %record.id, timestamp = %record.timestamp, "Resolved latest version");
        Ok(record)
    }
}
