//! HTTP snapshot fetcher for archive endpoints such as GitHub's `/archive/<ref>.zip`.

use super::staging::discard_dir;
use super::{Snapshot, SnapshotFetcher, StagingArea};
use crate::config::CredentialProvider;
use crate::core::DeployError;
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct HttpSnapshotFetcher {
    client: Client,
    url_template: String,
    staging: StagingArea,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpSnapshotFetcher {
    /// `url_template` must contain `{version}`; `timeout` bounds the whole download.
    pub fn new(
        url_template: impl Into<String>,
        staging: StagingArea,
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
            url_template: url_template.into(),
            staging,
            credentials,
        })
    }

    pub fn url_for(&self, version_id: &str) -> String {
        self.url_template.replace("{version}", version_id)
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64, DeployError> {
        let network = |reason: String| DeployError::NetworkError {
            url: url.to_string(),
            reason,
        };

        let mut request = self.client.get(url);
        if let Some(token) = self.credentials.bearer_token() {
            request = request.bearer_auth(token);
        }

        let mut response = request.send().await.map_err(|e| network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(network(format!("HTTP {status}")));
        }

        let local = |action: &str, e: std::io::Error| DeployError::StagingIo {
            path: destination.display().to_string(),
            reason: format!("failed to {action} download: {e}"),
        };

        let mut file =
            tokio::fs::File::create(destination).await.map_err(|e| local("create", e))?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| network(e.to_string()))? {
            file.write_all(&chunk).await.map_err(|e| local("write", e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| local("flush", e))?;

        Ok(written)
    }
}

#[async_trait]
impl SnapshotFetcher for HttpSnapshotFetcher {
    async fn fetch(&self, version_id: &str) -> Result<Snapshot, DeployError> {
        let url = self.url_for(version_id);
        let staging_dir = self.staging.allocate(version_id).await?;
        let archive = StagingArea::archive_path(&staging_dir);

        debug!(url = %url, staging_dir = %staging_dir.display(), "Downloading snapshot");
        let bytes = match self.download(&url, &archive).await {
            Ok(bytes) => bytes,
            Err(e) => {
                discard_dir(&staging_dir).await;
                return Err(e);
            }
        };

        let snapshot = self.staging.unpack(staging_dir, version_id).await?;
        info!(version_id, bytes, digest = %snapshot.digest, "Snapshot staged");
        Ok(snapshot)
    }
}
