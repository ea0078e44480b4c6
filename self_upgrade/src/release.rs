//! Published releases: latest version lookup and binary download.

use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Result, UpgradeError};

pub use user_config::VERSION_PLACEHOLDER;

/// Default bound on release lookups and downloads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: Option<String>,
}

/// Endpoints a [`ReleaseSource`] talks to.
#[derive(Debug, Clone)]
pub struct ReleaseEndpoints {
    /// JSON document with the latest release's `tag_name`.
    pub latest_url: String,
    /// Binary URL template containing `{version}`.
    pub download_url: String,
    pub timeout: Duration,
}

impl ReleaseEndpoints {
    pub fn download_url_for(&self, version: &str) -> String {
        self.download_url.replace(VERSION_PLACEHOLDER, version)
    }
}

/// HTTP access to published releases.
#[derive(Debug, Clone)]
pub struct ReleaseSource {
    client: reqwest::Client,
    endpoints: ReleaseEndpoints,
}

impl ReleaseSource {
    pub fn new(endpoints: ReleaseEndpoints, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(endpoints.timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| UpgradeError::VersionLookup {
                url: endpoints.latest_url.clone(),
                reason: format!("could not create HTTP client: {}", e),
            })?;
        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &ReleaseEndpoints {
        &self.endpoints
    }

    /// Tag of the latest published release.
    pub async fn latest_version(&self) -> Result<String> {
        let url = &self.endpoints.latest_url;
        let lookup_error = |reason: String| UpgradeError::VersionLookup {
            url: url.clone(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| lookup_error(e.to_string()))?;
        let release: LatestRelease = response
            .json()
            .await
            .map_err(|e| lookup_error(format!("unexpected response: {}", e)))?;

        let tag = release
            .tag_name
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| lookup_error("response has no tag_name".to_string()))?;
        debug!(version = %tag, "latest release");
        Ok(tag)
    }

    /// Stream the binary of `version` into `sink`; returns the byte count.
    ///
    /// An empty body is a failure: a zero-byte file must never replace the
    /// executable.
    pub async fn download<W>(&self, version: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let url = self.endpoints.download_url_for(version);
        let failed = |reason: String| UpgradeError::DownloadFailed {
            version: version.to_string(),
            reason,
        };

        debug!(url = %url, "downloading release binary");
        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| failed(e.to_string()))?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| failed(e.to_string()))? {
            sink.write_all(&chunk)
                .await
                .map_err(|e| failed(format!("could not write staged binary: {}", e)))?;
            written += chunk.len() as u64;
        }
        sink.flush()
            .await
            .map_err(|e| failed(format!("could not write staged binary: {}", e)))?;

        if written == 0 {
            return Err(failed(format!("{} returned an empty body", url)));
        }
        debug!(bytes = written, "download complete");
        Ok(written)
    }
}
