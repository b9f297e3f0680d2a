//! Chart archive loader
//!
//! Downloads a chart package from an http(s) URL or an OCI registry and
//! loads it into a [`Chart`].

use async_trait::async_trait;
use hubtrack_core::{Chart, Repository, load_archive};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::{HttpClient, cancellable};
use crate::error::{RepoError, Result};
use crate::oci::{OCI_PREFIX, OciClient};
use crate::ratelimit::RateLimiter;

/// Hosts whose downloads count against the GitHub budget
const GITHUB_HOSTS: &[&str] = &["github.com", "raw.githubusercontent.com"];

/// Per-request options for loading a chart
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Basic auth credentials of the repository
    pub auth: Option<(String, String)>,
    pub cancel: CancellationToken,
}

impl LoadOptions {
    pub fn for_repository(repository: &Repository, cancel: CancellationToken) -> Self {
        Self {
            auth: repository
                .basic_auth()
                .map(|(u, p)| (u.to_string(), p.to_string())),
            cancel,
        }
    }

    fn auth(&self) -> Option<(&str, &str)> {
        self.auth.as_ref().map(|(u, p)| (u.as_str(), p.as_str()))
    }
}

/// Loads chart archives
#[async_trait]
pub trait ChartLoader: Send + Sync {
    async fn load(&self, url: &str, options: &LoadOptions) -> Result<Chart>;
}

/// Chart loader for http(s) and oci URLs
pub struct RemoteChartLoader {
    client: HttpClient,
    oci: Arc<OciClient>,
    github_token: Option<String>,
    github_limiter: Arc<RateLimiter>,
}

impl RemoteChartLoader {
    pub fn new(client: HttpClient, oci: Arc<OciClient>, github_limiter: Arc<RateLimiter>) -> Self {
        Self {
            client,
            oci,
            github_token: None,
            github_limiter,
        }
    }

    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.github_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Download the raw chart package
    pub async fn download(&self, url: &str, options: &LoadOptions) -> Result<Vec<u8>> {
        let parsed = Url::parse(url).map_err(|e| RepoError::InvalidRepositoryUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" => {
                let mut request = self.client.get(url).header("Accept-Encoding", "*");
                if is_github_host(&parsed) {
                    request = request.token(self.github_token.as_deref());
                    self.github_limiter.wait(&options.cancel).await?;
                }
                let request = request.basic_auth(options.auth());
                cancellable(&options.cancel, request.bytes()).await
            }
            "oci" => {
                let reference = url.trim_start_matches(OCI_PREFIX);
                cancellable(
                    &options.cancel,
                    self.oci.pull_chart_content(reference, options.auth()),
                )
                .await
            }
            other => Err(RepoError::SchemeNotSupported {
                scheme: other.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ChartLoader for RemoteChartLoader {
    async fn load(&self, url: &str, options: &LoadOptions) -> Result<Chart> {
        let data = self.download(url, options).await?;
        tracing::trace!(url = %url, bytes = data.len(), "chart package downloaded");
        Ok(load_archive(&data)?)
    }
}

fn is_github_host(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|host| GITHUB_HOSTS.contains(&host))
}
