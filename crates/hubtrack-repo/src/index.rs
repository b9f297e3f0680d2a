//! Repository index types and loader
//!
//! Helm repositories publish an `index.yaml` listing every version of every
//! chart they serve.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hubtrack_core::{ChartMetadata, Repository};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::client::HttpClient;
use crate::error::{RepoError, Result};

/// Repository index (`index.yaml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    #[serde(default)]
    pub api_version: String,

    /// Chart versions indexed by chart name
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartVersion>>,
}

impl RepositoryIndex {
    /// Parse index from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_yaml::from_slice(bytes).map_err(|e| RepoError::IndexParseError {
            message: e.to_string(),
        })
    }

    /// Every chart version in the index
    pub fn chart_versions(&self) -> impl Iterator<Item = &ChartVersion> {
        self.entries.values().flatten()
    }
}

/// One chart version listed in an index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartVersion {
    #[serde(flatten)]
    pub metadata: ChartMetadata,

    /// Download locations, possibly relative to the repository URL
    #[serde(default)]
    pub urls: Vec<String>,

    #[serde(default)]
    pub digest: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl ChartVersion {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            metadata: ChartMetadata {
                name: name.into(),
                version: version.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }
}

/// Loads the index of a repository
#[async_trait]
pub trait IndexLoader: Send + Sync {
    async fn load_index(&self, repository: &Repository) -> Result<RepositoryIndex>;
}

/// Loads `<url>/index.yaml` over HTTP(S)
pub struct HttpIndexLoader {
    client: HttpClient,
}

impl HttpIndexLoader {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IndexLoader for HttpIndexLoader {
    async fn load_index(&self, repository: &Repository) -> Result<RepositoryIndex> {
        let url = index_url(&repository.url)?;
        tracing::debug!(url = %url, "loading repository index");

        let data = self
            .client
            .get(&url)
            .basic_auth(repository.basic_auth())
            .bytes()
            .await?;
        RepositoryIndex::from_bytes(&data)
    }
}

/// Location of the index file of an http(s) repository
pub fn index_url(repository_url: &str) -> Result<String> {
    let parsed = url::Url::parse(repository_url).map_err(|e| RepoError::InvalidRepositoryUrl {
        url: repository_url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(format!("{}/index.yaml", repository_url.trim_end_matches('/'))),
        other => Err(RepoError::SchemeNotSupported {
            scheme: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
apiVersion: v1
entries:
  nginx:
    - apiVersion: v2
      name: nginx
      version: 1.2.0
      appVersion: 1.25.3
      description: NGINX web server
      urls:
        - nginx-1.2.0.tgz
      digest: 4f2c9a
      created: "2024-03-01T10:00:00.123456789Z"
    - apiVersion: v2
      name: nginx
      version: 1.1.0
      urls:
        - https://cdn.example.com/nginx-1.1.0.tgz
      digest: 1a2b3c
  redis:
    - name: redis
      version: 18.0.1
      annotations:
        artifacthub.io/license: BSD-3-Clause
      urls: [redis-18.0.1.tgz]
generated: "2024-03-01T10:00:00Z"
"#;

    #[test]
    fn test_parse_index() {
        let index = RepositoryIndex::from_bytes(INDEX.as_bytes()).unwrap();
        assert_eq!(index.entries.len(), 2);
        assert_eq!(index.chart_versions().count(), 3);

        let nginx = &index.entries["nginx"][0];
        assert_eq!(nginx.name(), "nginx");
        assert_eq!(nginx.version(), "1.2.0");
        assert_eq!(nginx.metadata.app_version, "1.25.3");
        assert_eq!(nginx.urls, vec!["nginx-1.2.0.tgz"]);
        assert_eq!(nginx.created.unwrap().timestamp(), 1_709_287_200);

        let redis = &index.entries["redis"][0];
        assert!(redis.created.is_none());
        assert_eq!(
            redis.metadata.annotations["artifacthub.io/license"],
            "BSD-3-Clause"
        );
    }

    #[test]
    fn test_parse_invalid_index() {
        let err = RepositoryIndex::from_bytes(b"entries: [").unwrap_err();
        assert!(matches!(err, RepoError::IndexParseError { .. }));
    }

    #[test]
    fn test_index_url() {
        assert_eq!(
            index_url("https://charts.example.com/stable/").unwrap(),
            "https://charts.example.com/stable/index.yaml"
        );
        assert!(matches!(
            index_url("oci://ghcr.io/org/chart"),
            Err(RepoError::SchemeNotSupported { .. })
        ));
        assert!(index_url("not a url").is_err());
    }
}
