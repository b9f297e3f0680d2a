//! OCI registry access
//!
//! Charts stored in OCI registries have no index: their versions are the
//! tags of the repository and the chart archive is a layer of the image.

use async_trait::async_trait;
use hubtrack_core::{Repository, is_valid_version};
use oci_distribution::Reference;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;

use crate::error::{RepoError, Result};

/// Prefix of OCI repository URLs
pub const OCI_PREFIX: &str = "oci://";

/// Media types for Helm charts in OCI
pub mod media_types {
    /// Helm chart config
    pub const HELM_CONFIG: &str = "application/vnd.cncf.helm.config.v1+json";
    /// Helm chart content layer
    pub const HELM_CONTENT: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
    /// Chart content layer pushed by older Helm versions
    pub const LEGACY_CONTENT: &str = "application/tar+gzip";
}

/// Lists the tags of an OCI repository
#[async_trait]
pub trait TagsGetter: Send + Sync {
    async fn tags(&self, repository: &Repository) -> Result<Vec<String>>;
}

/// OCI registry client
pub struct OciClient {
    client: Client,
}

impl Default for OciClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OciClient {
    pub fn new() -> Self {
        let config = ClientConfig {
            protocol: ClientProtocol::Https,
            ..Default::default()
        };
        Self {
            client: Client::new(config),
        }
    }

    /// Pull the chart archive stored at `reference` (without `oci://`)
    pub async fn pull_chart_content(
        &self,
        reference: &str,
        auth: Option<(&str, &str)>,
    ) -> Result<Vec<u8>> {
        let reference = parse_reference(reference)?;
        tracing::debug!(reference = %reference, "pulling chart content");

        let image = self
            .client
            .pull(
                &reference,
                &registry_auth(auth),
                vec![
                    media_types::HELM_CONFIG,
                    media_types::HELM_CONTENT,
                    media_types::LEGACY_CONTENT,
                ],
            )
            .await?;

        image
            .layers
            .into_iter()
            .find(|l| is_content_layer(&l.media_type))
            .map(|l| l.data)
            .ok_or(RepoError::ContentLayerNotFound)
    }

    /// List the tags of the repository at `reference` (without `oci://`)
    pub async fn list_tags(
        &self,
        reference: &str,
        auth: Option<(&str, &str)>,
    ) -> Result<Vec<String>> {
        let reference = parse_reference(reference)?;
        let response = self
            .client
            .list_tags(&reference, &registry_auth(auth), None, None)
            .await?;
        Ok(response.tags)
    }
}

/// Tags getter backed by the OCI distribution API
///
/// Only tags that are valid versions are returned.
pub struct OciTagsGetter {
    client: OciClient,
}

impl OciTagsGetter {
    pub fn new(client: OciClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TagsGetter for OciTagsGetter {
    async fn tags(&self, repository: &Repository) -> Result<Vec<String>> {
        let reference = strip_oci_prefix(&repository.url)?;
        let tags = self
            .client
            .list_tags(reference, repository.basic_auth())
            .await?;

        let total = tags.len();
        let tags: Vec<String> = tags.into_iter().filter(|t| is_valid_version(t)).collect();
        if tags.len() < total {
            tracing::debug!(
                repository = %repository.url,
                skipped = total - tags.len(),
                "ignoring tags that are not versions"
            );
        }
        Ok(tags)
    }
}

fn is_content_layer(media_type: &str) -> bool {
    media_type == media_types::HELM_CONTENT || media_type == media_types::LEGACY_CONTENT
}

fn registry_auth(auth: Option<(&str, &str)>) -> RegistryAuth {
    match auth {
        Some((user, pass)) => RegistryAuth::Basic(user.to_string(), pass.to_string()),
        None => RegistryAuth::Anonymous,
    }
}

/// Strip `oci://` from a repository or chart URL
pub fn strip_oci_prefix(url: &str) -> Result<&str> {
    url.strip_prefix(OCI_PREFIX)
        .ok_or_else(|| RepoError::InvalidOciReference {
            reference: url.to_string(),
        })
}

/// Parse an OCI reference such as `ghcr.io/org/chart:1.0.0`
pub fn parse_reference(reference: &str) -> Result<Reference> {
    Reference::try_from(reference).map_err(|e| RepoError::InvalidOciReference {
        reference: format!("{}: {}", reference, e),
    })
}

/// Name of the chart stored in an OCI repository (last path segment)
pub fn chart_name(repository_url: &str) -> &str {
    repository_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(repository_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        let reference = parse_reference("ghcr.io/org/charts/nginx:1.0.0").unwrap();
        assert_eq!(reference.registry(), "ghcr.io");
        assert_eq!(reference.repository(), "org/charts/nginx");
        assert_eq!(reference.tag(), Some("1.0.0"));

        assert!(parse_reference("").is_err());
    }

    #[test]
    fn test_strip_oci_prefix() {
        assert_eq!(
            strip_oci_prefix("oci://ghcr.io/org/nginx").unwrap(),
            "ghcr.io/org/nginx"
        );
        assert!(strip_oci_prefix("https://ghcr.io/org/nginx").is_err());
    }

    #[test]
    fn test_chart_name() {
        assert_eq!(chart_name("oci://ghcr.io/org/charts/nginx"), "nginx");
        assert_eq!(chart_name("oci://ghcr.io/org/charts/nginx/"), "nginx");
    }

    #[test]
    fn test_content_layer_media_types() {
        assert!(is_content_layer(media_types::HELM_CONTENT));
        assert!(is_content_layer("application/tar+gzip"));
        assert!(!is_content_layer(media_types::HELM_CONFIG));
    }
}
