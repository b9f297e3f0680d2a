//! Package preparation
//!
//! Turns one chart version of the index into a package. The chart archive
//! is only downloaded when the version is new, its digest changed or the
//! digest check is bypassed.

use hubtrack_core::{Package, build_key, parse_version};
use hubtrack_repo::{ChartVersion, LoadOptions, RepoError, cancellable};
use url::Url;

use crate::enrich::{enrich_package_from_annotations, enrich_package_from_chart};
use crate::error::{Result, TrackerError};
use crate::source::TrackerSource;

impl TrackerSource {
    /// Prepare the package for a chart version
    pub async fn prepare_package(&self, chart_version: &ChartVersion) -> Result<Package> {
        let repository = self.repository();
        let md = &chart_version.metadata;

        let version = parse_version(md.version.as_str())
            .map_err(|source| TrackerError::InvalidPackageVersion {
                name: md.name.clone(),
                version: md.version.clone(),
                source,
            })?
            .to_string();

        let raw_url = chart_version
            .urls
            .first()
            .ok_or(TrackerError::ChartUrlNotProvided)?;
        let chart_url = resolve_chart_url(&repository.url, raw_url)?;

        let mut p = Package {
            name: md.name.clone(),
            version,
            digest: (!chart_version.digest.is_empty()).then(|| chart_version.digest.clone()),
            content_url: chart_url.to_string(),
            repository: repository.clone(),
            ts: chart_version.created.map(|created| created.timestamp()),
            ..Default::default()
        };

        let key = build_key(&p.name, &p.version);
        let registered = self.input.packages_registered.get(&key);
        let bypass = self.services().config.bypass_digest_check;
        if !needs_enrichment(registered, &chart_version.digest, bypass) {
            tracing::debug!(package = %key, "digest unchanged, skipping enrichment");
            return Ok(p);
        }
        tracing::debug!(package = %key, registered = registered.is_some(), "enriching package");

        let services = self.services();
        let options = LoadOptions::for_repository(repository, services.cancel.clone());
        let mut chart = services
            .chart_loader
            .load(&p.content_url, &options)
            .await
            .map_err(|source| TrackerError::LoadChart {
                url: p.content_url.clone(),
                source,
            })?;
        chart
            .metadata
            .validate()
            .map_err(TrackerError::InvalidChart)?;

        let icon = chart.metadata.icon.clone();
        if !icon.is_empty() {
            match cancellable(
                &services.cancel,
                services.image_store.download_and_save_image(&icon),
            )
            .await
            {
                Ok(id) => {
                    p.logo_url = Some(icon);
                    p.logo_image_id = Some(id);
                }
                Err(RepoError::Cancelled) => return Err(TrackerError::Cancelled),
                Err(e) => self.warn(
                    &chart.metadata,
                    format!("error getting logo image {}: {}", icon, e),
                ),
            }
        }

        if chart_url.scheme() != "oci" {
            match cancellable(
                &services.cancel,
                services
                    .provenance
                    .has_provenance_file(repository, &p.content_url),
            )
            .await
            {
                Ok(signed) => p.signed = signed,
                Err(RepoError::Cancelled) => return Err(TrackerError::Cancelled),
                Err(e) => self.warn(
                    &chart.metadata,
                    format!("error checking provenance file: {}", e),
                ),
            }
        }

        // Rendering is CPU bound, keep it off the async workers
        let annotations = chart.metadata.annotations.clone();
        let mut p = tokio::task::spawn_blocking(move || {
            enrich_package_from_chart(&mut p, &chart);
            p
        })
        .await?;
        enrich_package_from_annotations(&mut p, &annotations)?;

        Ok(p)
    }
}

/// Whether a chart version has to be downloaded and enriched
pub fn needs_enrichment(registered_digest: Option<&String>, digest: &str, bypass: bool) -> bool {
    match registered_digest {
        None => true,
        Some(registered) => bypass || registered != digest,
    }
}

/// Resolve a chart URL from the index against the repository URL
///
/// Relative URLs take the scheme and host of the repository. Their path is
/// appended to the repository path unless it is absolute.
pub fn resolve_chart_url(repository_url: &str, chart_url: &str) -> Result<Url> {
    let invalid = |reason: String| TrackerError::InvalidChartUrl {
        url: chart_url.to_string(),
        reason,
    };

    match Url::parse(chart_url) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let mut url = Url::parse(repository_url).map_err(|e| invalid(e.to_string()))?;
            let (path, query) = match chart_url.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (chart_url, None),
            };
            let path = if path.starts_with('/') {
                clean_path(path)
            } else {
                clean_path(&format!("{}/{}", url.path(), path))
            };
            url.set_path(&path);
            url.set_query(query);
            url.set_fragment(None);
            Ok(url)
        }
        Err(e) => Err(invalid(e.to_string())),
    }
}

/// Lexically clean a slash separated path (`.`, `..` and empty segments)
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}
