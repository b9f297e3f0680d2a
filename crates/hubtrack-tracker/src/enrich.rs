//! Metadata enrichment
//!
//! A minimal package built from the repository index is completed with
//! data found in the chart archive, then with the `artifacthub.io/*`
//! annotations of its `Chart.yaml`, which take precedence.

use hubtrack_core::{
    Chart, ContainerImage, Link, Maintainer, Package, Recommendation, SignKey, license,
    parse_changes_annotation,
};
use hubtrack_render::extract_containers_images;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;

use crate::error::AnnotationErrors;
use crate::images::validate_containers_images;

/// Annotations understood by the tracker
pub mod keys {
    pub const CHANGES: &str = "artifacthub.io/changes";
    pub const CONTAINS_SECURITY_UPDATES: &str = "artifacthub.io/containsSecurityUpdates";
    pub const CRDS: &str = "artifacthub.io/crds";
    pub const CRDS_EXAMPLES: &str = "artifacthub.io/crdsExamples";
    pub const IMAGES: &str = "artifacthub.io/images";
    pub const LICENSE: &str = "artifacthub.io/license";
    pub const LINKS: &str = "artifacthub.io/links";
    pub const MAINTAINERS: &str = "artifacthub.io/maintainers";
    pub const OPERATOR: &str = "artifacthub.io/operator";
    pub const OPERATOR_CAPABILITIES: &str = "artifacthub.io/operatorCapabilities";
    pub const PRERELEASE: &str = "artifacthub.io/prerelease";
    pub const RECOMMENDATIONS: &str = "artifacthub.io/recommendations";
    pub const SIGN_KEY: &str = "artifacthub.io/signKey";
}

/// Capability levels of the operator maturity model
pub const OPERATOR_CAPABILITIES: &[&str] = &[
    "basic install",
    "seamless upgrades",
    "full lifecycle",
    "deep insights",
    "auto pilot",
];

/// Complete a package with the information available in its chart
pub fn enrich_package_from_chart(p: &mut Package, chart: &Chart) {
    let md = &chart.metadata;

    p.description = non_empty(&md.description);
    p.keywords = md.keywords.clone();
    p.home_url = non_empty(&md.home);
    p.app_version = non_empty(&md.app_version);
    p.deprecated = md.deprecated;
    p.values_schema = match chart.schema_json() {
        Ok(schema) => schema,
        Err(e) => {
            tracing::debug!(chart = %md.name, error = %e, "ignoring invalid values schema");
            None
        }
    };

    p.data.insert("apiVersion".to_string(), json!(md.api_version));
    p.data.insert("kubeVersion".to_string(), json!(md.kube_version));
    p.data.insert("type".to_string(), json!(md.chart_type));
    if !md.dependencies.is_empty() {
        let dependencies: Vec<JsonValue> = md
            .dependencies
            .iter()
            .map(|d| json!({"name": d.name, "version": d.version, "repository": d.repository}))
            .collect();
        p.data
            .insert("dependencies".to_string(), JsonValue::Array(dependencies));
    }

    match extract_containers_images(chart) {
        Ok(images) if !images.is_empty() => {
            let images: Vec<ContainerImage> =
                images.into_iter().map(ContainerImage::from_ref).collect();
            match validate_containers_images(&images) {
                Ok(()) => p.containers_images = images,
                Err(e) => tracing::debug!(chart = %md.name, error = %e, "dropping rendered images"),
            }
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(chart = %md.name, error = %e, "no images: render failed"),
    }

    if let Some(file) = chart.file("LICENSE") {
        p.license = license::detect(&file.data);
    }

    p.links.extend(md.sources.iter().map(|url| Link::new("source", url.clone())));

    p.maintainers.extend(
        md.maintainers
            .iter()
            .filter(|m| !m.email.is_empty())
            .map(|m| Maintainer {
                name: m.name.clone(),
                email: m.email.clone(),
            }),
    );

    if md.name.to_lowercase().contains("operator") {
        p.is_operator = true;
    }

    if let Some(readme) = chart.file("README.md") {
        p.readme = Some(readme.text());
    }
}

/// Apply the `artifacthub.io/*` annotations to a package
///
/// Every annotation is processed; the problems found are returned together.
pub fn enrich_package_from_annotations(
    p: &mut Package,
    annotations: &HashMap<String, String>,
) -> Result<(), AnnotationErrors> {
    let mut errs = AnnotationErrors::default();
    let get = |key: &str| annotations.get(key).map(String::as_str);

    if let Some(v) = get(keys::CHANGES) {
        match parse_changes_annotation(v) {
            Ok(changes) => p.changes = changes,
            Err(e) => errs.push(e.to_string()),
        }
    }

    if let Some(v) = get(keys::CRDS) {
        match parse_yaml::<Vec<JsonValue>>(v) {
            Some(crds) => p.crds = crds,
            None => errs.push(format!("invalid crds value: {}", v)),
        }
    }

    if let Some(v) = get(keys::CRDS_EXAMPLES) {
        match parse_yaml::<Vec<JsonValue>>(v) {
            Some(examples) => p.crds_examples = examples,
            None => errs.push(format!("invalid crdsExamples value: {}", v)),
        }
    }

    if let Some(v) = get(keys::IMAGES) {
        match parse_yaml::<Vec<ContainerImage>>(v) {
            Some(images) => match validate_containers_images(&images) {
                Ok(()) => p.containers_images = images,
                Err(e) => errs.push(e),
            },
            None => errs.push(format!("invalid images value: {}", v)),
        }
    }

    if let Some(v) = get(keys::LICENSE).filter(|v| !v.is_empty()) {
        p.license = Some(v.to_string());
    }

    if let Some(v) = get(keys::LINKS) {
        match parse_yaml::<Vec<Link>>(v) {
            Some(links) => {
                for link in links {
                    match p.links.iter_mut().find(|l| l.url == link.url) {
                        Some(existing) => existing.name = link.name,
                        None => p.links.push(link),
                    }
                }
            }
            None => errs.push(format!("invalid links value: {}", v)),
        }
    }

    if let Some(v) = get(keys::MAINTAINERS) {
        match parse_yaml::<Vec<Maintainer>>(v) {
            Some(maintainers) => {
                for maintainer in maintainers {
                    match p.maintainers.iter_mut().find(|m| m.email == maintainer.email) {
                        Some(existing) => existing.name = maintainer.name,
                        None => p.maintainers.push(maintainer),
                    }
                }
            }
            None => errs.push(format!("invalid maintainers value: {}", v)),
        }
    }

    if let Some(v) = get(keys::OPERATOR) {
        match parse_bool(v) {
            Some(b) => p.is_operator = b,
            None => errs.push(format!("invalid operator value: {}", v)),
        }
    }

    if let Some(v) = get(keys::OPERATOR_CAPABILITIES) {
        let capabilities = v.to_lowercase();
        if OPERATOR_CAPABILITIES.contains(&capabilities.as_str()) {
            p.capabilities = Some(capabilities);
        } else {
            errs.push(format!("invalid operatorCapabilities value: {}", v));
        }
    }

    if let Some(v) = get(keys::PRERELEASE) {
        match parse_bool(v) {
            Some(b) => p.prerelease = b,
            None => errs.push(format!("invalid prerelease value: {}", v)),
        }
    }

    if let Some(v) = get(keys::RECOMMENDATIONS) {
        match parse_yaml::<Vec<Recommendation>>(v) {
            Some(recommendations) => p.recommendations = recommendations,
            None => errs.push(format!("invalid recommendations value: {}", v)),
        }
    }

    if let Some(v) = get(keys::CONTAINS_SECURITY_UPDATES) {
        match parse_bool(v) {
            Some(b) => p.contains_security_updates = b,
            None => errs.push(format!("invalid containsSecurityUpdates value: {}", v)),
        }
    }

    if let Some(v) = get(keys::SIGN_KEY) {
        match parse_yaml::<SignKey>(v) {
            Some(key) if key.url.is_empty() => errs.push("sign key url not provided"),
            Some(key) => p.sign_key = Some(key),
            None => errs.push(format!("invalid signKey value: {}", v)),
        }
    }

    errs.into_result()
}

fn parse_yaml<T: DeserializeOwned>(value: &str) -> Option<T> {
    serde_yaml::from_str(value).ok()
}

/// Boolean parsing with the spellings Go's `strconv.ParseBool` accepts
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
