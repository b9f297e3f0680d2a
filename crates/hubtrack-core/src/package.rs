//! Package model
//!
//! A `Package` is one version of a chart as the hub stores it. The tracker
//! builds a minimal package from the repository index and enriches it with
//! data from the chart archive and its annotations when needed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Kind of repository being tracked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    #[default]
    Helm,
}

/// Repository a package belongs to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Identifier used to group errors reported while tracking
    #[serde(default)]
    pub repository_id: String,

    pub name: String,

    /// Repository URL (http(s) index location or oci:// reference)
    pub url: String,

    #[serde(default)]
    pub kind: RepositoryKind,

    #[serde(skip)]
    pub auth_user: Option<String>,

    #[serde(skip)]
    pub auth_pass: Option<String>,
}

impl Repository {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Basic auth credentials, when any part of them was provided
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        if self.auth_user.is_none() && self.auth_pass.is_none() {
            return None;
        }
        Some((
            self.auth_user.as_deref().unwrap_or_default(),
            self.auth_pass.as_deref().unwrap_or_default(),
        ))
    }
}

/// A package version as registered in the hub
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_url: String,

    #[serde(default)]
    pub repository: Repository,

    /// Creation timestamp (unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_image_id: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub signed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_schema: Option<JsonValue>,

    /// Kind-specific data (apiVersion, dependencies, kubeVersion, type)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, JsonValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers_images: Vec<ContainerImage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub is_operator: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Change>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crds: Vec<JsonValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crds_examples: Vec<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub prerelease: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<Recommendation>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub contains_security_updates: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_key: Option<SignKey>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Package {
    /// Key identifying this package version (`name@version`)
    pub fn key(&self) -> String {
        build_key(&self.name, &self.version)
    }
}

/// Build the key used to identify a package version
pub fn build_key(name: &str, version: &str) -> String {
    format!("{}@{}", name, version)
}

/// Named link related to a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

impl Link {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Package maintainer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Container image used by a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerImage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub whitelisted: bool,
}

impl ContainerImage {
    pub fn from_ref(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }
}

/// Another package recommended alongside this one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default)]
    pub url: String,
}

/// Key used to sign the package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignKey {
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub url: String,
}

/// Entry of the changes made in a package version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}
