//! Helm chart model
//!
//! Mirrors the layout of a loaded Helm chart: the parsed `Chart.yaml`, the
//! default values, the optional values schema, templates, other files and
//! the subcharts bundled under `charts/`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::error::{CoreError, Result};
use crate::version::is_valid_version;

/// Chart API version used by Helm 2 era charts
pub const API_VERSION_V1: &str = "v1";

/// Chart API version used by Helm 3 charts
pub const API_VERSION_V2: &str = "v2";

static ALIAS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9-_]+$").expect("alias regex is valid"));

/// Contents of `Chart.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "string_or_number")]
    pub version: String,

    #[serde(default)]
    pub kube_version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, rename = "type")]
    pub chart_type: String,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub home: String,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub dependencies: Vec<ChartDependency>,

    #[serde(default)]
    pub maintainers: Vec<ChartMaintainer>,

    #[serde(default)]
    pub icon: String,

    #[serde(default, deserialize_with = "string_or_number")]
    pub app_version: String,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

/// Maintainer entry in `Chart.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartMaintainer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub url: String,
}

/// Dependency entry in `Chart.yaml` (or `requirements.yaml` for v1 charts)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChartDependency {
    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "string_or_number")]
    pub version: String,

    #[serde(default)]
    pub repository: String,

    #[serde(default)]
    pub condition: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub alias: String,

    #[serde(default)]
    pub import_values: Vec<serde_yaml::Value>,
}

/// A file inside a chart, with its path relative to the chart root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl ChartFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// File content as text (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// A loaded Helm chart
#[derive(Debug, Clone, Default)]
pub struct Chart {
    pub metadata: ChartMetadata,

    /// Default values from `values.yaml`
    pub values: JsonValue,

    /// Raw `values.schema.json`
    pub schema: Option<Vec<u8>>,

    /// Files under `templates/`
    pub templates: Vec<ChartFile>,

    /// Every file that is not handled specially by the loader
    pub files: Vec<ChartFile>,

    /// Subcharts bundled under `charts/`
    pub dependencies: Vec<Chart>,
}

impl Chart {
    /// Chart name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Get a file by exact path
    pub fn file(&self, name: &str) -> Option<&ChartFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Custom resource definitions shipped in `crds/`
    pub fn crds(&self) -> impl Iterator<Item = &ChartFile> {
        self.files.iter().filter(|f| {
            f.name.starts_with("crds/")
                && (f.name.ends_with(".yaml")
                    || f.name.ends_with(".yml")
                    || f.name.ends_with(".json"))
        })
    }

    /// Values schema parsed as JSON
    pub fn schema_json(&self) -> Result<Option<JsonValue>> {
        match &self.schema {
            Some(raw) if !raw.is_empty() => Ok(Some(serde_json::from_slice(raw)?)),
            _ => Ok(None),
        }
    }

    /// Whether the chart is a library chart (nothing to render)
    pub fn is_library(&self) -> bool {
        self.metadata.chart_type == "library"
    }

    /// Validate the chart metadata, sanitizing strings first
    pub fn validate(&mut self) -> Result<()> {
        self.metadata.validate()
    }
}

impl ChartMetadata {
    /// Validate the metadata for known issues
    ///
    /// Strings are sanitized in place: whitespace becomes a plain space and
    /// non-printable characters are removed.
    pub fn validate(&mut self) -> Result<()> {
        self.name = sanitize(&self.name);
        self.description = sanitize(&self.description);
        self.home = sanitize(&self.home);
        self.icon = sanitize(&self.icon);
        self.version = sanitize(&self.version);
        self.app_version = sanitize(&self.app_version);
        self.sources.iter_mut().for_each(|s| *s = sanitize(s));
        self.keywords.iter_mut().for_each(|k| *k = sanitize(k));

        if self.api_version.is_empty() {
            return Err(CoreError::validation("chart.metadata.apiVersion is required"));
        }
        if self.name.is_empty() {
            return Err(CoreError::validation("chart.metadata.name is required"));
        }
        if self.name.contains('/') || self.name.contains('\\') {
            return Err(CoreError::validation(format!(
                "chart.metadata.name {:?} is invalid",
                self.name
            )));
        }
        if self.version.is_empty() {
            return Err(CoreError::validation("chart.metadata.version is required"));
        }
        if !is_valid_version(&self.version) {
            return Err(CoreError::validation(format!(
                "chart.metadata.version {:?} is invalid",
                self.version
            )));
        }
        if !matches!(self.chart_type.as_str(), "" | "application" | "library") {
            return Err(CoreError::validation(
                "chart.metadata.type must be application or library",
            ));
        }

        for maintainer in &mut self.maintainers {
            maintainer.name = sanitize(&maintainer.name);
            maintainer.email = sanitize(&maintainer.email);
            maintainer.url = sanitize(&maintainer.url);
        }

        for dependency in &mut self.dependencies {
            dependency.name = sanitize(&dependency.name);
            dependency.version = sanitize(&dependency.version);
            dependency.repository = sanitize(&dependency.repository);
            dependency.alias = sanitize(&dependency.alias);
            if !dependency.alias.is_empty() && !ALIAS_RE.is_match(&dependency.alias) {
                return Err(CoreError::validation(format!(
                    "dependency {:?} has disallowed characters in the alias",
                    dependency.name
                )));
            }
        }

        Ok(())
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some(' ')
            } else if c.is_control() {
                None
            } else {
                Some(c)
            }
        })
        .collect()
}

/// Accept `1.16` or `2` where a string is expected
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(yaml: &str) -> ChartMetadata {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_parse_chart_yaml() {
        let md = metadata(
            r#"
apiVersion: v2
name: nginx
version: 15.0.0
appVersion: 1.25
type: application
keywords: [web, http]
maintainers:
  - name: Jane
    email: jane@example.com
dependencies:
  - name: common
    version: 2.x.x
    repository: https://charts.example.com
    import-values: [data]
annotations:
  artifacthub.io/license: MIT
"#,
        );

        assert_eq!(md.name, "nginx");
        assert_eq!(md.app_version, "1.25");
        assert_eq!(md.keywords, vec!["web", "http"]);
        assert_eq!(md.maintainers[0].email, "jane@example.com");
        assert_eq!(md.dependencies[0].import_values.len(), 1);
        assert_eq!(md.annotations["artifacthub.io/license"], "MIT");
    }

    #[test]
    fn test_validate_ok_and_sanitizes() {
        let mut md = metadata("apiVersion: v2\nname: app\nversion: 1.0.0\n");
        md.description = "line one\nline\u{7}two".to_string();
        md.validate().unwrap();
        assert_eq!(md.description, "line one linetwo");
    }

    #[test]
    fn test_validate_errors() {
        let cases = [
            ("name: app\nversion: 1.0.0\n", "apiVersion is required"),
            ("apiVersion: v2\nversion: 1.0.0\n", "name is required"),
            ("apiVersion: v2\nname: app\n", "version is required"),
            ("apiVersion: v2\nname: app\nversion: one\n", "version \"one\" is invalid"),
            ("apiVersion: v2\nname: a/b\nversion: 1.0.0\n", "name \"a/b\" is invalid"),
            (
                "apiVersion: v2\nname: app\nversion: 1.0.0\ntype: plugin\n",
                "must be application or library",
            ),
            (
                "apiVersion: v2\nname: app\nversion: 1.0.0\ndependencies:\n  - name: dep\n    alias: bad.alias\n",
                "disallowed characters in the alias",
            ),
        ];

        for (yaml, expected) in cases {
            let err = metadata(yaml).validate().unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "{} does not contain {}",
                err,
                expected
            );
        }
    }

    #[test]
    fn test_crds_and_file_lookup() {
        let chart = Chart {
            files: vec![
                ChartFile::new("README.md", "# readme"),
                ChartFile::new("crds/crd.yaml", "kind: CustomResourceDefinition"),
                ChartFile::new("crds/notes.txt", "ignored"),
            ],
            ..Default::default()
        };

        assert_eq!(chart.file("README.md").unwrap().text(), "# readme");
        assert!(chart.file("LICENSE").is_none());
        assert_eq!(chart.crds().count(), 1);
    }
}
