//! Dry-run chart rendering
//!
//! Renders a chart the way `helm install --dry-run --disable-hooks
//! --include-crds` would with default values: values are coalesced across
//! subcharts, validated against their schemas, every template is rendered
//! and the resulting documents are concatenated into a release manifest.

use hubtrack_core::{Chart, ChartDependency, ChartMetadata, Values, deep_merge, parse_version};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::rc::Rc;

use crate::engine::Engine;
use crate::error::{RenderError, Result};
use crate::files_object::Files;
use crate::functions::semver_compare;
use crate::value::{Dict, Value};

/// Release name used for dry-run installs
pub const DEFAULT_RELEASE_NAME: &str = "release-name";

/// Kubernetes version reported to templates
pub const DEFAULT_KUBE_VERSION: &str = "v1.20.0";

/// API versions known to a default Kubernetes 1.20 cluster
pub const DEFAULT_API_VERSIONS: &[&str] = &[
    "v1",
    "admissionregistration.k8s.io/v1",
    "admissionregistration.k8s.io/v1beta1",
    "apiextensions.k8s.io/v1",
    "apiextensions.k8s.io/v1beta1",
    "apiregistration.k8s.io/v1",
    "apiregistration.k8s.io/v1beta1",
    "apps/v1",
    "authentication.k8s.io/v1",
    "authentication.k8s.io/v1beta1",
    "authorization.k8s.io/v1",
    "authorization.k8s.io/v1beta1",
    "autoscaling/v1",
    "autoscaling/v2beta1",
    "autoscaling/v2beta2",
    "batch/v1",
    "batch/v1beta1",
    "certificates.k8s.io/v1",
    "certificates.k8s.io/v1beta1",
    "coordination.k8s.io/v1",
    "coordination.k8s.io/v1beta1",
    "discovery.k8s.io/v1beta1",
    "events.k8s.io/v1",
    "events.k8s.io/v1beta1",
    "extensions/v1beta1",
    "networking.k8s.io/v1",
    "networking.k8s.io/v1beta1",
    "node.k8s.io/v1",
    "node.k8s.io/v1beta1",
    "policy/v1beta1",
    "rbac.authorization.k8s.io/v1",
    "rbac.authorization.k8s.io/v1beta1",
    "scheduling.k8s.io/v1",
    "scheduling.k8s.io/v1beta1",
    "storage.k8s.io/v1",
    "storage.k8s.io/v1beta1",
];

static DOCUMENT_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^---[ \t]*(?:#.*)?$").expect("separator regex is valid"));

/// Settings of a dry-run install
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub release_name: String,
    pub namespace: String,
    pub kube_version: String,
    pub api_versions: Vec<String>,
    pub include_crds: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            release_name: DEFAULT_RELEASE_NAME.to_string(),
            namespace: "default".to_string(),
            kube_version: DEFAULT_KUBE_VERSION.to_string(),
            api_versions: DEFAULT_API_VERSIONS.iter().map(|v| v.to_string()).collect(),
            include_crds: true,
        }
    }
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release_name(mut self, name: impl Into<String>) -> Self {
        self.release_name = name.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_kube_version(mut self, version: impl Into<String>) -> Self {
        self.kube_version = version.into();
        self
    }
}

/// A chart in the dependency tree together with its final values
struct Scope<'c> {
    /// Template path prefix, e.g. `app/charts/redis`
    path: String,
    chart: &'c Chart,
    values: JsonValue,
}

/// Render a chart with its default values into a release manifest
pub fn render_chart(chart: &Chart, options: &RenderOptions) -> Result<String> {
    check_installable(chart, options)?;

    let values = coalesce(chart, &JsonValue::Object(Map::new()));
    let mut scopes = Vec::new();
    collect_scopes(chart, values, chart.name().to_string(), &mut scopes);

    validate_schemas(&scopes)?;

    let mut engine = Engine::new();
    for scope in &scopes {
        for template in &scope.chart.templates {
            engine.add_template(&template_name(scope, &template.name), &template.text())?;
        }
    }

    let mut manifest = String::new();

    if options.include_crds {
        for scope in scopes.iter().rev() {
            for crd in scope.chart.crds() {
                let text = crd.text();
                manifest.push_str(&format!(
                    "---\n# Source: {}/{}\n{}\n",
                    scope.path,
                    crd.name,
                    text.trim_end()
                ));
            }
        }
    }

    let capabilities = capabilities(options)?;
    let release = release(options);

    for scope in &scopes {
        if scope.chart.is_library() {
            continue;
        }

        let base = base_data(scope, &release, &capabilities);
        for template in &scope.chart.templates {
            if !is_renderable(&template.name) {
                continue;
            }

            let name = template_name(scope, &template.name);
            let data = with_template(&base, &name, &scope.path);
            let rendered = engine.render(&name, &data)?;

            for document in split_documents(&rendered) {
                if keep_document(&name, document)? {
                    manifest.push_str(&format!("---\n# Source: {}\n{}\n", name, document));
                }
            }
        }
    }

    tracing::debug!(chart = %chart.name(), bytes = manifest.len(), "chart rendered");
    Ok(manifest)
}

/// Checks `helm install` performs before rendering
fn check_installable(chart: &Chart, options: &RenderOptions) -> Result<()> {
    if chart.is_library() {
        return Err(RenderError::NotInstallable(format!(
            "{} charts are not installable",
            chart.metadata.chart_type
        )));
    }

    let constraint = &chart.metadata.kube_version;
    if !constraint.is_empty() && !semver_compare(constraint, &options.kube_version)? {
        return Err(RenderError::NotInstallable(format!(
            "chart requires kubeVersion: {} which is incompatible with Kubernetes {}",
            constraint, options.kube_version
        )));
    }

    Ok(())
}

/// Effective name of a dependency: its alias when set
fn dependency_name<'a>(chart: &'a Chart, dependency: Option<&'a ChartDependency>) -> &'a str {
    match dependency {
        Some(dep) if !dep.alias.is_empty() => &dep.alias,
        _ => chart.name(),
    }
}

/// Subcharts paired with their `Chart.yaml` dependency entry, if listed
fn subcharts(chart: &Chart) -> impl Iterator<Item = (&Chart, Option<&ChartDependency>)> {
    chart.dependencies.iter().map(move |sub| {
        let dependency = chart
            .metadata
            .dependencies
            .iter()
            .find(|dep| dep.name == sub.name());
        (sub, dependency)
    })
}

/// Merge a chart's defaults with values given by its parent, recursively
fn coalesce(chart: &Chart, overrides: &JsonValue) -> JsonValue {
    let mut values = match &chart.values {
        JsonValue::Object(_) => chart.values.clone(),
        _ => JsonValue::Object(Map::new()),
    };
    deep_merge(&mut values, overrides);

    for (sub, dependency) in subcharts(chart) {
        let name = dependency_name(sub, dependency).to_string();
        let scoped = Values(values.clone()).scope_for_subchart(&name).into_inner();
        let sub_values = coalesce(sub, &scoped);
        if let JsonValue::Object(map) = &mut values {
            map.insert(name, sub_values);
        }
    }

    values
}

fn collect_scopes<'c>(chart: &'c Chart, values: JsonValue, path: String, out: &mut Vec<Scope<'c>>) {
    for (sub, dependency) in subcharts(chart) {
        if !is_enabled(dependency, &values) {
            tracing::debug!(subchart = %sub.name(), "subchart disabled");
            continue;
        }
        let name = dependency_name(sub, dependency);
        let sub_values = values
            .get(name)
            .cloned()
            .unwrap_or_else(|| JsonValue::Object(Map::new()));
        collect_scopes(sub, sub_values, format!("{}/charts/{}", path, name), out);
    }

    out.push(Scope {
        path,
        chart,
        values,
    });
}

/// Evaluate a dependency's `condition`, then its `tags`
fn is_enabled(dependency: Option<&ChartDependency>, values: &JsonValue) -> bool {
    let Some(dependency) = dependency else {
        return true;
    };

    for path in dependency.condition.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(JsonValue::Bool(enabled)) = lookup(values, path) {
            return *enabled;
        }
    }

    if dependency.tags.is_empty() {
        return true;
    }
    let tags: Vec<bool> = dependency
        .tags
        .iter()
        .filter_map(|tag| values.get("tags")?.get(tag)?.as_bool())
        .collect();
    tags.is_empty() || tags.contains(&true)
}

fn lookup<'v>(values: &'v JsonValue, path: &str) -> Option<&'v JsonValue> {
    path.split('.')
        .filter(|p| !p.is_empty())
        .try_fold(values, |current, key| current.get(key))
}

fn validate_schemas(scopes: &[Scope<'_>]) -> Result<()> {
    let mut report = String::new();

    for scope in scopes.iter().rev() {
        let Some(schema) = scope.chart.schema_json()? else {
            continue;
        };
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| RenderError::Schema(format!("{}:\n- invalid schema: {}\n", scope.chart.name(), e)))?;

        let errors: Vec<String> = validator
            .iter_errors(&scope.values)
            .map(|e| {
                let at = e.instance_path.to_string();
                if at.is_empty() {
                    format!("- (root): {}", e)
                } else {
                    format!("- {}: {}", at.trim_start_matches('/').replace('/', "."), e)
                }
            })
            .collect();

        if !errors.is_empty() {
            report.push_str(&format!("{}:\n{}\n", scope.chart.name(), errors.join("\n")));
        }
    }

    if report.is_empty() {
        Ok(())
    } else {
        Err(RenderError::Schema(report))
    }
}

fn template_name(scope: &Scope<'_>, file: &str) -> String {
    format!("{}/{}", scope.path, file)
}

/// Partials and NOTES.txt are never emitted
fn is_renderable(name: &str) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name);
    !base.starts_with('_') && base != "NOTES.txt"
}

fn release(options: &RenderOptions) -> Value {
    Value::map(Dict::from([
        ("Name".to_string(), Value::from(options.release_name.as_str())),
        ("Namespace".to_string(), Value::from(options.namespace.as_str())),
        ("Service".to_string(), Value::from("Helm")),
        ("IsInstall".to_string(), Value::Bool(true)),
        ("IsUpgrade".to_string(), Value::Bool(false)),
        ("Revision".to_string(), Value::Int(1)),
    ]))
}

fn capabilities(options: &RenderOptions) -> Result<Value> {
    let version = parse_version(&options.kube_version)?;
    let git_version = format!("v{}.{}.{}", version.major, version.minor, version.patch);

    let kube_version = Value::map(Dict::from([
        ("Version".to_string(), Value::from(git_version.as_str())),
        ("GitVersion".to_string(), Value::from(git_version.as_str())),
        ("Major".to_string(), Value::String(version.major.to_string())),
        ("Minor".to_string(), Value::String(version.minor.to_string())),
    ]));

    Ok(Value::map(Dict::from([
        ("KubeVersion".to_string(), kube_version),
        (
            "APIVersions".to_string(),
            Value::ApiVersions(Rc::new(options.api_versions.clone())),
        ),
        (
            "HelmVersion".to_string(),
            Value::map(Dict::from([("Version".to_string(), Value::from("v3"))])),
        ),
    ])))
}

/// `.Chart` with Go field names
fn chart_object(metadata: &ChartMetadata) -> Value {
    let maintainers = metadata
        .maintainers
        .iter()
        .map(|m| {
            Value::map(Dict::from([
                ("Name".to_string(), Value::from(m.name.as_str())),
                ("Email".to_string(), Value::from(m.email.as_str())),
                ("URL".to_string(), Value::from(m.url.as_str())),
            ]))
        })
        .collect();

    let dependencies = metadata
        .dependencies
        .iter()
        .map(|d| {
            Value::map(Dict::from([
                ("Name".to_string(), Value::from(d.name.as_str())),
                ("Version".to_string(), Value::from(d.version.as_str())),
                ("Repository".to_string(), Value::from(d.repository.as_str())),
                ("Condition".to_string(), Value::from(d.condition.as_str())),
                ("Tags".to_string(), string_list(&d.tags)),
                ("Alias".to_string(), Value::from(d.alias.as_str())),
            ]))
        })
        .collect();

    let annotations: Dict = metadata
        .annotations
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
        .collect();

    Value::map(Dict::from([
        ("Name".to_string(), Value::from(metadata.name.as_str())),
        ("Version".to_string(), Value::from(metadata.version.as_str())),
        ("AppVersion".to_string(), Value::from(metadata.app_version.as_str())),
        ("APIVersion".to_string(), Value::from(metadata.api_version.as_str())),
        ("Description".to_string(), Value::from(metadata.description.as_str())),
        ("Home".to_string(), Value::from(metadata.home.as_str())),
        ("Icon".to_string(), Value::from(metadata.icon.as_str())),
        ("KubeVersion".to_string(), Value::from(metadata.kube_version.as_str())),
        ("Type".to_string(), Value::from(metadata.chart_type.as_str())),
        ("Deprecated".to_string(), Value::Bool(metadata.deprecated)),
        ("Keywords".to_string(), string_list(&metadata.keywords)),
        ("Sources".to_string(), string_list(&metadata.sources)),
        ("Maintainers".to_string(), Value::List(maintainers)),
        ("Dependencies".to_string(), Value::List(dependencies)),
        ("Annotations".to_string(), Value::map(annotations)),
    ]))
}

fn string_list(items: &[String]) -> Value {
    Value::List(items.iter().map(|s| Value::from(s.as_str())).collect())
}

/// Template data shared by every template of a chart
fn base_data(scope: &Scope<'_>, release: &Value, capabilities: &Value) -> Dict {
    Dict::from([
        ("Values".to_string(), Value::from_json(&scope.values)),
        ("Release".to_string(), release.clone()),
        ("Chart".to_string(), chart_object(&scope.chart.metadata)),
        ("Capabilities".to_string(), capabilities.clone()),
        (
            "Files".to_string(),
            Value::Files(Rc::new(Files::new(scope.chart.files.clone()))),
        ),
    ])
}

fn with_template(base: &Dict, name: &str, chart_path: &str) -> Value {
    let mut data = base.clone();
    data.insert(
        "Template".to_string(),
        Value::map(Dict::from([
            ("Name".to_string(), Value::from(name)),
            (
                "BasePath".to_string(),
                Value::String(format!("{}/templates", chart_path)),
            ),
        ])),
    );
    Value::map(data)
}

fn split_documents(rendered: &str) -> impl Iterator<Item = &str> {
    DOCUMENT_SEPARATOR
        .split(rendered)
        .map(str::trim)
        .filter(|doc| !doc.is_empty())
}

/// Whether a rendered document belongs in the manifest; hooks are dropped
fn keep_document(template: &str, document: &str) -> Result<bool> {
    let parsed: serde_yaml::Value =
        serde_yaml::from_str(document).map_err(|e| RenderError::Yaml {
            template: template.to_string(),
            message: e.to_string(),
        })?;

    if parsed.is_null() {
        return Ok(false);
    }

    let is_hook = parsed
        .get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(|a| a.get("helm.sh/hook"))
        .is_some();
    if is_hook {
        tracing::debug!(template, "hook skipped");
    }
    Ok(!is_hook)
}
