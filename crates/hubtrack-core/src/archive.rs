//! Chart archive loading
//!
//! Loads a Helm chart from a gzipped tarball held in memory. The archive is
//! expected to contain a single top-level directory (the chart name) which
//! is stripped from every path.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::io::Read;
use tar::{Archive, Builder, Header};

use crate::chart::{API_VERSION_V1, Chart, ChartDependency, ChartFile, ChartMetadata};
use crate::error::{CoreError, Result};

/// Maximum size of all files in a decompressed chart
pub const MAX_DECOMPRESSED_CHART_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum size of a single file in a decompressed chart
pub const MAX_DECOMPRESSED_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Load a chart from the bytes of a `.tgz` archive
pub fn load_archive(data: &[u8]) -> Result<Chart> {
    let files = read_archive_files(data)?;
    load_files(files)
}

/// Read the regular files of a chart archive, stripping the top-level directory
pub fn read_archive_files(data: &[u8]) -> Result<Vec<ChartFile>> {
    let mut archive = Archive::new(GzDecoder::new(data));
    let mut files = Vec::new();
    let mut total: u64 = 0;

    let entries = archive
        .entries()
        .map_err(|e| CoreError::archive(format!("not a gzipped tarball: {}", e)))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| CoreError::archive(e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let raw_path = entry.path()?.to_string_lossy().replace('\\', "/");
        let Some(name) = strip_top_level(&raw_path)? else {
            continue;
        };

        let size = entry.header().size()?;
        if size > MAX_DECOMPRESSED_FILE_SIZE {
            return Err(CoreError::archive(format!(
                "decompressed chart file {:?} is larger than the maximum file size {}",
                name, MAX_DECOMPRESSED_FILE_SIZE
            )));
        }
        total += size;
        if total > MAX_DECOMPRESSED_CHART_SIZE {
            return Err(CoreError::archive(format!(
                "decompressed chart is larger than the maximum size {}",
                MAX_DECOMPRESSED_CHART_SIZE
            )));
        }

        let mut data = Vec::with_capacity(size as usize);
        entry.read_to_end(&mut data)?;
        files.push(ChartFile { name, data });
    }

    if files.is_empty() {
        return Err(CoreError::archive("no files in chart archive"));
    }

    Ok(files)
}

/// Strip the chart directory, rejecting paths that escape the chart root
fn strip_top_level(path: &str) -> Result<Option<String>> {
    if path.starts_with('/') {
        return Err(CoreError::archive(format!(
            "chart illegally contains absolute paths: {}",
            path
        )));
    }

    let parts: Vec<&str> = path
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    if parts.iter().any(|p| *p == "..") {
        return Err(CoreError::archive(
            "chart illegally references parent directory",
        ));
    }
    if parts.len() < 2 {
        return Ok(None);
    }

    Ok(Some(parts[1..].join("/")))
}

/// Build a chart from its files (paths relative to the chart root)
pub fn load_files(files: Vec<ChartFile>) -> Result<Chart> {
    let mut chart = Chart {
        values: JsonValue::Object(serde_json::Map::new()),
        ..Default::default()
    };
    let mut metadata: Option<ChartMetadata> = None;
    let mut requirements: Option<Vec<ChartDependency>> = None;
    let mut subchart_dirs: BTreeMap<String, Vec<ChartFile>> = BTreeMap::new();
    let mut subchart_archives: Vec<ChartFile> = Vec::new();

    for file in files {
        let name = file.name.clone();
        match name.as_str() {
            "Chart.yaml" => {
                let md: ChartMetadata = serde_yaml::from_slice(&file.data).map_err(|e| {
                    CoreError::archive(format!("cannot load Chart.yaml: {}", e))
                })?;
                metadata = Some(md);
            }
            "values.yaml" => {
                let values: Option<JsonValue> = serde_yaml::from_slice(&file.data).map_err(|e| {
                    CoreError::archive(format!("cannot load values.yaml: {}", e))
                })?;
                if let Some(values @ JsonValue::Object(_)) = values {
                    chart.values = values;
                }
            }
            "values.schema.json" => chart.schema = Some(file.data),
            "requirements.yaml" => {
                #[derive(serde::Deserialize)]
                struct Requirements {
                    #[serde(default)]
                    dependencies: Vec<ChartDependency>,
                }
                let reqs: Requirements = serde_yaml::from_slice(&file.data).map_err(|e| {
                    CoreError::archive(format!("cannot load requirements.yaml: {}", e))
                })?;
                requirements = Some(reqs.dependencies);
            }
            "Chart.lock" | "requirements.lock" => {}
            name if name.starts_with("templates/") => chart.templates.push(file),
            name if name.starts_with("charts/") => {
                let rest = &name["charts/".len()..];
                match rest.split_once('/') {
                    Some((dir, inner)) => {
                        subchart_dirs
                            .entry(dir.to_string())
                            .or_default()
                            .push(ChartFile::new(inner, file.data));
                    }
                    None if rest.ends_with(".tgz") || rest.ends_with(".tar.gz") => {
                        subchart_archives.push(file)
                    }
                    None => chart.files.push(file),
                }
            }
            _ => chart.files.push(file),
        }
    }

    chart.metadata = metadata.ok_or(CoreError::MissingChartYaml)?;
    if chart.metadata.api_version.is_empty() {
        chart.metadata.api_version = API_VERSION_V1.to_string();
    }
    if chart.metadata.api_version == API_VERSION_V1 && chart.metadata.dependencies.is_empty() {
        if let Some(deps) = requirements {
            chart.metadata.dependencies = deps;
        }
    }

    for archive in subchart_archives {
        let subchart = load_archive(&archive.data).map_err(|e| {
            CoreError::archive(format!("error unpacking subchart {}: {}", archive.name, e))
        })?;
        chart.dependencies.push(subchart);
    }
    for (dir, files) in subchart_dirs {
        let subchart = load_files(files).map_err(|e| {
            CoreError::archive(format!("error unpacking subchart {}: {}", dir, e))
        })?;
        chart.dependencies.push(subchart);
    }

    Ok(chart)
}

/// Write files into an in-memory `.tgz`, using paths as given
pub fn write_archive(files: &[ChartFile]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    for file in files {
        let mut header = Header::new_gnu();
        header.set_size(file.data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder.append_data(&mut header, &file.name, file.data.as_slice())?;
    }
    Ok(builder.into_inner()?.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tgz(files: Vec<ChartFile>) -> Vec<u8> {
        write_archive(&files).unwrap()
    }

    #[test]
    fn test_load_archive() {
        let subchart = tgz(vec![
            ChartFile::new("redis/Chart.yaml", "apiVersion: v2\nname: redis\nversion: 1.0.0\n"),
            ChartFile::new("redis/values.yaml", "port: 6379\n"),
        ]);
        let data = tgz(vec![
            ChartFile::new("app/Chart.yaml", "apiVersion: v2\nname: app\nversion: 0.1.0\n"),
            ChartFile::new("app/values.yaml", "image:\n  repository: nginx\n"),
            ChartFile::new("app/values.schema.json", "{\"type\": \"object\"}"),
            ChartFile::new("app/templates/deployment.yaml", "kind: Deployment\n"),
            ChartFile::new("app/templates/_helpers.tpl", "{{/* helpers */}}"),
            ChartFile::new("app/README.md", "# App"),
            ChartFile::new("app/crds/crd.yaml", "kind: CustomResourceDefinition\n"),
            ChartFile::new("app/charts/redis-1.0.0.tgz", subchart),
            ChartFile::new(
                "app/charts/common/Chart.yaml",
                "apiVersion: v2\nname: common\nversion: 2.0.0\ntype: library\n",
            ),
            ChartFile::new("app/charts/common/templates/_names.tpl", ""),
        ]);

        let chart = load_archive(&data).unwrap();
        assert_eq!(chart.name(), "app");
        assert_eq!(chart.values["image"]["repository"], "nginx");
        assert!(chart.schema.is_some());
        assert_eq!(chart.templates.len(), 2);
        assert_eq!(chart.file("README.md").unwrap().text(), "# App");
        assert_eq!(chart.crds().count(), 1);

        let mut names: Vec<_> = chart.dependencies.iter().map(|c| c.name().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["common", "redis"]);

        let redis = chart.dependencies.iter().find(|c| c.name() == "redis").unwrap();
        assert_eq!(redis.values["port"], 6379);

        let common = chart.dependencies.iter().find(|c| c.name() == "common").unwrap();
        assert!(common.is_library());
        assert_eq!(common.templates[0].name, "templates/_names.tpl");
    }

    #[test]
    fn test_v1_requirements() {
        let data = tgz(vec![
            ChartFile::new("old/Chart.yaml", "name: old\nversion: 1.0.0\n"),
            ChartFile::new(
                "old/requirements.yaml",
                "dependencies:\n  - name: mysql\n    version: 1.x\n    repository: https://example.com\n",
            ),
        ]);

        let chart = load_archive(&data).unwrap();
        assert_eq!(chart.metadata.api_version, "v1");
        assert_eq!(chart.metadata.dependencies.len(), 1);
        assert_eq!(chart.metadata.dependencies[0].name, "mysql");
    }

    #[test]
    fn test_missing_chart_yaml() {
        let data = tgz(vec![ChartFile::new("app/values.yaml", "a: 1\n")]);
        assert!(matches!(load_archive(&data), Err(CoreError::MissingChartYaml)));
    }

    #[test]
    fn test_not_an_archive() {
        assert!(load_archive(b"definitely not gzip").is_err());
    }

    #[test]
    fn test_strip_top_level() {
        assert_eq!(
            strip_top_level("app/templates/a.yaml").unwrap(),
            Some("templates/a.yaml".to_string())
        );
        assert_eq!(strip_top_level("app").unwrap(), None);
        assert!(strip_top_level("app/../../etc/passwd").is_err());
        assert!(strip_top_level("/etc/passwd").is_err());
    }
}
