//! The `.Files` object
//!
//! Exposes the non-template files of a chart to templates:
//!
//! ```text
//! {{ .Files.Get "config/app.conf" }}
//! {{ (.Files.Glob "config/*").AsConfig | nindent 2 }}
//! {{ range .Files.Lines "hosts.txt" }}{{ . }}{{ end }}
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use glob::Pattern;
use hubtrack_core::ChartFile;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::{RenderError, Result};
use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct Files {
    files: Vec<ChartFile>,
}

impl Files {
    pub fn new(files: Vec<ChartFile>) -> Self {
        Self { files }
    }

    pub fn names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.name.as_str()).collect()
    }

    /// File content, empty when the file does not exist
    pub fn get(&self, name: &str) -> String {
        self.files
            .iter()
            .find(|f| f.name == name)
            .map(ChartFile::text)
            .unwrap_or_default()
    }

    /// Files whose path matches a glob pattern
    pub fn glob(&self, pattern: &str) -> Result<Files> {
        let pattern = Pattern::new(pattern)
            .map_err(|e| RenderError::function("Glob", e.to_string()))?;
        Ok(Files {
            files: self
                .files
                .iter()
                .filter(|f| pattern.matches(&f.name))
                .cloned()
                .collect(),
        })
    }

    pub fn lines(&self, name: &str) -> Vec<String> {
        let content = self.get(name);
        if content.is_empty() {
            return Vec::new();
        }
        content.split('\n').map(str::to_string).collect()
    }

    /// Files as a ConfigMap `data` block keyed by base name
    pub fn as_config(&self) -> String {
        self.as_map(|file| file.text())
    }

    /// Files as a Secret `data` block with base64 encoded content
    pub fn as_secrets(&self) -> String {
        self.as_map(|file| STANDARD.encode(&file.data))
    }

    fn as_map(&self, content: impl Fn(&ChartFile) -> String) -> String {
        if self.files.is_empty() {
            return String::new();
        }
        let map: BTreeMap<&str, String> = self
            .files
            .iter()
            .map(|f| (base_name(&f.name), content(f)))
            .collect();
        serde_yaml::to_string(&map)
            .map(|s| s.trim_end_matches('\n').to_string())
            .unwrap_or_default()
    }

    /// Dispatch a method call made from a template
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let name_arg = || -> Result<String> {
            args.first()
                .map(Value::to_str)
                .ok_or_else(|| RenderError::function(method, "missing file name"))
        };

        match method {
            "Get" | "GetBytes" => Ok(Value::String(self.get(&name_arg()?))),
            "Glob" => Ok(Value::Files(Rc::new(self.glob(&name_arg()?)?))),
            "Lines" => Ok(Value::List(
                self.lines(&name_arg()?).into_iter().map(Value::String).collect(),
            )),
            "AsConfig" => Ok(Value::String(self.as_config())),
            "AsSecrets" => Ok(Value::String(self.as_secrets())),
            other => Err(RenderError::function(
                other,
                "can't evaluate field in type chart.Files",
            )),
        }
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
