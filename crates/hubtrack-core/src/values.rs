//! Chart values with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Values tree of a chart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(Map::new()))
    }

    /// Deep merge another tree on top of this one
    ///
    /// Objects merge recursively, everything else in the overlay replaces
    /// the base.
    pub fn merge(&mut self, overlay: &JsonValue) {
        deep_merge(&mut self.0, overlay);
    }

    /// Values a subchart sees: its own subtree plus the parent's globals
    pub fn scope_for_subchart(&self, subchart_name: &str) -> Values {
        let mut scoped = Map::new();

        if let JsonValue::Object(parent) = &self.0 {
            if let Some(JsonValue::Object(sub)) = parent.get(subchart_name) {
                scoped.extend(sub.clone());
            }
            if let Some(global @ JsonValue::Object(_)) = parent.get("global") {
                let mut merged = scoped
                    .remove("global")
                    .filter(JsonValue::is_object)
                    .unwrap_or_else(|| JsonValue::Object(Map::new()));
                deep_merge(&mut merged, global);
                scoped.insert("global".to_string(), merged);
            }
        }

        Values(JsonValue::Object(scoped))
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        path.split('.')
            .filter(|p| !p.is_empty())
            .try_fold(&self.0, |current, key| current.as_object()?.get(key))
    }

    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_inner(self) -> JsonValue {
        self.0
    }
}

/// Recursively merge `overlay` into `base`
pub fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}
