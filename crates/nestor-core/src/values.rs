//! Raw configuration documents with deep merge and `{{var}}` references

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

static REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid reference regex"));

/// Configuration document with deep merge capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse values from YAML string
    ///
    /// An empty document yields empty values.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        match value {
            JsonValue::Null => Ok(Self::new()),
            value => Ok(Self(value)),
        }
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Objects: recursive merge
    /// - Arrays: overlay replaces base (not appended)
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        path.split('.')
            .try_fold(&self.0, |value, key| value.as_object()?.get(key))
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Replace `{{key}}` references inside every string of the document
    ///
    /// `key` names a top-level entry. References to absent keys are left as
    /// written. References to entries that are not strings are collected and
    /// reported together, with the path of each offending string. A single
    /// pass is made, so replaced text is not resolved again.
    pub fn resolve_references(&mut self) -> Result<()> {
        let top_level = self.0.as_object().cloned().unwrap_or_default();
        let mut invalid = Vec::new();
        resolve_node(&mut self.0, &top_level, "CONFIG".to_string(), &mut invalid);

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidReferences { paths: invalid })
        }
    }
}

fn resolve_node(
    node: &mut JsonValue,
    top_level: &serde_json::Map<String, JsonValue>,
    path: String,
    invalid: &mut Vec<String>,
) {
    match node {
        JsonValue::Object(map) => {
            for (key, child) in map.iter_mut() {
                resolve_node(child, top_level, format!("{}.{}", path, key), invalid);
            }
        }
        JsonValue::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                resolve_node(child, top_level, format!("{}[{}]", path, index), invalid);
            }
        }
        JsonValue::String(text) => {
            let mut is_invalid = false;
            let replaced = REFERENCE_RE.replace_all(text, |caps: &Captures<'_>| {
                match top_level.get(&caps[1]) {
                    Some(JsonValue::String(value)) => value.clone(),
                    Some(_) => {
                        is_invalid = true;
                        caps[0].to_string()
                    }
                    None => caps[0].to_string(),
                }
            });
            if is_invalid {
                invalid.push(path);
            } else if let std::borrow::Cow::Owned(replaced) = replaced {
                *text = replaced;
            }
        }
        _ => {}
    }
}

/// Deep merge two JSON values
pub fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}
