//! Template engine based on MiniJinja
//!
//! Templates are plain YAML files with `{{ param }}` interpolation, one per
//! Kubernetes resource kind. They receive a flat parameter mapping and their
//! output is parsed back into a structured document.

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{EngineError, Result, TemplateError};

/// Names of the templates every build needs
pub const TEMPLATE_NAMES: [&str; 8] = [
    "deployment",
    "service",
    "hpa",
    "anti-affinity-node",
    "anti-affinity-zone",
    "namespace",
    "cronjob",
    "job",
];

/// Templates loaded when present
pub const OPTIONAL_TEMPLATE_NAMES: [&str; 1] = ["ingress"];

const TEMPLATE_EXTENSION: &str = "yaml";

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict_mode: true }
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn build(self) -> Engine {
        Engine::new(self.strict_mode)
    }
}

/// The template engine
pub struct Engine {
    strict_mode: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Engine {
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        if self.strict_mode {
            env.set_undefined_behavior(UndefinedBehavior::Strict);
        } else {
            env.set_undefined_behavior(UndefinedBehavior::Lenient);
        }
        // Output is YAML, never HTML
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);

        env
    }

    /// Load `<dir>/<name>.yaml` for every required template
    pub fn load_templates(&self, dir: &Path) -> Result<TemplateSet> {
        let mut set = TemplateSet {
            env: self.create_environment(),
            sources: HashMap::new(),
        };

        for name in TEMPLATE_NAMES {
            let path = template_path(dir, name);
            if !path.is_file() {
                return Err(EngineError::TemplateNotFound {
                    name: name.to_string(),
                    path: path.display().to_string(),
                });
            }
            set.add(name, std::fs::read_to_string(&path)?)?;
        }

        for name in OPTIONAL_TEMPLATE_NAMES {
            let path = template_path(dir, name);
            if path.is_file() {
                set.add(name, std::fs::read_to_string(&path)?)?;
            }
        }

        tracing::debug!(dir = %dir.display(), count = set.sources.len(), "templates loaded");
        Ok(set)
    }

    /// Build a template set from in-memory sources
    pub fn templates_from_sources<I, N, S>(&self, sources: I) -> Result<TemplateSet>
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        let mut set = TemplateSet {
            env: self.create_environment(),
            sources: HashMap::new(),
        };
        for (name, source) in sources {
            set.add(name.into(), source.into())?;
        }
        Ok(set)
    }
}

fn template_path(dir: &Path, name: &str) -> std::path::PathBuf {
    dir.join(format!("{}.{}", name, TEMPLATE_EXTENSION))
}

/// Compiled templates keyed by name
pub struct TemplateSet {
    env: Environment<'static>,
    sources: HashMap<String, String>,
}

impl TemplateSet {
    fn add(&mut self, name: impl Into<String>, source: String) -> Result<()> {
        let name = name.into();
        self.env
            .add_template_owned(name.clone(), source.clone())
            .map_err(|e| TemplateError::from_minijinja(e, &name, &source))?;
        self.sources.insert(name, source);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Render a template to a YAML string
    pub fn render<P: Serialize>(&self, name: &str, params: &P) -> Result<String> {
        let source = self.sources.get(name).ok_or_else(|| EngineError::TemplateNotFound {
            name: name.to_string(),
            path: "<not loaded>".to_string(),
        })?;
        let template = self
            .env
            .get_template(name)
            .map_err(|e| TemplateError::from_minijinja(e, name, source))?;

        template
            .render(params)
            .map_err(|e| TemplateError::from_minijinja(e, name, source).into())
    }

    /// Render a template and parse the output into a YAML mapping
    pub fn render_document<P: Serialize>(&self, name: &str, params: &P) -> Result<JsonValue> {
        let rendered = self.render(name, params)?;
        let document: JsonValue = serde_yaml::from_str(&rendered)
            .map_err(|e| TemplateError::from_yaml(e, name, &rendered))?;

        if !document.is_object() {
            return Err(EngineError::InvalidDocument {
                name: name.to_string(),
            });
        }
        Ok(document)
    }
}
