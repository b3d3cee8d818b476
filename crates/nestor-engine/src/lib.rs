//! Nestor Engine - Kubernetes manifests from application configuration
//!
//! This crate provides:
//! - A MiniJinja-based loader for the per-kind resource templates
//! - The mutation pipeline turning rendered templates into complete resources
//! - Assembly of the ordered, `---` delimited manifest of an application

pub mod builders;
pub mod engine;
pub mod error;
pub mod manifest;

pub use builders::{BuildOptions, SanitizedNames};
pub use engine::{Engine, EngineBuilder, TemplateSet, TEMPLATE_NAMES};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use manifest::{ManifestBuilder, WEB_PROCESS_NAME, to_yaml_documents};
