//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error")]
    Template(#[from] TemplateError),

    #[error("Template \"{name}\" not found at {path}")]
    TemplateNotFound { name: String, path: String },

    #[error("Template \"{name}\" did not render a YAML mapping")]
    InvalidDocument { name: String },

    #[error("No cron configuration for process \"{process}\"")]
    MissingCron { process: String },

    #[error("Configuration error: {0}")]
    Config(#[from] nestor_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    SyntaxError,
    YamlParseError,
    Other,
}

impl TemplateErrorKind {
    pub fn to_code_string(&self) -> &'static str {
        match self {
            Self::UndefinedVariable => "undefined_variable",
            Self::SyntaxError => "syntax",
            Self::YamlParseError => "yaml_parse",
            Self::Other => "render",
        }
    }
}

/// Template-specific error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(nestor::template::render))]
pub struct TemplateError {
    pub message: String,

    pub kind: TemplateErrorKind,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Create a new template error from a MiniJinja error
    pub fn from_minijinja(err: minijinja::Error, template_name: &str, template_source: &str) -> Self {
        let kind = match err.kind() {
            minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
            minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
            _ => TemplateErrorKind::Other,
        };
        let message = err.to_string().replace("undefined value", "undefined variable");
        let span = err
            .line()
            .and_then(|line| calculate_span(template_source, line));
        let suggestion = match kind {
            TemplateErrorKind::UndefinedVariable => Some(format!(
                "template \"{}\" only receives its documented parameters",
                template_name
            )),
            _ => None,
        };

        Self {
            message,
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
            suggestion,
        }
    }

    /// Rendered output that is not valid YAML
    pub fn from_yaml(err: serde_yaml::Error, template_name: &str, rendered: &str) -> Self {
        let span = err
            .location()
            .and_then(|loc| calculate_span(rendered, loc.line()));

        Self {
            message: format!("rendered template is not valid YAML: {}", err),
            kind: TemplateErrorKind::YamlParseError,
            src: NamedSource::new(format!("{} (rendered)", template_name), rendered.to_string()),
            span,
            suggestion: Some("check indentation around interpolated values".to_string()),
        }
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

/// Calculate the span covering a 1-based line
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;

    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_span() {
        let source = "kind: Service\nmetadata:\n  name: {{ name }}\n";
        let span = calculate_span(source, 3).unwrap();
        assert_eq!(span.offset(), 24);
        assert_eq!(span.len(), 18);
        assert!(calculate_span(source, 10).is_none());
    }
}
