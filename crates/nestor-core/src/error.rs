//! Core error types

use thiserror::Error;

/// A single schema violation with the path of the offending value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrorInfo {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Project configuration not found: {path}")]
    ProjectConfigNotFound { path: String },

    #[error("Configuration not found for app \"{app}\" ({path})")]
    AppConfigNotFound { app: String, path: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid workflow: {message}")]
    InvalidWorkflow { message: String },

    #[error("No registry matching \"{id}\"")]
    RegistryNotFound { id: String },

    #[error("No docker registry configured for app \"{app}\"")]
    MissingRegistry { app: String },

    #[error("Referenced variable should resolve to a string: {}", paths.join(", "))]
    InvalidReferences { paths: Vec<String> },

    #[error("Configuration does not match schema: {}", format_errors(errors))]
    SchemaValidation { errors: Vec<ValidationErrorInfo> },

    #[error("Invalid setting {name}={value}: {message}")]
    InvalidSetting {
        name: String,
        value: String,
        message: String,
    },

    #[error("Command `{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_errors(errors: &[ValidationErrorInfo]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, CoreError>;
