//! CLI error types with exit code handling
//!
//! Errors from every library crate are folded into one type that knows
//! which exit code to report.

#![allow(dead_code)]

use miette::Diagnostic;
use nestor_core::CoreError;
use nestor_engine::EngineError;
use nestor_kube::KubeError;
use nestor_repo::RepoError;
use nestor_workflow::WorkflowError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Project or application configuration is missing or invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(nestor::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Manifest rendering failed
    #[error("Template error: {message}")]
    #[diagnostic(code(nestor::cli::template))]
    Template {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The command was given something it cannot work with
    #[error("{message}")]
    #[diagnostic(code(nestor::cli::input))]
    Input { message: String },

    /// Some applications could not be processed
    #[error("{message}")]
    #[diagnostic(code(nestor::cli::workflow))]
    Workflow {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(nestor::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(nestor::cli::error))]
    Other { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(nestor::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Template { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Input { .. } => exit_codes::USAGE_ERROR,
            CliError::Workflow { .. } => exit_codes::WORKFLOW_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a template error
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
            help: None,
        }
    }

    /// Create an input error (user provided invalid input)
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    /// Create a workflow failure
    pub fn workflow(message: impl Into<String>) -> Self {
        Self::Workflow {
            message: message.into(),
            help: Some("details of each failed application are in the logs".to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<miette::Report> for CliError {
    fn from(err: miette::Report) -> Self {
        CliError::Other {
            message: format!("{:?}", err),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::internal(err.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::internal(err.to_string())
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e.into(),
            CoreError::CommandFailed { .. } => CliError::Other {
                message: err.to_string(),
            },
            CoreError::ProjectConfigNotFound { .. } | CoreError::AppConfigNotFound { .. } => {
                CliError::config_with_help(
                    err.to_string(),
                    "point --config-path (or NESTOR_CONFIG_PATH) at the configuration repository",
                )
            }
            other => CliError::config(other.to_string()),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            // Keep the rendered diagnostic with its source snippet
            EngineError::Template(e) => CliError::template(format!("{:?}", miette::Report::new(e))),
            EngineError::TemplateNotFound { .. } => CliError::Template {
                message: err.to_string(),
                help: Some("every manifest template must exist in the templates directory".to_string()),
            },
            EngineError::Config(e) => e.into(),
            EngineError::Io(e) => e.into(),
            other => CliError::template(other.to_string()),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Core(e) => e.into(),
            KubeError::Engine(e) => e.into(),
            KubeError::Io(e) => e.into(),
            KubeError::MissingCluster { .. } => CliError::config(err.to_string()),
            other => CliError::Other {
                message: other.to_string(),
            },
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Core(e) => e.into(),
            RepoError::Io(e) => e.into(),
            RepoError::ProviderNotConfigured
            | RepoError::ProviderNotImplemented { .. }
            | RepoError::InvalidProviderUrl { .. } => CliError::config(err.to_string()),
            other => CliError::Other {
                message: other.to_string(),
            },
        }
    }
}

impl From<WorkflowError> for CliError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Core(e) => e.into(),
            WorkflowError::Repo(e) => e.into(),
            WorkflowError::AppListing { .. } => CliError::config(err.to_string()),
            WorkflowError::StepNotExistingInWorkflow { .. }
            | WorkflowError::FinalStep { .. }
            | WorkflowError::TagNotOnStep { .. } => {
                CliError::input(err.to_string())
            }
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
