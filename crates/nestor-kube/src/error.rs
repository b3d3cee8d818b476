//! Error types for nestor-kube

use thiserror::Error;

/// Result type for nestor-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// kubectl returned something that is not an object list
    #[error("unexpected kubectl output: {0}")]
    InvalidResponse(String),

    /// The cluster returned a kind the status extraction does not know
    #[error("unknown resource kind '{kind}'")]
    UnknownResourceKind { kind: String },

    /// A resource could not be decoded
    #[error("invalid {kind} '{name}': {message}")]
    InvalidResource {
        kind: String,
        name: String,
        message: String,
    },

    /// No kubectl context configured for the application
    #[error("app '{app}' has no cluster_name")]
    MissingCluster { app: String },

    /// Command or configuration failure
    #[error(transparent)]
    Core(#[from] nestor_core::CoreError),

    /// Manifest could not be built
    #[error(transparent)]
    Engine(#[from] nestor_engine::EngineError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}
