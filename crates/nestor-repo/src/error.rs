//! Error types for repository operations

use thiserror::Error;

/// Git, Docker and git-provider errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Git Errors ============
    #[error("Invalid version tag \"{tag}\": {message}")]
    InvalidVersionTag { tag: String, message: String },

    // ============ Docker Errors ============
    #[error("Docker image {image} is not available locally")]
    ImageNotAvailable { image: String },

    // ============ Provider Errors ============
    #[error("No git provider configured in project.git.provider")]
    ProviderNotConfigured,

    #[error("Git provider \"{provider}\" is not implemented")]
    ProviderNotImplemented { provider: String },

    #[error("Git provider error: {status} - {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid git provider URL: {url} - {reason}")]
    InvalidProviderUrl { url: String, reason: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    // ============ Other ============
    #[error(transparent)]
    Core(#[from] nestor_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => RepoError::Provider {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => RepoError::NetworkError {
                message: e.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidProviderUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}
