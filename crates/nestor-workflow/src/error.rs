//! Error types for workflow operations

use thiserror::Error;

/// Result type for workflow operations
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Step \"{step}\" does not exist in the workflow")]
    StepNotExistingInWorkflow { step: String },

    #[error("Workflow is already in final step \"{step}\"")]
    FinalStep { step: String },

    #[error("Tag \"{tag}\" is not on step \"{step}\"")]
    TagNotOnStep { tag: String, step: String },

    #[error("Failed to list applications: {source}")]
    AppListing {
        #[source]
        source: nestor_core::CoreError,
    },

    #[error(transparent)]
    Repo(#[from] nestor_repo::RepoError),

    #[error(transparent)]
    Core(#[from] nestor_core::CoreError),
}
