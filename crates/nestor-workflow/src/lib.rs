//! Nestor Workflow - Release workflow of the application fleet
//!
//! This crate provides:
//! - **Steps**: Navigation along the project workflow
//! - **Advance**: Promotion of applications from one step to the next
//! - **Init**: Creation and protection of workflow branches on the provider
//! - **Build**: Tagging, image build and publication of an application
//! - **Environment**: Private checkouts of the configuration repository

pub mod advance;
pub mod build;
pub mod environment;
pub mod error;
pub mod init;
pub mod steps;

pub use advance::{
    AdvanceWorkflowAppReport, AppReadiness, TaggedApp, TaggedAppOutcome, Workflow, WorkflowAdvanceStatus,
};
pub use build::{AppBuilder, BuiltImage, DEFAULT_APP_VERSION, get_version};
pub use environment::ConfigEnvironment;
pub use error::{Result, WorkflowError};
pub use init::{
    BranchReport, CreationStatus, InitReport, ProtectionStatus, WorkflowInitStatus, get_workflow_branches,
    init_workflow,
};
pub use steps::{get_next_step, get_previous_step};
