//! Nestor Kube - Kubernetes integration for Nestor
//!
//! This crate provides:
//! - **kubectl**: Resource fetch and manifest apply through a `CommandRunner`
//! - **Status**: Flat summary of an application's Deployments and CronJobs
//! - **Diff**: Added, modified and removed processes, cron jobs and variables
//! - **Deploy**: Render, apply and report what changed

pub mod deploy;
pub mod diff;
pub mod error;
pub mod kubectl;
pub mod status;

pub use deploy::{Deployer, MANIFEST_FILENAME};
pub use diff::{
    DeploymentStatusDiff, Diff, FieldChange, Modification, compare_fields, compute_diff,
    get_deployment_statuses_diff,
};
pub use error::{KubeError, Result};
pub use kubectl::{Kubectl, ResourceKind};
pub use status::{
    CronJobStatus, DeploymentStatus, EnvVarStatus, PROCESS_LABEL, ProcessStatus,
    get_deployment_status_from_items, get_deployment_status_from_response,
};
