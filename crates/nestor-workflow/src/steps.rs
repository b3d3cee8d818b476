//! Navigation along the project workflow

use nestor_core::ProjectConfig;

use crate::error::{Result, WorkflowError};

fn position(project: &ProjectConfig, step: &str) -> Result<usize> {
    project
        .workflow
        .iter()
        .position(|s| s == step)
        .ok_or_else(|| WorkflowError::StepNotExistingInWorkflow {
            step: step.to_string(),
        })
}

/// Step following `step`, `None` for the final one
pub fn get_next_step<'a>(project: &'a ProjectConfig, step: &str) -> Result<Option<&'a str>> {
    let index = position(project, step)?;
    Ok(project.workflow.get(index + 1).map(String::as_str))
}

/// Step preceding `step`, `None` for the trunk
pub fn get_previous_step<'a>(project: &'a ProjectConfig, step: &str) -> Result<Option<&'a str>> {
    let index = position(project, step)?;
    Ok(index
        .checked_sub(1)
        .and_then(|i| project.workflow.get(i))
        .map(String::as_str))
}
