//! Init command - create and protect workflow branches

use console::style;
use nestor_workflow::{BranchReport, WorkflowInitStatus};

use crate::context::Context;
use crate::error::{CliError, Result};

fn describe(report: &BranchReport) -> String {
    let created = match report.created {
        Some(c) if c.is_modified => "created",
        Some(_) => "existing",
        None => "not created",
    };
    let protected = match report.protected {
        Some(p) if p.is_modified => "protected",
        Some(_) => "already protected",
        None => "not protected",
    };
    format!("{}, {}", created, protected)
}

pub async fn run(context: &Context, organization: &str, app: &str) -> Result<()> {
    let (status, report) = context.init_workflow(organization, app).await?;

    println!("{}", style(format!("{}/{}", organization, app)).bold());
    if report.is_empty() {
        println!("  no workflow branch besides the trunk");
    }
    for (branch, entry) in &report {
        let icon = match (entry.created, entry.protected) {
            (Some(_), Some(_)) => style("✓").green(),
            _ => style("✗").red(),
        };
        println!("  {} {:<16} {}", icon, branch, style(describe(entry)).dim());
    }

    match status {
        WorkflowInitStatus::Success => Ok(()),
        WorkflowInitStatus::Fail => Err(CliError::workflow(format!(
            "Workflow initialization of {}/{} failed",
            organization, app
        ))),
    }
}
