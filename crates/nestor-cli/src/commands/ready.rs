//! Ready command - list applications with a pending promotion

use console::style;
use nestor_workflow::AppReadiness;

use crate::context::Context;
use crate::error::{CliError, Result};

pub async fn run(context: &Context, step: &str) -> Result<()> {
    let ready = context.get_apps_ready_to_progress(step).await?;

    println!("{}", style(format!("Promotion into {}", step)).bold());
    for (app, state) in &ready {
        match state {
            AppReadiness::Pending => println!("  {} {}", style("●").yellow(), app),
            AppReadiness::UpToDate => println!("  {} {} {}", style("✓").green(), app, style("up to date").dim()),
            AppReadiness::Unknown { error } => println!("  {} {} {}", style("✗").red(), app, style(error).red()),
        }
    }

    if ready.values().any(|state| matches!(state, AppReadiness::Unknown { .. })) {
        return Err(CliError::workflow(format!(
            "Readiness of some applications for \"{}\" is unknown",
            step
        )));
    }
    Ok(())
}
