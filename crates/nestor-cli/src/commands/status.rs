//! Status command - show what runs in the cluster for an application

use console::style;
use nestor_core::ConfigResolver;
use nestor_kube::{Deployer, Kubectl};

use crate::context::Context;
use crate::error::Result;

pub async fn run(context: &Context, app: &str, output_json: bool) -> Result<()> {
    let settings = context.settings.as_ref();
    let config = ConfigResolver::from_settings(settings)?.get_app_config(app)?;

    let deployer = Deployer::new(Kubectl::new(context.runner.clone(), settings), settings);
    let status = deployer.get_deployment_status(&config).await?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if status.is_empty() {
        println!("{} has nothing running", style(app).bold());
        return Ok(());
    }

    println!("{}", style("PROCESSES").bold().underlined());
    for process in &status.processes {
        println!(
            "  {:<20} {}",
            style(&process.name).cyan(),
            process.image.as_deref().unwrap_or("-")
        );
    }

    if !status.cronjobs.is_empty() {
        println!("\n{}", style("CRON JOBS").bold().underlined());
        for cronjob in &status.cronjobs {
            println!(
                "  {:<20} {:<16} {}",
                style(&cronjob.name).cyan(),
                cronjob.schedule.as_deref().unwrap_or("-"),
                cronjob.image.as_deref().unwrap_or("-")
            );
        }
    }

    if !status.env.is_empty() {
        println!("\n{}", style("ENVIRONMENT").bold().underlined());
        for var in &status.env {
            match &var.value {
                Some(value) => println!("  {}={}", var.name, value),
                None => println!("  {} {}", var.name, style("(from secret)").dim()),
            }
        }
    }

    Ok(())
}
