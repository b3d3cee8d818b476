//! Deploy command - apply an application manifest and report the changes

use console::style;
use nestor_core::ConfigResolver;
use nestor_engine::{BuildOptions, Engine};
use nestor_kube::{Deployer, Diff, Kubectl};

use crate::context::Context;
use crate::error::Result;

fn print_section<T>(title: &str, diff: &Diff<T>, name: impl Fn(&T) -> &str) {
    if diff.is_empty() {
        return;
    }
    println!("{}", style(title).bold().underlined());
    for item in &diff.added {
        println!("  {} {}", style("+").green(), name(item));
    }
    for item in &diff.removed {
        println!("  {} {}", style("-").red(), name(item));
    }
    for modification in &diff.modified {
        println!("  {} {}", style("~").yellow(), modification.name);
        for (field, change) in &modification.values {
            println!(
                "      {}: {} → {}",
                field,
                style(&change.old).dim(),
                style(&change.new).cyan()
            );
        }
    }
}

pub async fn run(context: &Context, app: &str, tag: &str, output_json: bool) -> Result<()> {
    let settings = context.settings.as_ref();
    let resolver = ConfigResolver::from_settings(settings)?;
    let config = resolver.get_app_config(app)?;
    let templates = Engine::default().load_templates(&resolver.templates_dir())?;

    let deployer = Deployer::new(Kubectl::new(context.runner.clone(), settings), settings);
    let diff = deployer
        .deploy_app(&config, &templates, &BuildOptions::new(tag))
        .await?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
        return Ok(());
    }

    println!(
        "{} Deployed {} at {}",
        style("✓").green().bold(),
        style(app).bold(),
        style(tag).yellow()
    );
    if diff.is_empty() {
        println!("  no change");
        return Ok(());
    }
    print_section("PROCESSES", &diff.processes, |p| p.name.as_str());
    print_section("CRON JOBS", &diff.cronjobs, |c| c.name.as_str());
    print_section("ENVIRONMENT", &diff.env, |e| e.name.as_str());
    Ok(())
}
