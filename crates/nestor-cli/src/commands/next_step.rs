//! Next-step command - show where a workflow step promotes to

use console::style;
use nestor_core::{ConfigResolver, Settings};
use nestor_workflow::get_next_step;

use crate::error::Result;

pub fn run(settings: &Settings, step: &str) -> Result<()> {
    let resolver = ConfigResolver::from_settings(settings)?;
    let project = resolver.get_project_config()?;

    match get_next_step(&project, step)? {
        Some(next) => println!("{}", next),
        None => eprintln!("{} \"{}\" is the final step", style("note:").dim(), step),
    }
    Ok(())
}
