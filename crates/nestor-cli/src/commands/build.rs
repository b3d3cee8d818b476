//! Build command - tag, build and publish an application image

use console::style;

use crate::context::Context;
use crate::error::Result;

pub async fn run(context: &Context, app: &str) -> Result<()> {
    println!("{} Building {}", style("→").cyan(), style(app).bold());

    let built = context.build_app(app).await?;

    println!(
        "{} Published {} (tag {})",
        style("✓").green().bold(),
        style(&built.image).cyan(),
        style(&built.tag).yellow()
    );
    Ok(())
}
