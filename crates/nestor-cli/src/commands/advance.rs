//! Advance command - promote applications to the next workflow step

use console::style;
use nestor_workflow::{TaggedApp, WorkflowAdvanceStatus};

use crate::context::Context;
use crate::error::{CliError, Result};

/// Parse `app=tag` pairs
pub fn parse_tags(pairs: &[String]) -> Result<Vec<TaggedApp>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((app, tag)) if !app.is_empty() && !tag.is_empty() => Ok(TaggedApp {
                app: app.to_string(),
                tag: tag.to_string(),
            }),
            _ => Err(CliError::input(format!("Invalid --tag '{}', expected APP=TAG", pair))),
        })
        .collect()
}

fn finish(status: WorkflowAdvanceStatus, step: &str) -> Result<()> {
    match status {
        WorkflowAdvanceStatus::Success => Ok(()),
        WorkflowAdvanceStatus::Fail => Err(CliError::workflow(format!(
            "Workflow advance from \"{}\" failed for some applications",
            step
        ))),
    }
}

pub async fn run(context: &Context, step: &str, tags: &[String], json: bool) -> Result<()> {
    let tags = parse_tags(tags)?;

    if !tags.is_empty() {
        let (status, outcomes) = context.advance_tagged_apps(step, &tags).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        } else {
            for outcome in &outcomes {
                match (&outcome.error, &outcome.report) {
                    (Some(err), _) => println!(
                        "  {} {} {}",
                        style("✗").red(),
                        outcome.app,
                        style(err).red()
                    ),
                    (None, Some(report)) => println!(
                        "  {} {} {} → {}",
                        style("✓").green(),
                        outcome.app,
                        style(&outcome.tag).yellow(),
                        report.step
                    ),
                    (None, None) => println!(
                        "  {} {} {}",
                        style("-").dim(),
                        outcome.app,
                        style("already up to date").dim()
                    ),
                }
            }
        }
        return finish(status, step);
    }

    let (status, report) = context.advance_workflow(step).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_empty() {
        println!("Nothing to advance from {}", style(step).bold());
    } else {
        for entry in &report {
            println!(
                "  {} {} {} → {}",
                style("✓").green(),
                entry.name,
                style(&entry.tag).yellow(),
                entry.step
            );
        }
    }
    finish(status, step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        let tags = parse_tags(&["api=1.2.0".to_string(), "web=0.0.0-sha-abc1234".to_string()]).unwrap();
        assert_eq!(
            tags,
            vec![
                TaggedApp {
                    tag: "1.2.0".into(),
                    app: "api".into()
                },
                TaggedApp {
                    tag: "0.0.0-sha-abc1234".into(),
                    app: "web".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_invalid_tag() {
        assert!(parse_tags(&["api".to_string()]).is_err());
        assert!(parse_tags(&["=1.0.0".to_string()]).is_err());
    }
}
