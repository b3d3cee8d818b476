//! Nestor - deployment orchestrator for a fleet of applications

use clap::{Parser, Subcommand};
use nestor_core::Settings;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod api;
mod commands;
mod context;
mod error;
mod exit_codes;

use context::Context;
use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "nestor")]
#[command(author = "Nestor Contributors")]
#[command(version)]
#[command(about = "Build images, advance release workflows and deploy applications to Kubernetes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Default log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Configuration repository directory
    #[arg(long, global = true, env = "NESTOR_CONFIG_PATH")]
    config_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:4000")]
        listen: SocketAddr,
    },

    /// Promote every application from a workflow step to the next one
    Advance {
        /// Step to advance from
        step: String,

        /// Promote only these applications, as app=tag
        #[arg(long = "tag", value_name = "APP=TAG")]
        tags: Vec<String>,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List applications waiting to be promoted into a workflow step
    Ready {
        /// Step the applications would be promoted into
        step: String,
    },

    /// Create and protect the workflow branches of an application
    Init {
        /// Organization owning the repository
        organization: String,

        /// Application name
        app: String,
    },

    /// Tag, build and publish the image of an application
    Build {
        /// Application name
        app: String,
    },

    /// Render the Kubernetes manifest of an application
    Template {
        /// Application name
        app: String,

        /// Image tag to deploy
        #[arg(short, long)]
        tag: String,

        /// Use this branch as image tag instead of --tag
        #[arg(short, long)]
        branch: Option<String>,

        /// Also render the web ingress
        #[arg(long)]
        ingress: bool,
    },

    /// Apply the manifest of an application and show what changed
    Deploy {
        /// Application name
        app: String,

        /// Image tag to deploy
        #[arg(short, long)]
        tag: String,

        /// Output the diff as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what runs in the cluster for an application
    Status {
        /// Application name
        app: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the step following a workflow step
    NextStep {
        /// Current step
        step: String,
    },
}

fn init_tracing(debug: bool, level: &str) {
    let level = if debug { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn load_settings(config_path: Option<PathBuf>) -> Result<Settings> {
    let settings = Settings::from_env()?;
    Ok(match config_path {
        Some(path) => settings.with_config_path(path),
        None => settings,
    })
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config_path)?;

    match cli.command {
        Commands::Serve { listen } => api::serve(Context::new(settings), listen).await,

        Commands::Advance { step, tags, json } => {
            commands::advance::run(&Context::new(settings), &step, &tags, json).await
        }

        Commands::Ready { step } => commands::ready::run(&Context::new(settings), &step).await,

        Commands::Init { organization, app } => {
            commands::init::run(&Context::new(settings), &organization, &app).await
        }

        Commands::Build { app } => commands::build::run(&Context::new(settings), &app).await,

        Commands::Template {
            app,
            tag,
            branch,
            ingress,
        } => commands::template::run(&settings, &app, &tag, branch.as_deref(), ingress, cli.debug),

        Commands::Deploy { app, tag, json } => {
            commands::deploy::run(&Context::new(settings), &app, &tag, json).await
        }

        Commands::Status { app, json } => commands::status::run(&Context::new(settings), &app, json).await,

        Commands::NextStep { step } => commands::next_step::run(&settings, &step),
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug, &cli.log_level);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_advance_with_tags() {
        let cli = Cli::try_parse_from(["nestor", "advance", "staging", "--tag", "api=1.2.0", "--tag", "web=0.3.1"])
            .unwrap();
        match cli.command {
            Commands::Advance { step, tags, json } => {
                assert_eq!(step, "staging");
                assert_eq!(tags, vec!["api=1.2.0", "web=0.3.1"]);
                assert!(!json);
            }
            _ => panic!("expected the advance command"),
        }
    }

    #[test]
    fn test_config_path_is_global() {
        let cli = Cli::try_parse_from(["nestor", "next-step", "master", "--config-path", "/srv/config"]).unwrap();
        assert_eq!(cli.config_path, Some(PathBuf::from("/srv/config")));
    }
}
