//! Template command - render the manifest of an application locally

use console::style;
use nestor_core::{ConfigResolver, Settings};
use nestor_engine::{BuildOptions, Engine, ManifestBuilder, WEB_PROCESS_NAME};

use crate::error::Result;

pub fn run(
    settings: &Settings,
    app: &str,
    tag: &str,
    branch: Option<&str>,
    ingress: bool,
    debug: bool,
) -> Result<()> {
    let resolver = ConfigResolver::from_settings(settings)?;
    let config = resolver.get_app_config(app)?;

    let templates_dir = resolver.templates_dir();
    let templates = Engine::default().load_templates(&templates_dir)?;
    if debug {
        eprintln!(
            "{} Loaded templates from {}",
            style("DEBUG").dim(),
            templates_dir.display()
        );
    }

    let mut options = BuildOptions::new(tag);
    if let Some(branch) = branch {
        options = options.with_branch(branch);
    }

    let builder = ManifestBuilder::new(&config, &templates, settings);

    if ingress && config.has_process(WEB_PROCESS_NAME) {
        if let Some(yaml) = builder.build_ingress_yaml(WEB_PROCESS_NAME)? {
            print!("{}", yaml);
        }
    }
    print!("{}", builder.build_deployment_yaml(&options)?);

    Ok(())
}
