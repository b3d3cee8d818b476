//! Configuration resolver
//!
//! Reads the configuration repository:
//!
//! ```text
//! config/
//!   project.yaml        # project-wide defaults, workflow
//!   apps/
//!     api.yaml          # one file per application
//!   templates/          # Kubernetes templates
//! ```

use indexmap::IndexMap;
use std::path::{Path, PathBuf};

use crate::config::{AppConfig, ProjectConfig};
use crate::error::{CoreError, Result};
use crate::exec::{CommandRunner, ShellCommand};
use crate::schema::AppSchemaValidator;
use crate::settings::Settings;
use crate::values::Values;
use crate::workspace;

const YAML_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

pub struct ConfigResolver {
    config_dir: PathBuf,
    settings: Settings,
    validator: AppSchemaValidator,
}

impl ConfigResolver {
    pub fn new(config_dir: impl Into<PathBuf>, settings: &Settings) -> Result<Self> {
        Ok(Self {
            config_dir: config_dir.into(),
            settings: settings.clone(),
            validator: AppSchemaValidator::new()?,
        })
    }

    /// Resolver over `settings.config_path`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.config_path.clone(), settings)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.settings.templates_path(&self.config_dir)
    }

    fn project_values(&self) -> Result<Values> {
        let path = self.settings.project_path(&self.config_dir);
        if !path.is_file() {
            return Err(CoreError::ProjectConfigNotFound {
                path: path.display().to_string(),
            });
        }
        Values::from_file(&path)
    }

    pub fn get_project_config(&self) -> Result<ProjectConfig> {
        let values = self.project_values()?;
        let project: ProjectConfig = serde_json::from_value(values.into_inner())?;
        project.validate()?;
        Ok(project)
    }

    fn app_path(&self, app_name: &str) -> Option<PathBuf> {
        let folder = self.settings.apps_path(&self.config_dir);
        YAML_EXTENSIONS
            .iter()
            .map(|ext| folder.join(format!("{}.{}", app_name, ext)))
            .find(|path| path.is_file())
    }

    /// Project defaults deep-merged with the application file, references
    /// resolved, before schema validation
    pub fn get_app_values(&self, app_name: &str) -> Result<Values> {
        let path = self
            .app_path(app_name)
            .ok_or_else(|| CoreError::AppConfigNotFound {
                app: app_name.to_string(),
                path: self
                    .settings
                    .apps_path(&self.config_dir)
                    .join(format!("{}.yaml", app_name))
                    .display()
                    .to_string(),
            })?;

        let mut values = self.project_values()?;
        values.merge(&Values::from_file(&path)?);
        values.resolve_references()?;
        Ok(values)
    }

    pub fn get_app_config(&self, app_name: &str) -> Result<AppConfig> {
        let values = self.get_app_values(app_name)?;
        self.validator.validate(values.inner())?;

        let config: AppConfig = serde_json::from_value(values.into_inner())?;
        config.validate()?;
        tracing::debug!(app = %config.app, "resolved application configuration");
        Ok(config)
    }

    /// Every application of the configuration, keyed by file name
    pub fn list_apps_config(&self) -> Result<IndexMap<String, AppConfig>> {
        let folder = self.settings.apps_path(&self.config_dir);
        let mut names: Vec<String> = std::fs::read_dir(&folder)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| YAML_EXTENSIONS.contains(&ext))
            })
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names.dedup();

        names
            .into_iter()
            .map(|name| {
                let config = self.get_app_config(&name)?;
                Ok((name, config))
            })
            .collect()
    }

    /// Switch the configuration repository to `branch`, discarding local changes
    pub async fn change_environment(&self, runner: &dyn CommandRunner, branch: &str) -> Result<()> {
        let git = |args: Vec<String>| {
            ShellCommand::new("git")
                .args(args)
                .current_dir(&self.config_dir)
        };

        runner.run(&git(vec!["stash".into()])).await?;
        runner.run(&git(vec!["fetch".into(), "origin".into()])).await?;
        runner.run(&git(vec!["checkout".into(), branch.to_string()])).await?;
        runner
            .run(&git(vec![
                "reset".into(),
                "--hard".into(),
                format!("origin/{}", branch),
            ]))
            .await?;

        tracing::info!(branch = %branch, "configuration environment changed");
        Ok(())
    }

    /// Copy the configuration repository into the work path
    ///
    /// The caller owns the returned directory.
    pub fn create_temporary_config_copy(&self) -> Result<PathBuf> {
        let destination = workspace::unique_path(&self.settings.work_path, "config");
        workspace::copy_dir(&self.config_dir, &destination)?;
        Ok(destination)
    }
}
