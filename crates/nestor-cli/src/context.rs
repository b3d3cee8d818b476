//! Operations shared by the subcommands and the HTTP API
//!
//! Workflow operations run against a private checkout of the configuration
//! repository on the configured default branch.

use nestor_core::{CommandRunner, Settings, ShellRunner};
use nestor_repo::{PristineStore, RepositorySource, get_git_provider};
use nestor_workflow::{
    AdvanceWorkflowAppReport, AppBuilder, AppReadiness, BuiltImage, ConfigEnvironment, InitReport, Result, TaggedApp,
    TaggedAppOutcome, Workflow, WorkflowAdvanceStatus, WorkflowInitStatus,
};
use indexmap::IndexMap;
use std::sync::Arc;

/// Settings and collaborators of one Nestor process
#[derive(Clone)]
pub struct Context {
    pub settings: Arc<Settings>,
    pub runner: Arc<dyn CommandRunner>,
    pub repositories: Arc<dyn RepositorySource>,
}

impl Context {
    /// Real shell commands and pristine mirrors under `settings.pristine_path`
    pub fn new(settings: Settings) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new());
        let repositories = Arc::new(PristineStore::new(runner.clone(), &settings));
        Self {
            settings: Arc::new(settings),
            runner,
            repositories,
        }
    }

    async fn environment(&self) -> Result<ConfigEnvironment> {
        ConfigEnvironment::checkout(
            &self.settings,
            self.runner.as_ref(),
            &self.settings.config_default_branch,
        )
        .await
    }

    fn workflow(&self) -> Workflow {
        Workflow::new(self.runner.clone(), self.repositories.clone())
    }

    pub async fn init_workflow(&self, organization: &str, app: &str) -> Result<(WorkflowInitStatus, InitReport)> {
        let environment = self.environment().await?;
        let project = environment.resolver().get_project_config()?;
        let config = environment.resolver().get_app_config(app)?;
        let provider = get_git_provider(&project, &self.settings)?;

        Ok(nestor_workflow::init_workflow(
            organization,
            &config,
            &self.settings.git_master_tag,
            provider.as_ref(),
        )
        .await)
    }

    pub async fn advance_workflow(
        &self,
        current_step: &str,
    ) -> Result<(WorkflowAdvanceStatus, Vec<AdvanceWorkflowAppReport>)> {
        let environment = self.environment().await?;
        let project = environment.resolver().get_project_config()?;
        self.workflow()
            .advance_workflow(environment.resolver(), &project, current_step)
            .await
    }

    pub async fn advance_tagged_apps(
        &self,
        current_step: &str,
        tags: &[TaggedApp],
    ) -> Result<(WorkflowAdvanceStatus, Vec<TaggedAppOutcome>)> {
        let environment = self.environment().await?;
        let project = environment.resolver().get_project_config()?;
        self.workflow()
            .advance_tagged_apps(environment.resolver(), &project, current_step, tags)
            .await
    }

    /// Promotion state of every application into `step`
    ///
    /// Read from the default configuration branch, like every other workflow
    /// operation.
    pub async fn get_apps_ready_to_progress(&self, step: &str) -> Result<IndexMap<String, AppReadiness>> {
        let environment = self.environment().await?;
        let project = environment.resolver().get_project_config()?;
        self.workflow()
            .get_apps_ready_to_progress(environment.resolver(), &project, step)
            .await
    }

    pub async fn build_app(&self, app: &str) -> Result<BuiltImage> {
        let environment = self.environment().await?;
        let config = environment.resolver().get_app_config(app)?;
        AppBuilder::new(self.runner.clone(), self.repositories.clone())
            .build_app(&config)
            .await
    }
}
