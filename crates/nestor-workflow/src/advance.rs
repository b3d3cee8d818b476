//! Workflow advancement
//!
//! Promotion of an application from one step to the next is a git
//! reconciliation on its repository: when the last tag of the current step
//! is not what the next step's branch points at, the next branch is rebased
//! onto that tag and pushed.

use indexmap::IndexMap;
use nestor_core::{AppConfig, CommandRunner, ConfigResolver, Process, ProjectConfig};
use nestor_repo::{Git, ORIGIN, RepositorySource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, WorkflowError};
use crate::steps::{get_next_step, get_previous_step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowAdvanceStatus {
    Success,
    Fail,
}

/// One application promoted to `step`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceWorkflowAppReport {
    pub name: String,
    pub tag: String,
    pub step: String,
    pub processes: Vec<Process>,
    pub cron_jobs: Vec<Process>,
}

impl AdvanceWorkflowAppReport {
    fn new(config: &AppConfig, tag: &str, step: &str) -> Self {
        Self {
            name: config.app.clone(),
            tag: tag.to_string(),
            step: step.to_string(),
            processes: config.get_processes().into_iter().cloned().collect(),
            cron_jobs: config.get_cronjobs().into_iter().cloned().collect(),
        }
    }
}

/// A tag to promote for one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedApp {
    pub tag: String,
    pub app: String,
}

/// Outcome of a targeted promotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedAppOutcome {
    pub app: String,
    pub tag: String,
    pub status: WorkflowAdvanceStatus,

    /// Set when the application moved; absent when it was already up to date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<AdvanceWorkflowAppReport>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Whether an application's promotion into a step is pending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum AppReadiness {
    Pending,
    UpToDate,
    /// Its repository could not be inspected
    Unknown { error: String },
}

/// What is known about an application while it is being advanced, for logs
#[derive(Debug, Default)]
struct AdvanceContext {
    working_directory: Option<PathBuf>,
    tag: Option<String>,
    ready: bool,
}

pub struct Workflow {
    git: Git,
    repositories: Arc<dyn RepositorySource>,
}

impl Workflow {
    pub fn new(runner: Arc<dyn CommandRunner>, repositories: Arc<dyn RepositorySource>) -> Self {
        Self {
            git: Git::new(runner),
            repositories,
        }
    }

    /// Whether the last tag of `current_step` still has to reach `next_step`
    ///
    /// Returns the readiness and that tag. An application whose next branch
    /// does not exist yet is always ready.
    pub async fn get_app_progress_report(
        &self,
        repo: &Path,
        current_step: &str,
        next_step: &str,
    ) -> Result<(bool, String)> {
        self.git.branch(repo, current_step).await?;
        let last_tag = self.git.get_last_tag(repo).await?;
        let ready = self.is_tag_ahead(repo, &last_tag, next_step).await?;
        Ok((ready, last_tag))
    }

    async fn is_tag_ahead(&self, repo: &Path, tag: &str, next_step: &str) -> Result<bool> {
        if !self.git.is_branch_existing(repo, next_step).await? {
            return Ok(true);
        }
        let tag_hash = self.git.get_commit_hash_from_tag(repo, tag).await?;
        let next_reference = format!("{}/{}", ORIGIN, next_step);
        let next_hash = self
            .git
            .get_last_commit_hash(repo, Some(&next_reference))
            .await?;
        Ok(tag_hash != next_hash)
    }

    /// Promote one application, returning its report when it moved
    ///
    /// Without `requested_tag` the last tag of `current_step` is promoted.
    async fn advance_app(
        &self,
        config: &AppConfig,
        current_step: &str,
        next_step: &str,
        requested_tag: Option<&str>,
        context: &mut AdvanceContext,
    ) -> Result<Option<AdvanceWorkflowAppReport>> {
        let copy = self.repositories.create_working_repository(config).await?;
        let repo = copy.path();
        context.working_directory = Some(repo.to_path_buf());

        let (ready, tag) = match requested_tag {
            None => self.get_app_progress_report(repo, current_step, next_step).await?,
            Some(tag) => {
                self.git.branch(repo, current_step).await?;
                if !self.git.is_ancestor(repo, tag, current_step).await? {
                    return Err(WorkflowError::TagNotOnStep {
                        tag: tag.to_string(),
                        step: current_step.to_string(),
                    });
                }
                (self.is_tag_ahead(repo, tag, next_step).await?, tag.to_string())
            }
        };
        context.tag = Some(tag.clone());
        context.ready = ready;

        if !ready {
            tracing::info!(
                app = %config.app,
                tag = %tag,
                current_step = %current_step,
                next_step = %next_step,
                "app is already up-to-date, skipping"
            );
            return Ok(None);
        }

        tracing::info!(
            app = %config.app,
            tag = %tag,
            current_step = %current_step,
            next_step = %next_step,
            "advancing to the next workflow step"
        );
        self.git.branch(repo, next_step).await?;
        self.git.rebase(repo, current_step, Some(&tag)).await?;
        self.git.push(repo, next_step).await?;

        Ok(Some(AdvanceWorkflowAppReport::new(config, &tag, next_step)))
    }

    fn log_failure(app: &str, current_step: &str, next_step: &str, context: &AdvanceContext, err: &WorkflowError) {
        tracing::error!(
            app = %app,
            working_directory = ?context.working_directory,
            tag = ?context.tag,
            ready = context.ready,
            current_step = %current_step,
            next_step = %next_step,
            err = %err,
            "error while advancing the workflow"
        );
    }

    /// Advance every configured application from `current_step`
    ///
    /// A failing application marks the run as failed without stopping the
    /// others. A final step or an unreadable application list stops the run.
    pub async fn advance_workflow(
        &self,
        resolver: &ConfigResolver,
        project: &ProjectConfig,
        current_step: &str,
    ) -> Result<(WorkflowAdvanceStatus, Vec<AdvanceWorkflowAppReport>)> {
        let next_step = get_next_step(project, current_step)?.ok_or_else(|| WorkflowError::FinalStep {
            step: current_step.to_string(),
        })?;

        let apps = resolver.list_apps_config().map_err(|source| {
            tracing::error!(err = %source, "error while listing applications");
            WorkflowError::AppListing { source }
        })?;

        let mut status = WorkflowAdvanceStatus::Success;
        let mut report = Vec::new();

        for (name, config) in &apps {
            let mut context = AdvanceContext::default();
            match self
                .advance_app(config, current_step, next_step, None, &mut context)
                .await
            {
                Ok(Some(entry)) => report.push(entry),
                Ok(None) => {}
                Err(err) => {
                    Self::log_failure(name, current_step, next_step, &context, &err);
                    status = WorkflowAdvanceStatus::Fail;
                }
            }
        }

        Ok((status, report))
    }

    /// Promote the given tags of the given applications from `current_step`
    ///
    /// Each entry gets an outcome; unknown applications fail individually.
    pub async fn advance_tagged_apps(
        &self,
        resolver: &ConfigResolver,
        project: &ProjectConfig,
        current_step: &str,
        tags: &[TaggedApp],
    ) -> Result<(WorkflowAdvanceStatus, Vec<TaggedAppOutcome>)> {
        let next_step = get_next_step(project, current_step)?.ok_or_else(|| WorkflowError::FinalStep {
            step: current_step.to_string(),
        })?;

        let mut status = WorkflowAdvanceStatus::Success;
        let mut outcomes = Vec::with_capacity(tags.len());

        for TaggedApp { tag, app } in tags {
            let mut context = AdvanceContext::default();
            let result = match resolver.get_app_config(app) {
                Ok(config) => {
                    self.advance_app(&config, current_step, next_step, Some(tag.as_str()), &mut context)
                        .await
                }
                Err(err) => Err(err.into()),
            };

            let outcome = match result {
                Ok(report) => TaggedAppOutcome {
                    app: app.clone(),
                    tag: tag.clone(),
                    status: WorkflowAdvanceStatus::Success,
                    report,
                    error: None,
                },
                Err(err) => {
                    Self::log_failure(app, current_step, next_step, &context, &err);
                    status = WorkflowAdvanceStatus::Fail;
                    TaggedAppOutcome {
                        app: app.clone(),
                        tag: tag.clone(),
                        status: WorkflowAdvanceStatus::Fail,
                        report: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        Ok((status, outcomes))
    }

    /// Promotion state of every application into `step`, by name
    ///
    /// Every application is pending for the trunk. An application whose
    /// repository cannot be inspected is reported without stopping the query.
    pub async fn get_apps_ready_to_progress(
        &self,
        resolver: &ConfigResolver,
        project: &ProjectConfig,
        step: &str,
    ) -> Result<IndexMap<String, AppReadiness>> {
        let previous_step = get_previous_step(project, step)?;
        let apps = resolver
            .list_apps_config()
            .map_err(|source| WorkflowError::AppListing { source })?;

        let mut readiness = IndexMap::new();
        for (name, config) in &apps {
            let state = match previous_step {
                None => AppReadiness::Pending,
                Some(previous_step) => match self.is_app_pending(config, previous_step, step).await {
                    Ok(true) => AppReadiness::Pending,
                    Ok(false) => AppReadiness::UpToDate,
                    Err(err) => {
                        tracing::error!(app = %name, step = %step, err = %err, "error while checking readiness");
                        AppReadiness::Unknown { error: err.to_string() }
                    }
                },
            };
            readiness.insert(name.clone(), state);
        }
        Ok(readiness)
    }

    async fn is_app_pending(&self, config: &AppConfig, previous_step: &str, step: &str) -> Result<bool> {
        let copy = self.repositories.create_working_repository(config).await?;
        let (ready, _) = self.get_app_progress_report(copy.path(), previous_step, step).await?;
        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nestor_core::{MockRunner, Settings};
    use nestor_repo::WorkingCopy;
    use tempfile::TempDir;

    /// Working copies at `<root>/<app>`, so commands can be scripted per app
    struct FixedSource {
        root: PathBuf,
    }

    #[async_trait]
    impl RepositorySource for FixedSource {
        async fn create_working_repository(&self, config: &AppConfig) -> nestor_repo::Result<WorkingCopy> {
            let path = self.root.join(&config.app);
            std::fs::create_dir_all(&path)?;
            Ok(WorkingCopy::new(path))
        }
    }

    struct Fixture {
        _root: TempDir,
        repos: PathBuf,
        resolver: ConfigResolver,
        project: ProjectConfig,
        runner: MockRunner,
        workflow: Workflow,
    }

    impl Fixture {
        fn repo(&self, app: &str) -> PathBuf {
            self.repos.join(app)
        }
    }

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn fixture(apps: &[&str]) -> Fixture {
        let root = TempDir::new().unwrap();
        let config = root.path().join("config");
        write(&config, "project.yaml", "workflow: [master, staging, production]\n");
        for app in apps {
            write(
                &config,
                &format!("apps/{}.yaml", app),
                &format!(
                    "app: {app}\ngit:\n  origin: git@github.com:acme/{app}.git\nprocesses:\n  - name: web\n    start_command: ./web\n  - name: nightly\n    start_command: ./nightly\n    is_cronjob: true\ncrons:\n  nightly:\n    schedule: \"0 3 * * *\"\n"
                ),
            );
        }

        let resolver = ConfigResolver::new(&config, &Settings::default()).unwrap();
        let project = resolver.get_project_config().unwrap();
        let repos = root.path().join("repos");
        let runner = MockRunner::new();
        let workflow = Workflow::new(
            Arc::new(runner.clone()),
            Arc::new(FixedSource { root: repos.clone() }),
        );

        Fixture {
            _root: root,
            repos,
            resolver,
            project,
            runner,
            workflow,
        }
    }

    /// `app` has a `staging` branch whose head is `staging_head`, and its
    /// master's last tag points at `tag_commit`
    fn script_existing(f: &Fixture, app: &str, tag: &str, tag_commit: &str, staging_head: &str) {
        let repo = f.repo(app);
        f.runner
            .on_in(&repo, "git branch --all --list master origin/master", "* master")
            .on_in(&repo, "git branch --all --list staging origin/staging", "  remotes/origin/staging")
            .on_in(&repo, "git describe --always --abbrev=0", tag)
            .on_in(&repo, &format!("git rev-list -n 1 {}", tag), tag_commit)
            .on_in(&repo, "git rev-parse origin/staging", staging_head);
    }

    #[tokio::test]
    async fn test_ready_when_next_branch_is_missing() {
        let f = fixture(&["api"]);
        let repo = f.repo("api");
        f.runner.on_in(&repo, "git describe --always --abbrev=0", "1.0.0-sha-aaaaaaa");

        let (ready, tag) = f
            .workflow
            .get_app_progress_report(&repo, "master", "staging")
            .await
            .unwrap();

        assert!(ready);
        assert_eq!(tag, "1.0.0-sha-aaaaaaa");
        assert!(!f.runner.lines().iter().any(|l| l.starts_with("git rev-list")));
    }

    #[tokio::test]
    async fn test_readiness_compares_tag_with_next_head() {
        let f = fixture(&["api"]);
        script_existing(&f, "api", "1.0.0-sha-aaaaaaa", "aaaa", "aaaa");
        let repo = f.repo("api");

        let (ready, _) = f
            .workflow
            .get_app_progress_report(&repo, "master", "staging")
            .await
            .unwrap();
        assert!(!ready);

        f.runner.on_in(&repo, "git rev-parse origin/staging", "bbbb");
        let (ready, _) = f
            .workflow
            .get_app_progress_report(&repo, "master", "staging")
            .await
            .unwrap();
        assert!(ready);
    }

    #[tokio::test]
    async fn test_advance_workflow() {
        let f = fixture(&["api", "web", "worker"]);

        // api: never deployed to staging
        f.runner
            .on_in(f.repo("api"), "git branch --all --list master origin/master", "* master")
            .on_in(f.repo("api"), "git describe --always --abbrev=0", "1.1.0-sha-aaaaaaa");
        // web: staging already at the tagged commit
        script_existing(&f, "web", "2.0.0-sha-bbbbbbb", "bbbb", "bbbb");
        // worker: new tag, push rejected
        script_existing(&f, "worker", "3.0.0-sha-ccccccc", "cccc", "old");
        f.runner.fail_in(
            f.repo("worker"),
            "git push origin staging --tags --follow-tags",
            "rejected",
        );

        let (status, report) = f
            .workflow
            .advance_workflow(&f.resolver, &f.project, "master")
            .await
            .unwrap();

        assert_eq!(status, WorkflowAdvanceStatus::Fail);
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].name, "api");
        assert_eq!(report[0].tag, "1.1.0-sha-aaaaaaa");
        assert_eq!(report[0].step, "staging");
        assert_eq!(report[0].processes.len(), 1);
        assert_eq!(report[0].cron_jobs[0].name, "nightly");

        assert_eq!(
            f.runner.lines_in(f.repo("api")),
            vec![
                "git branch --all --list master origin/master",
                "git checkout master",
                "git describe --always --abbrev=0",
                "git branch --all --list staging origin/staging",
                "git branch --all --list staging origin/staging",
                "git checkout -b staging",
                "git rebase --keep-empty --onto 1.1.0-sha-aaaaaaa master",
                "git push origin staging --tags --follow-tags",
            ]
        );
        assert!(!f.runner.lines_in(f.repo("web")).iter().any(|l| l.starts_with("git rebase")));
        assert!(f
            .runner
            .lines_in(f.repo("worker"))
            .contains(&"git rebase --keep-empty --onto 3.0.0-sha-ccccccc master".to_string()));

        // working copies are released
        assert_eq!(std::fs::read_dir(&f.repos).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let f = fixture(&["api"]);
        script_existing(&f, "api", "1.0.0-sha-aaaaaaa", "aaaa", "old");

        let (_, first) = f
            .workflow
            .advance_workflow(&f.resolver, &f.project, "master")
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // the push moved staging onto the tag
        f.runner.on_in(f.repo("api"), "git rev-parse origin/staging", "aaaa");
        f.runner.clear_calls();

        let (status, second) = f
            .workflow
            .advance_workflow(&f.resolver, &f.project, "master")
            .await
            .unwrap();
        assert_eq!(status, WorkflowAdvanceStatus::Success);
        assert!(second.is_empty());
        assert!(!f.runner.lines().iter().any(|l| l.starts_with("git rebase") || l.starts_with("git push")));
    }

    #[tokio::test]
    async fn test_final_step_stops_the_run() {
        let f = fixture(&["api"]);
        let err = f
            .workflow
            .advance_workflow(&f.resolver, &f.project, "production")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::FinalStep { .. }));
        assert!(f.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_stops_the_run() {
        let f = fixture(&["api"]);
        write(f.resolver.config_dir(), "apps/broken.yaml", "app: [not, a, name]\n");

        let err = f
            .workflow
            .advance_workflow(&f.resolver, &f.project, "master")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::AppListing { .. }));
        assert!(f.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_advance_tagged_apps() {
        let f = fixture(&["api", "web"]);
        script_existing(&f, "api", "1.0.0-sha-aaaaaaa", "aaaa", "old");
        f.runner
            .on_in(f.repo("api"), "git rev-list -n 1 0.9.0-sha-fffffff", "ffff");

        let tags = vec![
            TaggedApp {
                tag: "0.9.0-sha-fffffff".into(),
                app: "api".into(),
            },
            TaggedApp {
                tag: "1.0.0".into(),
                app: "unknown".into(),
            },
        ];

        let (status, outcomes) = f
            .workflow
            .advance_tagged_apps(&f.resolver, &f.project, "master", &tags)
            .await
            .unwrap();

        assert_eq!(status, WorkflowAdvanceStatus::Fail);
        assert_eq!(outcomes[0].status, WorkflowAdvanceStatus::Success);
        assert_eq!(outcomes[0].report.as_ref().unwrap().tag, "0.9.0-sha-fffffff");
        assert!(f
            .runner
            .was_called("git rebase --keep-empty --onto 0.9.0-sha-fffffff master"));
        assert_eq!(outcomes[1].status, WorkflowAdvanceStatus::Fail);
        assert!(outcomes[1].error.is_some());
    }

    #[tokio::test]
    async fn test_tag_from_another_branch_is_rejected() {
        let f = fixture(&["api"]);
        script_existing(&f, "api", "1.0.0-sha-aaaaaaa", "aaaa", "old");
        f.runner.fail_in(
            f.repo("api"),
            "git merge-base --is-ancestor 9.9.9-sha-feature master",
            "",
        );

        let tags = vec![TaggedApp {
            tag: "9.9.9-sha-feature".into(),
            app: "api".into(),
        }];
        let (status, outcomes) = f
            .workflow
            .advance_tagged_apps(&f.resolver, &f.project, "master", &tags)
            .await
            .unwrap();

        assert_eq!(status, WorkflowAdvanceStatus::Fail);
        assert_eq!(outcomes[0].status, WorkflowAdvanceStatus::Fail);
        assert!(outcomes[0].error.as_deref().unwrap().contains("not on step \"master\""));
        assert!(!f
            .runner
            .lines_in(f.repo("api"))
            .iter()
            .any(|l| l.starts_with("git rebase") || l.starts_with("git push")));
    }

    #[tokio::test]
    async fn test_get_apps_ready_to_progress() {
        let f = fixture(&["api", "web"]);
        script_existing(&f, "api", "1.0.0-sha-aaaaaaa", "aaaa", "aaaa");
        script_existing(&f, "web", "1.0.0-sha-bbbbbbb", "bbbb", "old");

        let ready = f
            .workflow
            .get_apps_ready_to_progress(&f.resolver, &f.project, "staging")
            .await
            .unwrap();
        assert_eq!(ready.get("api"), Some(&AppReadiness::UpToDate));
        assert_eq!(ready.get("web"), Some(&AppReadiness::Pending));

        let trunk = f
            .workflow
            .get_apps_ready_to_progress(&f.resolver, &f.project, "master")
            .await
            .unwrap();
        assert!(trunk.values().all(|ready| *ready == AppReadiness::Pending));
    }

    #[tokio::test]
    async fn test_readiness_failure_is_reported_per_app() {
        let f = fixture(&["api", "web"]);
        f.runner
            .fail_in(f.repo("api"), "git describe --always --abbrev=0", "fatal: No names found");
        script_existing(&f, "web", "1.0.0-sha-bbbbbbb", "bbbb", "old");

        let ready = f
            .workflow
            .get_apps_ready_to_progress(&f.resolver, &f.project, "staging")
            .await
            .unwrap();

        assert!(matches!(ready.get("api"), Some(AppReadiness::Unknown { error }) if error.contains("No names found")));
        assert_eq!(ready.get("web"), Some(&AppReadiness::Pending));
    }
}
