//! Application image build pipeline

use nestor_core::{AppConfig, CommandRunner};
use nestor_repo::{DEFAULT_TRUNK, Docker, Git, RepositorySource};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// Version tagged when the application does not declare one
pub const DEFAULT_APP_VERSION: &str = "0.0.0";

/// Image published for an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltImage {
    pub app: String,
    pub tag: String,
    pub image: String,
}

/// Version of the application checked out at `repo`
///
/// Read from the `version` field of a `package.json` at the repository root,
/// [`DEFAULT_APP_VERSION`] when there is none.
pub fn get_version(repo: &Path) -> String {
    let manifest = repo.join("package.json");
    let version = std::fs::read_to_string(&manifest)
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|package| package.get("version")?.as_str().map(str::to_string));

    match version {
        Some(version) => version,
        None => {
            tracing::debug!(path = %repo.display(), "no package version, using default");
            DEFAULT_APP_VERSION.to_string()
        }
    }
}

pub struct AppBuilder {
    git: Git,
    docker: Docker,
    repositories: Arc<dyn RepositorySource>,
}

impl AppBuilder {
    pub fn new(runner: Arc<dyn CommandRunner>, repositories: Arc<dyn RepositorySource>) -> Self {
        Self {
            git: Git::new(runner.clone()),
            docker: Docker::new(runner),
            repositories,
        }
    }

    /// Tag the trunk, build and publish its image, then push the tag
    ///
    /// A tagging failure is only logged: the revision is usually tagged
    /// already, and the build goes on with the existing tag.
    pub async fn build_app(&self, config: &AppConfig) -> Result<BuiltImage> {
        let copy = self.repositories.create_working_repository(config).await?;
        let repo = copy.path();
        let trunk = config.trunk().unwrap_or(DEFAULT_TRUNK);

        self.git.branch(repo, trunk).await?;
        tracing::debug!(app = %config.app, working_directory = %repo.display(), "repository retrieved");

        let version = get_version(repo);
        match self.git.tag(repo, trunk, &version).await {
            Ok(tag) => tracing::debug!(app = %config.app, tag = %tag, "new tag created"),
            Err(err) => tracing::warn!(app = %config.app, err = %err, "error while tagging the app"),
        }

        let tag = self.docker.build(config, repo).await?;
        let image = self.docker.push(config, &tag).await?;

        self.git.push(repo, trunk).await?;
        tracing::info!(app = %config.app, tag = %tag, image = %image, "application built");

        Ok(BuiltImage {
            app: config.app.clone(),
            tag,
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nestor_core::MockRunner;
    use nestor_repo::WorkingCopy;
    use tempfile::TempDir;

    struct TempSource {
        root: TempDir,
    }

    #[async_trait]
    impl RepositorySource for TempSource {
        async fn create_working_repository(&self, config: &AppConfig) -> nestor_repo::Result<WorkingCopy> {
            let path = self.root.path().join(&config.app);
            std::fs::create_dir_all(&path)?;
            Ok(WorkingCopy::new(path))
        }
    }

    fn config() -> AppConfig {
        serde_json::from_value(serde_json::json!({
            "app": "api",
            "workflow": ["master", "staging"],
            "docker": {"registry": {"organization": "acme"}},
        }))
        .unwrap()
    }

    fn builder(runner: &MockRunner) -> (AppBuilder, std::path::PathBuf) {
        let root = TempDir::new().unwrap();
        let repo = root.path().join("api");
        let builder = AppBuilder::new(Arc::new(runner.clone()), Arc::new(TempSource { root }));
        (builder, repo)
    }

    #[tokio::test]
    async fn test_build_app() {
        let runner = MockRunner::new();
        runner
            .on("git rev-parse --short=7 HEAD", "abc1234")
            .on("git describe --always --abbrev=0", "0.0.0-sha-abc1234")
            .on("git rev-parse HEAD", "abc1234ffff")
            .on_once("docker images api:0.0.0-sha-abc1234 --quiet", "")
            .on("docker images api:0.0.0-sha-abc1234 --quiet", "9e8d7c");
        let (builder, repo) = builder(&runner);

        let built = builder.build_app(&config()).await.unwrap();

        assert_eq!(
            built,
            BuiltImage {
                app: "api".into(),
                tag: "0.0.0-sha-abc1234".into(),
                image: "acme/api:0.0.0-sha-abc1234".into(),
            }
        );
        let lines = runner.lines_in(&repo);
        assert!(lines.contains(&"git tag -a 0.0.0-sha-abc1234 abc1234 -m 0.0.0-sha-abc1234".to_string()));
        assert_eq!(lines.last().unwrap(), "git push origin master --tags --follow-tags");
        assert!(runner.was_called("docker push acme/api:0.0.0-sha-abc1234"));
        assert!(!repo.exists());
    }

    #[tokio::test]
    async fn test_tagging_failure_does_not_stop_the_build() {
        let runner = MockRunner::new();
        runner
            .on("git rev-parse --short=7 HEAD", "abc1234")
            .fail_prefix("git tag -a ", "tag already exists")
            .on("git describe --always --abbrev=0", "0.0.0-sha-abc1234")
            .on("docker images api:0.0.0-sha-abc1234 --quiet", "9e8d7c");
        let (builder, _repo) = builder(&runner);

        let built = builder.build_app(&config()).await.unwrap();
        assert_eq!(built.tag, "0.0.0-sha-abc1234");
        assert!(runner.was_called("git push origin master --tags --follow-tags"));
    }

    #[test]
    fn test_get_version() {
        let dir = TempDir::new().unwrap();
        assert_eq!(get_version(dir.path()), DEFAULT_APP_VERSION);

        std::fs::write(dir.path().join("package.json"), r#"{"name": "api", "version": "1.3.0"}"#).unwrap();
        assert_eq!(get_version(dir.path()), "1.3.0");

        std::fs::write(dir.path().join("package.json"), "{not json").unwrap();
        assert_eq!(get_version(dir.path()), DEFAULT_APP_VERSION);
    }

    #[tokio::test]
    async fn test_push_failure_is_reported() {
        let runner = MockRunner::new();
        runner
            .on("git describe --always --abbrev=0", "0.0.0-sha-abc1234")
            .on("docker images api:0.0.0-sha-abc1234 --quiet", "9e8d7c")
            .fail("docker push acme/api:0.0.0-sha-abc1234", "denied");
        let (builder, _repo) = builder(&runner);

        assert!(builder.build_app(&config()).await.is_err());
        assert!(!runner.lines().iter().any(|l| l.starts_with("git push")));
    }
}
