//! Docker image build and publication

use nestor_core::{AppConfig, CommandRunner, ShellCommand};
use std::path::Path;
use std::sync::Arc;

use crate::error::{RepoError, Result};
use crate::git::Git;

/// Build argument carrying the full commit hash of the built revision
pub const COMMIT_HASH_ARG: &str = "COMMIT_HASH";

#[derive(Clone)]
pub struct Docker {
    runner: Arc<dyn CommandRunner>,
    git: Git,
}

/// Local image name
pub fn local_image(app: &str, tag: &str) -> String {
    format!("{}:{}", app, tag)
}

impl Docker {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            git: Git::new(runner.clone()),
            runner,
        }
    }

    pub async fn has_docker_image(&self, app: &str, tag: &str) -> Result<bool> {
        let image = local_image(app, tag);
        let command = ShellCommand::new("docker").args(["images", image.as_str(), "--quiet"]);
        Ok(!self.runner.run(&command).await?.is_empty())
    }

    /// Build the image of the repository's last tag
    ///
    /// Returns the tag. Nothing is built when the image already exists.
    pub async fn build(&self, config: &AppConfig, repo: &Path) -> Result<String> {
        let tag = self.git.get_last_tag(repo).await?;
        if self.has_docker_image(&config.app, &tag).await? {
            tracing::info!(app = %config.app, tag = %tag, "image already built");
            return Ok(tag);
        }

        let commit = self.git.get_last_commit_hash(repo, None).await?;
        let mut command = ShellCommand::new("docker")
            .args(["build", "--tag"])
            .arg(local_image(&config.app, &tag));
        for (key, value) in &config.build.variables {
            command = command.arg("--build-arg").arg(format!("{}={}", key, value));
        }
        command = command
            .arg("--build-arg")
            .arg(format!("{}={}", COMMIT_HASH_ARG, commit))
            .arg(repo.display().to_string());

        self.runner.run(&command).await?;
        tracing::info!(app = %config.app, tag = %tag, "image built");
        Ok(tag)
    }

    /// Tag the local image with its registry name and push it
    ///
    /// Returns the registry image name.
    pub async fn push(&self, config: &AppConfig, tag: &str) -> Result<String> {
        let local = local_image(&config.app, tag);
        if !self.has_docker_image(&config.app, tag).await? {
            return Err(RepoError::ImageNotAvailable { image: local });
        }

        let image = config.get_registry_image_tag(tag)?;
        self.runner
            .run(&ShellCommand::new("docker").args(["tag", local.as_str(), image.as_str()]))
            .await?;
        self.runner
            .run(&ShellCommand::new("docker").args(["push", image.as_str()]))
            .await?;

        tracing::info!(app = %config.app, image = %image, "image pushed");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestor_core::MockRunner;

    fn config() -> AppConfig {
        serde_json::from_value(serde_json::json!({
            "app": "api",
            "workflow": ["master", "production"],
            "docker": {"registry": {"organization": "acme"}},
            "build": {"variables": {"NODE_ENV": "production", "WORKERS": 4}},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_build() {
        let runner = MockRunner::new();
        runner
            .on("git describe --always --abbrev=0", "1.0.0-sha-abc1234")
            .on("git rev-parse HEAD", "abc1234def");

        let tag = Docker::new(Arc::new(runner.clone()))
            .build(&config(), Path::new("/work/api"))
            .await
            .unwrap();

        assert_eq!(tag, "1.0.0-sha-abc1234");
        assert_eq!(
            runner.lines().last().unwrap(),
            "docker build --tag api:1.0.0-sha-abc1234 --build-arg NODE_ENV=production \
             --build-arg WORKERS=4 --build-arg COMMIT_HASH=abc1234def /work/api"
        );
    }

    #[tokio::test]
    async fn test_build_skips_existing_image() {
        let runner = MockRunner::new();
        runner
            .on("git describe --always --abbrev=0", "1.0.0-sha-abc1234")
            .on("docker images api:1.0.0-sha-abc1234 --quiet", "3f2a1b");

        Docker::new(Arc::new(runner.clone()))
            .build(&config(), Path::new("/work/api"))
            .await
            .unwrap();

        assert!(!runner.lines().iter().any(|l| l.starts_with("docker build")));
    }

    #[tokio::test]
    async fn test_push() {
        let runner = MockRunner::new();
        runner.on("docker images api:1.0.0 --quiet", "3f2a1b");

        let image = Docker::new(Arc::new(runner.clone()))
            .push(&config(), "1.0.0")
            .await
            .unwrap();

        assert_eq!(image, "acme/api:1.0.0");
        assert_eq!(
            runner.lines(),
            vec![
                "docker images api:1.0.0 --quiet",
                "docker tag api:1.0.0 acme/api:1.0.0",
                "docker push acme/api:1.0.0",
            ]
        );
    }

    #[tokio::test]
    async fn test_push_missing_image() {
        let runner = MockRunner::new();
        let err = Docker::new(Arc::new(runner.clone()))
            .push(&config(), "1.0.0")
            .await
            .unwrap_err();

        assert!(matches!(err, RepoError::ImageNotAvailable { ref image } if image == "api:1.0.0"));
        assert_eq!(runner.lines().len(), 1);
    }
}
