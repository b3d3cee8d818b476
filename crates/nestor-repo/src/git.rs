//! Git primitives
//!
//! Every operation runs `git` inside the repository directory through a
//! [`CommandRunner`], so callers can be tested against a `MockRunner`.

use nestor_core::{CommandRunner, CoreError, ShellCommand};
use std::path::Path;
use std::sync::Arc;

use crate::error::{RepoError, Result};

/// Remote every branch and tag is pushed to
pub const ORIGIN: &str = "origin";

#[derive(Clone)]
pub struct Git {
    runner: Arc<dyn CommandRunner>,
}

impl Git {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn git<I, S>(&self, path: &Path, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = ShellCommand::new("git").args(args).current_dir(path);
        Ok(self.runner.run(&command).await?)
    }

    async fn list_branches(&self, path: &Path, name: &str) -> Result<String> {
        self.git(
            path,
            [
                "branch".to_string(),
                "--all".to_string(),
                "--list".to_string(),
                name.to_string(),
                format!("{}/{}", ORIGIN, name),
            ],
        )
        .await
    }

    /// Check out `name`, creating it when neither a local nor a remote
    /// branch of that name exists
    pub async fn branch(&self, path: &Path, name: &str) -> Result<()> {
        if self.list_branches(path, name).await?.is_empty() {
            self.git(path, ["checkout", "-b", name]).await?;
        } else {
            self.git(path, ["checkout", name]).await?;
        }
        Ok(())
    }

    pub async fn is_branch_existing(&self, path: &Path, name: &str) -> Result<bool> {
        Ok(!self.list_branches(path, name).await?.is_empty())
    }

    /// Most recent tag reachable from HEAD, or the abbreviated commit when
    /// there is none
    pub async fn get_last_tag(&self, path: &Path) -> Result<String> {
        self.git(path, ["describe", "--always", "--abbrev=0"]).await
    }

    pub async fn get_commit_hash_from_tag(&self, path: &Path, tag: &str) -> Result<String> {
        self.git(path, ["rev-list", "-n", "1", tag]).await
    }

    /// Full hash of `reference`, `HEAD` by default
    pub async fn get_last_commit_hash(&self, path: &Path, reference: Option<&str>) -> Result<String> {
        self.git(path, ["rev-parse", reference.unwrap_or("HEAD")]).await
    }

    pub async fn get_short_commit_hash(&self, path: &Path) -> Result<String> {
        self.git(path, ["rev-parse", "--short=7", "HEAD"]).await
    }

    /// Whether `ancestor` is reachable from `descendant`
    pub async fn is_ancestor(&self, path: &Path, ancestor: &str, descendant: &str) -> Result<bool> {
        match self
            .git(path, ["merge-base", "--is-ancestor", ancestor, descendant])
            .await
        {
            Ok(_) => Ok(true),
            Err(RepoError::Core(CoreError::CommandFailed { code: Some(1), .. })) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Rebase the current branch on `upstream`, optionally onto another base
    ///
    /// Empty commits are kept so promoted branches mirror their source.
    pub async fn rebase(&self, path: &Path, upstream: &str, onto: Option<&str>) -> Result<()> {
        let mut args = vec!["rebase".to_string(), "--keep-empty".to_string()];
        if let Some(onto) = onto {
            args.push("--onto".to_string());
            args.push(onto.to_string());
        }
        args.push(upstream.to_string());
        self.git(path, args).await?;
        Ok(())
    }

    /// Push a branch with its tags
    pub async fn push(&self, path: &Path, branch: &str) -> Result<()> {
        self.git(path, ["push", ORIGIN, branch, "--tags", "--follow-tags"])
            .await?;
        Ok(())
    }

    pub async fn get_remote_url(&self, path: &Path) -> Result<String> {
        self.git(path, ["remote", "get-url", ORIGIN]).await
    }

    /// Tag the head of `trunk` as `<version>-sha-<short hash>`
    ///
    /// The tag must be a valid semantic version; nothing is tagged otherwise.
    pub async fn tag(&self, path: &Path, trunk: &str, version: &str) -> Result<String> {
        self.git(path, ["checkout", trunk]).await?;
        let hash = self.get_short_commit_hash(path).await?;
        let tag = format!("{}-sha-{}", version, hash);

        semver::Version::parse(&tag).map_err(|e| RepoError::InvalidVersionTag {
            tag: tag.clone(),
            message: e.to_string(),
        })?;

        self.git(path, ["tag", "-a", tag.as_str(), hash.as_str(), "-m", tag.as_str()])
            .await?;
        tracing::info!(path = %path.display(), tag = %tag, "tagged trunk");
        Ok(tag)
    }

    /// Bring `path` to `revision` of `url`
    ///
    /// An existing clone of the same remote is cleaned and fetched; anything
    /// else at `path` is replaced by a fresh clone.
    pub async fn update_repository(&self, path: &Path, url: &str, revision: &str) -> Result<()> {
        let reusable = path.is_dir()
            && match self.get_remote_url(path).await {
                Ok(remote) => remote == url,
                Err(err) => {
                    tracing::debug!(path = %path.display(), err = %err, "not a reusable clone");
                    false
                }
            };

        if reusable {
            self.git(path, ["clean", "-dfx"]).await?;
            self.git(path, ["fetch", "--all", "--tags"]).await?;
        } else {
            if path.exists() {
                tokio::fs::remove_dir_all(path).await?;
            }
            let parent = path.parent().unwrap_or(Path::new("."));
            tokio::fs::create_dir_all(parent).await?;
            let command = ShellCommand::new("git")
                .args(["clone", url])
                .arg(path.display().to_string())
                .current_dir(parent);
            self.runner.run(&command).await?;
        }

        self.git(path, ["reset", "--hard", revision]).await?;
        Ok(())
    }
}
