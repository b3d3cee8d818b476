//! Git hosting providers
//!
//! Workflow initialization needs four things from the hosting side: who we
//! are, whether a branch exists, creating a branch, and protecting it.

use async_trait::async_trait;
use nestor_core::{ProjectConfig, Settings};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::error::{RepoError, Result};

/// Value of `project.git.provider` selecting GitHub
pub const GITHUB: &str = "github";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCommit {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: BranchCommit,
    #[serde(default)]
    pub protected: bool,
}

#[async_trait]
pub trait GitProvider: Send + Sync {
    /// The user the token belongs to
    async fn get_user_info(&self) -> Result<ProviderUser>;

    /// `None` when the branch does not exist
    async fn get_branch(&self, organization: &str, repository: &str, branch: &str) -> Result<Option<Branch>>;

    /// Create `branch` pointing at `sha`
    async fn create_branch(&self, organization: &str, repository: &str, branch: &str, sha: &str) -> Result<()>;

    /// Restrict pushes on `branch` to `user`
    async fn protect_branch(&self, organization: &str, repository: &str, branch: &str, user: &str) -> Result<()>;
}

/// GitHub REST API client
pub struct GitHubProvider {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl GitHubProvider {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let mut base = Url::parse(base_url).map_err(|e| RepoError::InvalidProviderUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent("nestor")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self { client, base, token })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let url = self.base.join(path)?;
        let mut request = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        Ok(request)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RepoError::Provider {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl GitProvider for GitHubProvider {
    async fn get_user_info(&self) -> Result<ProviderUser> {
        let response = self.send(self.request(reqwest::Method::GET, "user")?).await?;
        Ok(response.json().await?)
    }

    async fn get_branch(&self, organization: &str, repository: &str, branch: &str) -> Result<Option<Branch>> {
        let path = format!("repos/{}/{}/branches/{}", organization, repository, branch);
        match self.send(self.request(reqwest::Method::GET, &path)?).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(RepoError::Provider { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_branch(&self, organization: &str, repository: &str, branch: &str, sha: &str) -> Result<()> {
        let path = format!("repos/{}/{}/git/refs", organization, repository);
        let body = json!({
            "ref": format!("refs/heads/{}", branch),
            "sha": sha,
        });
        self.send(self.request(reqwest::Method::POST, &path)?.json(&body))
            .await?;
        tracing::info!(repository = %repository, branch = %branch, sha = %sha, "branch created");
        Ok(())
    }

    async fn protect_branch(&self, organization: &str, repository: &str, branch: &str, user: &str) -> Result<()> {
        let path = format!("repos/{}/{}/branches/{}/protection", organization, repository, branch);
        let body = json!({
            "required_status_checks": null,
            "enforce_admins": false,
            "required_pull_request_reviews": null,
            "restrictions": {"users": [user], "teams": []},
        });
        self.send(self.request(reqwest::Method::PUT, &path)?.json(&body))
            .await?;
        tracing::info!(repository = %repository, branch = %branch, "branch protected");
        Ok(())
    }
}

/// Provider configured for the project
pub fn get_git_provider(project: &ProjectConfig, settings: &Settings) -> Result<Box<dyn GitProvider>> {
    match project.git.provider.as_deref() {
        Some(GITHUB) => Ok(Box::new(GitHubProvider::new(
            &settings.git_provider_url,
            settings.git_provider_token.clone(),
        )?)),
        Some(other) => Err(RepoError::ProviderNotImplemented {
            provider: other.to_string(),
        }),
        None => Err(RepoError::ProviderNotConfigured),
    }
}
