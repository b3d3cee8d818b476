//! Workflow initialization
//!
//! Every workflow branch but the trunk is created from the trunk head on the
//! hosting provider and protected so only the Nestor user can push to it.
//! Running it again only fills what is missing.

use indexmap::IndexMap;
use nestor_core::AppConfig;
use nestor_repo::{GitProvider, RepoError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowInitStatus {
    Success,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationStatus {
    pub is_modified: bool,
    pub is_created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionStatus {
    pub is_modified: bool,
    pub is_protected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<CreationStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected: Option<ProtectionStatus>,
}

/// Branch reports keyed by branch name
pub type InitReport = IndexMap<String, BranchReport>;

/// Workflow branches other than the trunk
pub fn get_workflow_branches<'a>(config: &'a AppConfig, master_tag: &str) -> Vec<&'a str> {
    config
        .workflow
        .iter()
        .map(String::as_str)
        .filter(|branch| *branch != master_tag)
        .collect()
}

async fn create_and_protect_branch(
    provider: &dyn GitProvider,
    organization: &str,
    repository: &str,
    branch: &str,
    master_sha: &str,
    user: &str,
    report: &mut BranchReport,
) -> Result<(), RepoError> {
    let protected = match provider.get_branch(organization, repository, branch).await? {
        Some(existing) => {
            tracing::info!(branch = %branch, "branch already exists, skipped creation");
            report.created = Some(CreationStatus {
                is_modified: false,
                is_created: true,
            });
            existing.protected
        }
        None => {
            provider
                .create_branch(organization, repository, branch, master_sha)
                .await?;
            report.created = Some(CreationStatus {
                is_modified: true,
                is_created: true,
            });
            false
        }
    };

    if protected {
        tracing::info!(branch = %branch, "branch is already protected, skipped protection");
        report.protected = Some(ProtectionStatus {
            is_modified: false,
            is_protected: true,
        });
    } else {
        provider
            .protect_branch(organization, repository, branch, user)
            .await?;
        report.protected = Some(ProtectionStatus {
            is_modified: true,
            is_protected: true,
        });
    }
    Ok(())
}

async fn init_branches(
    provider: &dyn GitProvider,
    organization: &str,
    config: &AppConfig,
    master_tag: &str,
    branches: &[&str],
    report: &mut InitReport,
) -> Result<(), RepoError> {
    let user = provider.get_user_info().await?;
    tracing::info!(user_login = %user.login, "user login retrieved");

    let master = provider
        .get_branch(organization, &config.app, master_tag)
        .await?
        .ok_or_else(|| RepoError::Provider {
            status: 404,
            message: format!("branch \"{}\" not found", master_tag),
        })?;
    tracing::info!(sha = %master.commit.sha, "trunk head retrieved");

    for branch in branches {
        let entry = report.entry(branch.to_string()).or_default();
        create_and_protect_branch(
            provider,
            organization,
            &config.app,
            branch,
            &master.commit.sha,
            &user.login,
            entry,
        )
        .await?;
    }
    Ok(())
}

/// Create and protect the workflow branches of `config.app`
///
/// The report is returned even on failure, holding what was done.
pub async fn init_workflow(
    organization: &str,
    config: &AppConfig,
    master_tag: &str,
    provider: &dyn GitProvider,
) -> (WorkflowInitStatus, InitReport) {
    let branches = get_workflow_branches(config, master_tag);
    let mut report = InitReport::new();

    if branches.is_empty() {
        return (WorkflowInitStatus::Success, report);
    }

    match init_branches(provider, organization, config, master_tag, &branches, &mut report).await {
        Ok(()) => (WorkflowInitStatus::Success, report),
        Err(err) => {
            tracing::error!(
                organization = %organization,
                app = %config.app,
                master_branch = %master_tag,
                err = %err,
                "failed to initialize workflow"
            );
            (WorkflowInitStatus::Fail, report)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nestor_repo::{Branch, BranchCommit, ProviderUser};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory hosting provider
    #[derive(Default)]
    struct FakeProvider {
        branches: Mutex<HashMap<String, Branch>>,
        calls: Mutex<Vec<String>>,
        fail_protection: bool,
    }

    impl FakeProvider {
        fn with_branch(self, name: &str, sha: &str, protected: bool) -> Self {
            self.branches.lock().unwrap().insert(
                name.to_string(),
                Branch {
                    name: name.to_string(),
                    commit: BranchCommit { sha: sha.to_string() },
                    protected,
                },
            );
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GitProvider for FakeProvider {
        async fn get_user_info(&self) -> nestor_repo::Result<ProviderUser> {
            Ok(ProviderUser {
                login: "nestor-bot".to_string(),
            })
        }

        async fn get_branch(&self, _: &str, _: &str, branch: &str) -> nestor_repo::Result<Option<Branch>> {
            Ok(self.branches.lock().unwrap().get(branch).cloned())
        }

        async fn create_branch(&self, _: &str, _: &str, branch: &str, sha: &str) -> nestor_repo::Result<()> {
            self.calls.lock().unwrap().push(format!("create {} {}", branch, sha));
            self.branches.lock().unwrap().insert(
                branch.to_string(),
                Branch {
                    name: branch.to_string(),
                    commit: BranchCommit { sha: sha.to_string() },
                    protected: false,
                },
            );
            Ok(())
        }

        async fn protect_branch(&self, _: &str, _: &str, branch: &str, user: &str) -> nestor_repo::Result<()> {
            if self.fail_protection {
                return Err(RepoError::Provider {
                    status: 403,
                    message: "Resource not accessible".to_string(),
                });
            }
            self.calls.lock().unwrap().push(format!("protect {} {}", branch, user));
            Ok(())
        }
    }

    fn config(workflow: &[&str]) -> AppConfig {
        serde_json::from_value(serde_json::json!({"app": "api", "workflow": workflow})).unwrap()
    }

    #[tokio::test]
    async fn test_init_workflow() {
        let provider = FakeProvider::default()
            .with_branch("master", "abc1234", true)
            .with_branch("production", "abc1234", true);

        let (status, report) =
            init_workflow("acme", &config(&["master", "staging", "production"]), "master", &provider).await;

        assert_eq!(status, WorkflowInitStatus::Success);
        assert_eq!(provider.calls(), vec!["create staging abc1234", "protect staging nestor-bot"]);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "staging": {
                    "created": {"is_modified": true, "is_created": true},
                    "protected": {"is_modified": true, "is_protected": true},
                },
                "production": {
                    "created": {"is_modified": false, "is_created": true},
                    "protected": {"is_modified": false, "is_protected": true},
                },
            })
        );
    }

    #[tokio::test]
    async fn test_only_trunk() {
        let provider = FakeProvider::default();
        let (status, report) = init_workflow("acme", &config(&["master"]), "master", &provider).await;
        assert_eq!(status, WorkflowInitStatus::Success);
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_missing_trunk_fails() {
        let provider = FakeProvider::default();
        let (status, report) = init_workflow("acme", &config(&["master", "staging"]), "master", &provider).await;
        assert_eq!(status, WorkflowInitStatus::Fail);
        assert!(report.is_empty());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_partial_report_on_provider_error() {
        let provider = FakeProvider {
            fail_protection: true,
            ..Default::default()
        }
        .with_branch("master", "abc1234", true);

        let (status, report) = init_workflow("acme", &config(&["master", "staging"]), "master", &provider).await;

        assert_eq!(status, WorkflowInitStatus::Fail);
        assert_eq!(
            report["staging"],
            BranchReport {
                created: Some(CreationStatus {
                    is_modified: true,
                    is_created: true
                }),
                protected: None,
            }
        );
    }
}
