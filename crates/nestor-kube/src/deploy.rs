//! Deploy an application and report what changed

use nestor_core::{AppConfig, Settings};
use nestor_engine::{BuildOptions, ManifestBuilder, TemplateSet, WEB_PROCESS_NAME};
use std::path::PathBuf;

use crate::diff::{DeploymentStatusDiff, get_deployment_statuses_diff};
use crate::error::{KubeError, Result};
use crate::kubectl::{Kubectl, ResourceKind};
use crate::status::{DeploymentStatus, get_deployment_status_from_response};

/// Name of the manifest file handed to kubectl
pub const MANIFEST_FILENAME: &str = "config.yaml";

const DEFAULT_NAMESPACE: &str = "default";

pub struct Deployer {
    kubectl: Kubectl,
    settings: Settings,
}

impl Deployer {
    pub fn new(kubectl: Kubectl, settings: &Settings) -> Self {
        Self {
            kubectl,
            settings: settings.clone(),
        }
    }

    fn cluster<'c>(&self, config: &'c AppConfig) -> Result<&'c str> {
        config
            .cluster_name
            .as_deref()
            .ok_or_else(|| KubeError::MissingCluster {
                app: config.app.clone(),
            })
    }

    /// Current Deployments and CronJobs of the application
    pub async fn get_deployment_status(&self, config: &AppConfig) -> Result<DeploymentStatus> {
        let cluster = self.cluster(config)?;
        let namespace = config.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        let response = self
            .kubectl
            .fetch_resource_configuration(
                cluster,
                namespace,
                &config.app,
                &[ResourceKind::Deployment, ResourceKind::CronJob],
            )
            .await?;
        get_deployment_status_from_response(&response)
    }

    /// Apply the manifest of `config` at `options.tag` and diff the cluster
    /// state before and after
    pub async fn deploy_app(
        &self,
        config: &AppConfig,
        templates: &TemplateSet,
        options: &BuildOptions,
    ) -> Result<DeploymentStatusDiff> {
        let cluster = self.cluster(config)?;
        let before = self.get_deployment_status(config).await?;

        let builder = ManifestBuilder::new(config, templates, &self.settings);

        if config.has_process(WEB_PROCESS_NAME) {
            if let Some(ingress) = builder.build_ingress_yaml(WEB_PROCESS_NAME)? {
                self.write_and_deploy_configuration(cluster, &ingress).await?;
            }
        }

        let manifest = builder.build_deployment_yaml(options)?;
        self.write_and_deploy_configuration(cluster, &manifest).await?;

        let after = self.get_deployment_status(config).await?;
        let diff = get_deployment_statuses_diff(&before, &after);

        tracing::info!(
            app = %config.app,
            tag = %options.tag,
            unchanged = diff.is_empty(),
            "application deployed"
        );
        Ok(diff)
    }

    /// Write a manifest to a private directory and apply it
    ///
    /// The directory is removed whatever the outcome.
    pub async fn write_and_deploy_configuration(&self, cluster: &str, yaml: &str) -> Result<()> {
        std::fs::create_dir_all(&self.settings.work_path)?;
        let dir = tempfile::Builder::new()
            .prefix("deploy-")
            .tempdir_in(&self.settings.work_path)?;
        let path: PathBuf = dir.path().join(MANIFEST_FILENAME);

        let applied = match tokio::fs::write(&path, yaml).await {
            Ok(()) => self.kubectl.apply_config(cluster, &path).await,
            Err(e) => Err(e.into()),
        };

        let dir_path = dir.path().to_path_buf();
        if let Err(err) = dir.close() {
            tracing::warn!(path = %dir_path.display(), err = %err, "failed to remove manifest directory");
        }

        applied
    }
}
