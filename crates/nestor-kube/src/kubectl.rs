//! kubectl command-line wrapper

use nestor_core::{CommandRunner, Settings, ShellCommand};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{KubeError, Result};

/// Kinds of cluster resources read back for status extraction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Deployment,
    CronJob,
    /// Any kind Nestor does not manage
    Other(String),
}

impl ResourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Deployment => "Deployment",
            Self::CronJob => "CronJob",
            Self::Other(kind) => kind,
        }
    }
}

impl From<&str> for ResourceKind {
    fn from(kind: &str) -> Self {
        match kind {
            "Deployment" => Self::Deployment,
            "CronJob" => Self::CronJob,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives `kubectl` through a [`CommandRunner`]
#[derive(Clone)]
pub struct Kubectl {
    runner: Arc<dyn CommandRunner>,
    http_proxy: Option<String>,
}

impl Kubectl {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: &Settings) -> Self {
        Self {
            runner,
            http_proxy: settings.k8s_http_proxy.clone(),
        }
    }

    fn command(&self, cluster: &str) -> ShellCommand {
        let command = ShellCommand::new("kubectl").arg("--context").arg(cluster);
        match &self.http_proxy {
            Some(proxy) => command.env("HTTP_PROXY", proxy),
            None => command,
        }
    }

    /// Fetch the app's resources of the given kinds, JSON-decoded
    pub async fn fetch_resource_configuration(
        &self,
        cluster: &str,
        namespace: &str,
        app: &str,
        kinds: &[ResourceKind],
    ) -> Result<JsonValue> {
        let kinds = kinds
            .iter()
            .map(ResourceKind::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let command = self.command(cluster).args([
            "--namespace".to_string(),
            namespace.to_string(),
            "get".to_string(),
            kinds,
            "--output=json".to_string(),
            "--selector".to_string(),
            format!("app={}", app),
        ]);

        let output = self.runner.run(&command).await?;
        let value: JsonValue = serde_json::from_str(&output)?;
        if !value.is_object() {
            return Err(KubeError::InvalidResponse(output));
        }
        Ok(value)
    }

    /// Apply a manifest file
    pub async fn apply_config(&self, cluster: &str, path: &Path) -> Result<()> {
        let command = self
            .command(cluster)
            .args(["apply", "-f"])
            .arg(path.display().to_string());
        let output = self.runner.run(&command).await?;
        tracing::info!(cluster = %cluster, path = %path.display(), "{}", output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestor_core::MockRunner;

    fn kubectl(runner: &MockRunner, proxy: Option<&str>) -> Kubectl {
        let mut settings = Settings::default();
        settings.k8s_http_proxy = proxy.map(str::to_string);
        Kubectl::new(Arc::new(runner.clone()), &settings)
    }

    #[test]
    fn test_resource_kind() {
        assert_eq!(ResourceKind::from("CronJob"), ResourceKind::CronJob);
        assert_eq!(
            ResourceKind::from("StatefulSet"),
            ResourceKind::Other("StatefulSet".to_string())
        );
        assert_eq!(ResourceKind::Deployment.to_string(), "Deployment");
    }

    #[tokio::test]
    async fn test_fetch_resource_configuration() {
        let runner = MockRunner::new();
        runner.on(
            "kubectl --context prod --namespace default get Deployment,CronJob --output=json --selector app=api",
            r#"{"items": []}"#,
        );

        let value = kubectl(&runner, Some("http://proxy:3128"))
            .fetch_resource_configuration(
                "prod",
                "default",
                "api",
                &[ResourceKind::Deployment, ResourceKind::CronJob],
            )
            .await
            .unwrap();

        assert_eq!(value["items"], serde_json::json!([]));
        let call = &runner.calls()[0];
        assert_eq!(call.env, vec![("HTTP_PROXY".to_string(), "http://proxy:3128".to_string())]);
    }

    #[tokio::test]
    async fn test_fetch_invalid_output() {
        let runner = MockRunner::new();
        runner.on(
            "kubectl --context prod --namespace default get Deployment --output=json --selector app=api",
            "[1, 2]",
        );

        let err = kubectl(&runner, None)
            .fetch_resource_configuration("prod", "default", "api", &[ResourceKind::Deployment])
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_apply_config() {
        let runner = MockRunner::new();
        kubectl(&runner, None)
            .apply_config("prod", Path::new("/tmp/deploy/config.yaml"))
            .await
            .unwrap();

        assert_eq!(runner.lines(), vec!["kubectl --context prod apply -f /tmp/deploy/config.yaml"]);
        assert!(runner.calls()[0].env.is_empty());
    }
}
