//! Deployment status extraction
//!
//! Reads back the Deployments and CronJobs of an application into a flat
//! summary that can be diffed around a deploy.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{Container, PodTemplateSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{KubeError, Result};
use crate::kubectl::ResourceKind;

/// Label carrying the process name on pod templates
pub const PROCESS_LABEL: &str = "process";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJobStatus {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

/// An environment variable, with either a literal value or a source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvVarStatus {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, rename = "valueFrom", skip_serializing_if = "Option::is_none")]
    pub value_from: Option<JsonValue>,
}

impl EnvVarStatus {
    /// The literal value if any, else the source reference
    pub fn effective_value(&self) -> JsonValue {
        match (&self.value, &self.value_from) {
            (Some(value), _) => JsonValue::String(value.clone()),
            (None, Some(source)) => source.clone(),
            (None, None) => JsonValue::Null,
        }
    }
}

/// What runs in the cluster for one application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub processes: Vec<ProcessStatus>,
    pub cronjobs: Vec<CronJobStatus>,
    pub env: Vec<EnvVarStatus>,
}

impl DeploymentStatus {
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty() && self.cronjobs.is_empty() && self.env.is_empty()
    }
}

struct ContainerSummary {
    name: String,
    image: Option<String>,
    command: Option<String>,
    env: Vec<EnvVarStatus>,
}

fn summarize(resource_name: &str, template: Option<&PodTemplateSpec>) -> Result<ContainerSummary> {
    let name = template
        .and_then(|t| t.metadata.as_ref())
        .and_then(|m| m.labels.as_ref())
        .and_then(|labels| labels.get(PROCESS_LABEL))
        .cloned()
        .unwrap_or_else(|| resource_name.to_string());

    let container: Option<&Container> = template
        .and_then(|t| t.spec.as_ref())
        .and_then(|spec| spec.containers.first());

    let env = container
        .and_then(|c| c.env.as_ref())
        .map(|vars| {
            vars.iter()
                .map(|var| -> Result<EnvVarStatus> {
                    Ok(EnvVarStatus {
                        name: var.name.clone(),
                        value: var.value.clone(),
                        value_from: var
                            .value_from
                            .as_ref()
                            .map(serde_json::to_value)
                            .transpose()?,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    Ok(ContainerSummary {
        name,
        image: container.and_then(|c| c.image.clone()),
        command: container
            .and_then(|c| c.args.as_ref())
            .and_then(|args| args.get(2))
            .cloned(),
        env,
    })
}

fn decode<T: serde::de::DeserializeOwned>(kind: &ResourceKind, item: &JsonValue) -> Result<T> {
    serde_json::from_value(item.clone()).map_err(|e| KubeError::InvalidResource {
        kind: kind.to_string(),
        name: item["metadata"]["name"].as_str().unwrap_or("<unnamed>").to_string(),
        message: e.to_string(),
    })
}

/// Build the status of an application from `kubectl get` items
///
/// Environment variables are taken from the first item only.
pub fn get_deployment_status_from_items(items: &[JsonValue]) -> Result<DeploymentStatus> {
    let mut status = DeploymentStatus::default();

    for (index, item) in items.iter().enumerate() {
        let kind = ResourceKind::from(item["kind"].as_str().unwrap_or_default());
        let resource_name = item["metadata"]["name"].as_str().unwrap_or_default();

        let summary = match &kind {
            ResourceKind::Deployment => {
                let deployment: Deployment = decode(&kind, item)?;
                let template = deployment.spec.as_ref().map(|spec| &spec.template);
                let summary = summarize(resource_name, template)?;
                status.processes.push(ProcessStatus {
                    name: summary.name.clone(),
                    image: summary.image.clone(),
                    command: summary.command.clone(),
                });
                summary
            }
            ResourceKind::CronJob => {
                let cronjob: CronJob = decode(&kind, item)?;
                let spec = cronjob.spec.as_ref();
                let template = spec
                    .and_then(|s| s.job_template.spec.as_ref())
                    .map(|job| &job.template);
                let summary = summarize(resource_name, template)?;
                status.cronjobs.push(CronJobStatus {
                    name: summary.name.clone(),
                    image: summary.image.clone(),
                    command: summary.command.clone(),
                    schedule: spec.map(|s| s.schedule.clone()),
                });
                summary
            }
            ResourceKind::Other(kind) => {
                return Err(KubeError::UnknownResourceKind { kind: kind.clone() });
            }
        };

        if index == 0 {
            status.env = summary.env;
        }
    }

    Ok(status)
}

/// Build the status from a full `kubectl get --output=json` response
pub fn get_deployment_status_from_response(response: &JsonValue) -> Result<DeploymentStatus> {
    match response.get("items") {
        Some(JsonValue::Array(items)) => get_deployment_status_from_items(items),
        Some(JsonValue::Null) | None => Ok(DeploymentStatus::default()),
        Some(other) => Err(KubeError::InvalidResponse(other.to_string())),
    }
}
