//! Typed configuration model
//!
//! Application documents are deep-merged with the project document before
//! being deserialized here, so every application carries the project-wide
//! defaults (`workflow`, `docker`, `affinity`...).

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};

/// Key holding the fallback entry of per-process maps
pub const DEFAULT_KEY: &str = "default";

/// Default container port
pub const DEFAULT_PORT: u16 = 8080;

/// Project-wide configuration (`project.yaml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Ordered promotion steps; the first one is the trunk
    #[serde(default)]
    pub workflow: Vec<String>,

    #[serde(default)]
    pub git: GitConfig,

    /// Remaining project keys
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

impl ProjectConfig {
    /// Check the workflow is usable: non-empty and without duplicate steps
    pub fn validate(&self) -> Result<()> {
        validate_workflow(&self.workflow)
    }

    /// Trunk branch (first workflow step)
    pub fn trunk(&self) -> Option<&str> {
        self.workflow.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitConfig {
    /// Clone URL of the application repository
    #[serde(default)]
    pub origin: Option<String>,

    /// Git hosting provider (`github`)
    #[serde(default)]
    pub provider: Option<String>,
}

/// Fully resolved application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name
    pub app: String,

    #[serde(default)]
    pub git: GitConfig,

    #[serde(default)]
    pub workflow: Vec<String>,

    #[serde(default)]
    pub processes: Vec<Process>,

    /// Autoscaling, per process name or `default`
    #[serde(default)]
    pub scales: IndexMap<String, ScaleConfig>,

    /// Container resources, per process name or `default`
    #[serde(default)]
    pub resources: IndexMap<String, JsonValue>,

    /// HTTP probes, per process name or `default`
    #[serde(default)]
    pub probes: IndexMap<String, ProbeSettings>,

    /// Cron schedules, per cron process name
    #[serde(default)]
    pub crons: IndexMap<String, CronConfig>,

    /// Anti-affinity switches, per process name or `default`
    #[serde(default)]
    pub affinity: IndexMap<String, AffinityConfig>,

    #[serde(default)]
    pub variables: Variables,

    #[serde(default)]
    pub docker: DockerConfig,

    /// Selects an entry of `docker.registries`
    #[serde(default)]
    pub registry: Option<RegistrySelector>,

    #[serde(default)]
    pub build: BuildConfig,

    /// Node selectors, per process name or `default`
    #[serde(default, rename = "nodeSelector")]
    pub node_selector: IndexMap<String, JsonValue>,

    /// Kubernetes namespace, created and used when set
    #[serde(default)]
    pub namespace: Option<String>,

    /// Name of the image pull secret
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default)]
    pub service: ServiceConfig,

    /// kubectl context of the target cluster
    #[serde(default)]
    pub cluster_name: Option<String>,

    /// Remaining keys, kept for reference resolution and templates
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.app.trim().is_empty() {
            return Err(CoreError::InvalidConfig {
                message: "`app` must not be empty".to_string(),
            });
        }
        validate_workflow(&self.workflow)
    }

    /// Processes that run as long-lived deployments
    pub fn get_processes(&self) -> Vec<&Process> {
        self.processes.iter().filter(|p| !p.is_cronjob).collect()
    }

    /// Processes that run on a schedule
    pub fn get_cronjobs(&self) -> Vec<&Process> {
        self.processes.iter().filter(|p| p.is_cronjob).collect()
    }

    /// Whether a non-cron process with this name exists
    pub fn has_process(&self, name: &str) -> bool {
        self.get_processes().iter().any(|p| p.name == name)
    }

    pub fn port(&self) -> u16 {
        self.service.port
    }

    /// Trunk branch (first workflow step)
    pub fn trunk(&self) -> Option<&str> {
        self.workflow.first().map(String::as_str)
    }

    /// Registry images are pushed to
    ///
    /// An explicit `registry {platform, id}` selector picks an entry of
    /// `docker.registries`; otherwise `docker.registry` is used.
    pub fn get_registry(&self) -> Result<&RegistryConfig> {
        if let Some(selector) = &self.registry {
            return self
                .docker
                .registries
                .get(&selector.platform)
                .and_then(|registries| {
                    registries
                        .iter()
                        .find(|r| r.id.as_deref() == Some(selector.id.as_str()))
                })
                .ok_or_else(|| CoreError::RegistryNotFound {
                    id: selector.id.clone(),
                });
        }

        self.docker
            .registry
            .as_ref()
            .ok_or_else(|| CoreError::MissingRegistry {
                app: self.app.clone(),
            })
    }

    /// `<organization>/<app>:<tag>` on the configured registry
    pub fn get_registry_image_tag(&self, tag: &str) -> Result<String> {
        let registry = self.get_registry()?;
        Ok(format!("{}/{}:{}", registry.organization, self.app, tag))
    }

    /// Clone URL of the application repository
    pub fn origin(&self) -> Result<&str> {
        self.git.origin.as_deref().ok_or_else(|| CoreError::InvalidConfig {
            message: format!("app \"{}\" has no git.origin", self.app),
        })
    }
}

/// Look up a per-process entry, falling back to the `default` entry
pub fn process_or_default<'a, T>(map: &'a IndexMap<String, T>, process: &str) -> Option<&'a T> {
    map.get(process).or_else(|| map.get(DEFAULT_KEY))
}

fn validate_workflow(workflow: &[String]) -> Result<()> {
    if workflow.is_empty() {
        return Err(CoreError::InvalidWorkflow {
            message: "workflow must contain at least one step".to_string(),
        });
    }
    for (index, step) in workflow.iter().enumerate() {
        if workflow[..index].contains(step) {
            return Err(CoreError::InvalidWorkflow {
                message: format!("step \"{}\" appears more than once", step),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    pub name: String,

    #[serde(default)]
    pub is_cronjob: bool,

    pub start_command: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleConfig {
    #[serde(default, rename = "minReplicas")]
    pub min_replicas: Option<u32>,

    #[serde(default, rename = "maxReplicas")]
    pub max_replicas: Option<u32>,

    #[serde(default, rename = "targetCPUUtilizationPercentage")]
    pub target_cpu_utilization_percentage: Option<u32>,
}

/// Probe configuration: either one shared definition or separate
/// `liveness` / `readiness` ones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(default)]
    pub liveness: Option<ProbeConfig>,

    #[serde(default)]
    pub readiness: Option<ProbeConfig>,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub delay: Option<u32>,

    #[serde(default)]
    pub period: Option<u32>,

    #[serde(default)]
    pub timeout: Option<u32>,
}

impl ProbeSettings {
    /// Resolve to `(liveness, readiness)`
    pub fn resolve(&self) -> (Option<ProbeConfig>, Option<ProbeConfig>) {
        if self.liveness.is_none() && self.readiness.is_none() {
            let shared = self.path.clone().map(|path| ProbeConfig {
                path,
                delay: self.delay,
                period: self.period,
                timeout: self.timeout,
            });
            return (shared.clone(), shared);
        }
        (self.liveness.clone(), self.readiness.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub path: String,

    #[serde(default)]
    pub delay: Option<u32>,

    #[serde(default)]
    pub period: Option<u32>,

    #[serde(default)]
    pub timeout: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronConfig {
    pub schedule: String,

    #[serde(default = "default_concurrency_policy")]
    pub concurrency_policy: String,
}

fn default_concurrency_policy() -> String {
    "Forbid".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityConfig {
    #[serde(default)]
    pub is_anti_affinity_node_enabled: bool,

    #[serde(default)]
    pub is_anti_affinity_zone_enabled: bool,
}

/// Environment variables, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variables {
    /// Application-level variables
    #[serde(default, deserialize_with = "string_map")]
    pub app: IndexMap<String, String>,

    /// Operational variables, overriding `app`
    #[serde(default, deserialize_with = "string_map")]
    pub ope: IndexMap<String, String>,

    /// Variables read from Kubernetes secrets
    #[serde(default)]
    pub secret: IndexMap<String, SecretRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Single registry used for every image
    #[serde(default)]
    pub registry: Option<RegistryConfig>,

    /// Registries by platform, selected through `AppConfig::registry`
    #[serde(default)]
    pub registries: IndexMap<String, Vec<RegistryConfig>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub id: Option<String>,

    pub organization: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySelector {
    pub platform: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Docker `--build-arg` values
    #[serde(default, deserialize_with = "string_map")]
    pub variables: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Deserialize a map of scalars into a map of strings
fn string_map<'de, D>(deserializer: D) -> std::result::Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: IndexMap<String, JsonValue> = IndexMap::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let text = match value {
                JsonValue::String(s) => s,
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => b.to_string(),
                JsonValue::Null => String::new(),
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "variable \"{}\" must be a scalar, got {}",
                        key, other
                    )));
                }
            };
            Ok((key, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        serde_yaml::from_str(
            r#"
app: api
workflow: [master, staging, production]
git:
  origin: git@github.com:acme/api.git
processes:
  - name: web
    start_command: ./web
  - name: worker_1
    start_command: ./worker
  - name: cleanup
    is_cronjob: true
    start_command: ./cleanup
scales:
  default:
    minReplicas: 2
    targetCPUUtilizationPercentage: 60
variables:
  app:
    RETRIES: 3
    DEBUG: false
  ope:
    LOG_LEVEL: info
  secret:
    DB_PASSWORD:
      name: api-secrets
      key: db-password
crons:
  cleanup:
    schedule: "*/5 * * * *"
custom_key: kept
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_processes_and_cronjobs() {
        let config = sample();
        let names: Vec<_> = config.get_processes().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["web", "worker_1"]);
        let crons: Vec<_> = config.get_cronjobs().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(crons, vec!["cleanup"]);
        assert!(config.has_process("web"));
        assert!(!config.has_process("cleanup"));
    }

    #[test]
    fn test_defaults_and_coercion() {
        let config = sample();
        assert_eq!(config.port(), 8080);
        assert_eq!(config.variables.app["RETRIES"], "3");
        assert_eq!(config.variables.app["DEBUG"], "false");
        assert_eq!(config.crons["cleanup"].concurrency_policy, "Forbid");
        assert_eq!(config.extra["custom_key"], "kept");
        assert_eq!(config.trunk(), Some("master"));
        config.validate().unwrap();
    }

    #[test]
    fn test_process_or_default() {
        let config = sample();
        let scale = process_or_default(&config.scales, "web").unwrap();
        assert_eq!(scale.min_replicas, Some(2));
        assert_eq!(scale.max_replicas, None);
        assert!(process_or_default(&config.resources, "web").is_none());
    }

    #[test]
    fn test_probe_settings() {
        let shared: ProbeSettings = serde_yaml::from_str("path: /health\ndelay: 5").unwrap();
        let (liveness, readiness) = shared.resolve();
        assert_eq!(liveness, readiness);
        assert_eq!(liveness.unwrap().delay, Some(5));

        let split: ProbeSettings =
            serde_yaml::from_str("readiness:\n  path: /ready").unwrap();
        let (liveness, readiness) = split.resolve();
        assert!(liveness.is_none());
        assert_eq!(readiness.unwrap().path, "/ready");
    }

    #[test]
    fn test_registry_selection() {
        let mut config = sample();
        assert!(matches!(config.get_registry(), Err(CoreError::MissingRegistry { .. })));

        config.docker.registry = Some(RegistryConfig {
            id: None,
            organization: "acme".to_string(),
        });
        assert_eq!(config.get_registry_image_tag("1.0.0").unwrap(), "acme/api:1.0.0");

        config.docker.registries.insert(
            "gcp".to_string(),
            vec![RegistryConfig {
                id: Some("eu".to_string()),
                organization: "acme-eu".to_string(),
            }],
        );
        config.registry = Some(RegistrySelector {
            platform: "gcp".to_string(),
            id: "eu".to_string(),
        });
        assert_eq!(config.get_registry_image_tag("1.0.0").unwrap(), "acme-eu/api:1.0.0");

        config.registry = Some(RegistrySelector {
            platform: "gcp".to_string(),
            id: "us".to_string(),
        });
        let err = config.get_registry().unwrap_err();
        assert_eq!(err.to_string(), "No registry matching \"us\"");
    }

    #[test]
    fn test_invalid_workflow() {
        let mut config = sample();
        config.workflow = vec!["master".into(), "staging".into(), "master".into()];
        assert!(matches!(config.validate(), Err(CoreError::InvalidWorkflow { .. })));

        config.workflow.clear();
        assert!(matches!(config.validate(), Err(CoreError::InvalidWorkflow { .. })));
    }
}
