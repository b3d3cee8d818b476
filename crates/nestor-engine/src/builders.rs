//! Building blocks of the Kubernetes manifests
//!
//! Each `set_*` function mutates a rendered resource document (a Deployment
//! or a Job, both carrying a pod template under `spec.template`).

use indexmap::IndexMap;
use nestor_core::config::process_or_default;
use nestor_core::settings::{ProbeDefaults, ReplicaDefaults};
use nestor_core::{AppConfig, ProbeConfig};
use serde_json::{Map, Value as JsonValue, json};

use crate::engine::TemplateSet;
use crate::error::Result;

/// Image selection for a build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Image tag to deploy
    pub tag: String,
    /// Branch name used as the image tag instead of `tag`
    pub branch: Option<String>,
}

impl BuildOptions {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// Names used in the Kubernetes templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedNames {
    pub app: String,
    /// Process name with `_` replaced by `-`, lower-cased
    pub process: String,
    /// `<app>----<process>`
    pub metadata_name: String,
}

pub fn get_sanitized_names(config: &AppConfig, process_name: &str) -> SanitizedNames {
    let process = process_name.replace('_', "-").to_lowercase();
    SanitizedNames {
        app: config.app.clone(),
        metadata_name: format!("{}----{}", config.app, process),
        process,
    }
}

/// Fully-qualified image reference
pub fn get_image_name(config: &AppConfig, options: &BuildOptions) -> Result<String> {
    let tag = options.branch.as_deref().unwrap_or(&options.tag);
    Ok(config.get_registry_image_tag(tag)?)
}

fn anti_affinity(
    config: &AppConfig,
    process_name: &str,
    templates: &TemplateSet,
    template: &str,
    enabled: impl Fn(&nestor_core::AffinityConfig) -> bool,
) -> Result<Option<JsonValue>> {
    let is_enabled = ["default", process_name]
        .iter()
        .filter_map(|key| config.affinity.get(*key))
        .any(enabled);

    if !is_enabled {
        return Ok(None);
    }

    let params = json!({"app": config.app, "process": process_name});
    Ok(Some(templates.render_document(template, &params)?))
}

/// Node anti-affinity, when enabled by default or for this process
pub fn get_anti_affinity_node(
    config: &AppConfig,
    process_name: &str,
    templates: &TemplateSet,
) -> Result<Option<JsonValue>> {
    anti_affinity(config, process_name, templates, "anti-affinity-node", |a| {
        a.is_anti_affinity_node_enabled
    })
}

/// Zone anti-affinity, when enabled by default or for this process
pub fn get_anti_affinity_zone(
    config: &AppConfig,
    process_name: &str,
    templates: &TemplateSet,
) -> Result<Option<JsonValue>> {
    anti_affinity(config, process_name, templates, "anti-affinity-zone", |a| {
        a.is_anti_affinity_zone_enabled
    })
}

fn probe(config: &ProbeConfig, port: u16, defaults: &ProbeDefaults) -> JsonValue {
    json!({
        "httpGet": {"path": config.path, "port": port},
        "initialDelaySeconds": config.delay.unwrap_or(defaults.delay),
        "periodSeconds": config.period.unwrap_or(defaults.period),
        "timeoutSeconds": config.timeout.unwrap_or(defaults.timeout),
    })
}

/// `livenessProbe` / `readinessProbe` definitions for a process
pub fn get_probes(
    config: &AppConfig,
    process_name: &str,
    port: u16,
    defaults: &ProbeDefaults,
) -> Map<String, JsonValue> {
    let mut probes = Map::new();
    let Some(settings) = process_or_default(&config.probes, process_name) else {
        return probes;
    };

    let (liveness, readiness) = settings.resolve();
    if let Some(liveness) = liveness {
        probes.insert("livenessProbe".to_string(), probe(&liveness, port, defaults));
    }
    if let Some(readiness) = readiness {
        probes.insert("readinessProbe".to_string(), probe(&readiness, port, defaults));
    }
    probes
}

/// Plain variables: application level, then operational level overriding it
pub fn get_variables(config: &AppConfig) -> IndexMap<String, String> {
    let mut variables = config.variables.app.clone();
    for (name, value) in &config.variables.ope {
        variables.insert(name.clone(), value.clone());
    }
    variables
}

/// Secret-backed variables as `valueFrom` sources
pub fn get_secret_variables(config: &AppConfig) -> IndexMap<String, JsonValue> {
    config
        .variables
        .secret
        .iter()
        .map(|(name, secret)| {
            (
                name.clone(),
                json!({"secretKeyRef": {"name": secret.name, "key": secret.key}}),
            )
        })
        .collect()
}

/// Full environment of a container
///
/// Plain variables come first with `PORT` forced to the service port (in
/// place when already declared), secret-backed variables last.
pub fn get_environment_variables(config: &AppConfig, port: u16) -> Vec<JsonValue> {
    let mut variables = get_variables(config);
    variables.insert("PORT".to_string(), port.to_string());

    variables
        .into_iter()
        .map(|(name, value)| json!({"name": name, "value": value}))
        .chain(
            get_secret_variables(config)
                .into_iter()
                .map(|(name, source)| json!({"name": name, "valueFrom": source})),
        )
        .collect()
}

/// Ensure `value` is an object and return it
fn ensure_object(value: &mut JsonValue) -> &mut Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        other => {
            *other = JsonValue::Object(Map::new());
            ensure_object(other)
        }
    }
}

fn ensure_array(value: &mut JsonValue) -> &mut Vec<JsonValue> {
    match value {
        JsonValue::Array(list) => list,
        other => {
            *other = JsonValue::Array(Vec::new());
            ensure_array(other)
        }
    }
}

/// Object at `path`, creating intermediate objects
pub(crate) fn object_at<'a>(value: &'a mut JsonValue, path: &[&str]) -> &'a mut Map<String, JsonValue> {
    path.iter().fold(ensure_object(value), |map, key| {
        ensure_object(map.entry(key.to_string()).or_insert(JsonValue::Null))
    })
}

fn pod_spec(resource: &mut JsonValue) -> &mut Map<String, JsonValue> {
    object_at(resource, &["spec", "template", "spec"])
}

fn first_container(resource: &mut JsonValue) -> &mut Map<String, JsonValue> {
    let list = ensure_array(
        pod_spec(resource)
            .entry("containers")
            .or_insert_with(|| JsonValue::Array(Vec::new())),
    );
    if list.is_empty() {
        list.push(JsonValue::Object(Map::new()));
    }
    ensure_object(&mut list[0])
}

/// Stamp the pod template so that every build rolls the pods
pub fn set_timestamp(resource: &mut JsonValue, millis: i64) {
    object_at(resource, &["spec", "template", "metadata", "annotations"])
        .insert("timestamp".to_string(), JsonValue::String(millis.to_string()));
}

/// Attach the image pull secret, if configured
pub fn set_secret(resource: &mut JsonValue, config: &AppConfig) {
    if let Some(secret) = &config.secret {
        pod_spec(resource).insert("imagePullSecrets".to_string(), json!([{"name": secret}]));
    }
}

/// Apply the scaling rule and return the HPA document, if any
///
/// `minReplicas: 0` pins the deployment to zero replicas and disables
/// autoscaling.
pub fn set_replicas(
    resource: &mut JsonValue,
    config: &AppConfig,
    process_name: &str,
    templates: &TemplateSet,
    defaults: &ReplicaDefaults,
) -> Result<Option<JsonValue>> {
    let scale = process_or_default(&config.scales, process_name)
        .cloned()
        .unwrap_or_default();
    let min_replicas = scale.min_replicas.unwrap_or(defaults.min);

    if min_replicas == 0 {
        object_at(resource, &["spec"]).insert("replicas".to_string(), json!(0));
        return Ok(None);
    }

    let names = get_sanitized_names(config, process_name);
    let params = json!({
        "app": names.app,
        "process": names.process,
        "name": names.metadata_name,
        "minReplicas": min_replicas,
        "maxReplicas": scale.max_replicas.unwrap_or(defaults.max),
        "targetCPUUtilizationPercentage": scale
            .target_cpu_utilization_percentage
            .unwrap_or(defaults.target_cpu_usage),
    });
    Ok(Some(templates.render_document("hpa", &params)?))
}

/// Deep merge where arrays are concatenated
fn merge_concat(base: &mut JsonValue, overlay: JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_concat(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (JsonValue::Array(base_list), JsonValue::Array(overlay_list)) => {
            base_list.extend(overlay_list);
        }
        (base, overlay) => *base = overlay,
    }
}

/// Attach node and zone anti-affinity, concatenating their rule lists
pub fn set_anti_affinity(
    resource: &mut JsonValue,
    node: Option<JsonValue>,
    zone: Option<JsonValue>,
) {
    let merged = match (node, zone) {
        (None, None) => return,
        (Some(only), None) | (None, Some(only)) => only,
        (Some(mut node), Some(zone)) => {
            merge_concat(&mut node, zone);
            node
        }
    };
    pod_spec(resource).insert("affinity".to_string(), merged);
}

pub fn set_node_selector(resource: &mut JsonValue, config: &AppConfig, process_name: &str) {
    if let Some(selector) = process_or_default(&config.node_selector, process_name) {
        pod_spec(resource).insert("nodeSelector".to_string(), selector.clone());
    }
}

pub fn set_resources(resource: &mut JsonValue, config: &AppConfig, process_name: &str) {
    if let Some(resources) = process_or_default(&config.resources, process_name) {
        first_container(resource).insert("resources".to_string(), resources.clone());
    }
}

pub fn set_command(resource: &mut JsonValue, start_command: &str) {
    first_container(resource).insert(
        "args".to_string(),
        json!(["/bin/bash", "-c", start_command]),
    );
}

pub fn set_probes(
    resource: &mut JsonValue,
    config: &AppConfig,
    process_name: &str,
    port: u16,
    defaults: &ProbeDefaults,
) {
    let probes = get_probes(config, process_name, port, defaults);
    first_container(resource).extend(probes);
}

pub fn set_port(resource: &mut JsonValue, port: u16) {
    first_container(resource).insert("ports".to_string(), json!([{"containerPort": port}]));
}

pub fn set_environment_variables(resource: &mut JsonValue, config: &AppConfig, port: u16) {
    let env = get_environment_variables(config, port);
    first_container(resource).insert("env".to_string(), JsonValue::Array(env));
}

/// Put every resource in the configured namespace
///
/// Returns the Namespace document to create first, if a namespace is set.
pub fn set_namespace(
    resources: &mut [JsonValue],
    config: &AppConfig,
    templates: &TemplateSet,
) -> Result<Option<JsonValue>> {
    let Some(namespace) = &config.namespace else {
        return Ok(None);
    };

    for resource in resources.iter_mut() {
        object_at(resource, &["metadata"])
            .insert("namespace".to_string(), JsonValue::String(namespace.clone()));
    }

    let params = json!({"name": namespace});
    Ok(Some(templates.render_document("namespace", &params)?))
}
