//! Kubernetes manifest assembly

use nestor_core::{AppConfig, Process, Settings};
use serde_json::{Value as JsonValue, json};

use crate::builders::{self, BuildOptions};
use crate::engine::TemplateSet;
use crate::error::{EngineError, Result};

/// Name of the process exposed through a Service
pub const WEB_PROCESS_NAME: &str = "web";

/// Builds the manifest of one application
pub struct ManifestBuilder<'a> {
    config: &'a AppConfig,
    templates: &'a TemplateSet,
    settings: &'a Settings,
    timestamp: Option<i64>,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(config: &'a AppConfig, templates: &'a TemplateSet, settings: &'a Settings) -> Self {
        Self {
            config,
            templates,
            settings,
            timestamp: None,
        }
    }

    /// Use a fixed timestamp annotation instead of the current time
    pub fn with_timestamp(mut self, millis: i64) -> Self {
        self.timestamp = Some(millis);
        self
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
    }

    /// Documents of a long-running process:
    /// namespace, HPA, Service (web only), Deployment
    pub fn build_process(&self, process: &Process, options: &BuildOptions) -> Result<Vec<JsonValue>> {
        let config = self.config;
        let names = builders::get_sanitized_names(config, &process.name);
        let image = builders::get_image_name(config, options)?;
        let port = config.port();

        let service = if process.name == WEB_PROCESS_NAME {
            let params = json!({
                "app": names.app,
                "process": names.process,
                "name": names.metadata_name,
                "port": port,
            });
            Some(self.templates.render_document("service", &params)?)
        } else {
            None
        };

        let params = json!({
            "app": names.app,
            "process": names.process,
            "name": names.metadata_name,
            "image": image,
            "port": port,
        });
        let mut deployment = self.templates.render_document("deployment", &params)?;
        builders::set_timestamp(&mut deployment, self.timestamp());

        builders::set_secret(&mut deployment, config);
        let hpa = builders::set_replicas(
            &mut deployment,
            config,
            &process.name,
            self.templates,
            &self.settings.replicas,
        )?;
        let node = builders::get_anti_affinity_node(config, &process.name, self.templates)?;
        let zone = builders::get_anti_affinity_zone(config, &process.name, self.templates)?;
        builders::set_anti_affinity(&mut deployment, node, zone);
        builders::set_node_selector(&mut deployment, config, &process.name);
        builders::set_resources(&mut deployment, config, &process.name);
        builders::set_command(&mut deployment, &process.start_command);
        builders::set_probes(
            &mut deployment,
            config,
            &process.name,
            port,
            &self.settings.probes,
        );
        builders::set_port(&mut deployment, port);
        builders::set_environment_variables(&mut deployment, config, port);

        let mut documents: Vec<JsonValue> = hpa
            .into_iter()
            .chain(service)
            .chain(std::iter::once(deployment))
            .collect();

        if let Some(namespace) = builders::set_namespace(&mut documents, config, self.templates)? {
            documents.insert(0, namespace);
        }

        tracing::debug!(app = %config.app, process = %process.name, documents = documents.len(), "process built");
        Ok(documents)
    }

    /// Documents of a scheduled process: namespace, CronJob
    pub fn build_cronjob(&self, process: &Process, options: &BuildOptions) -> Result<Vec<JsonValue>> {
        let config = self.config;
        let names = builders::get_sanitized_names(config, &process.name);
        let image = builders::get_image_name(config, options)?;
        let cron = config
            .crons
            .get(&process.name)
            .ok_or_else(|| EngineError::MissingCron {
                process: process.name.clone(),
            })?;

        let params = json!({
            "app": names.app,
            "process": names.process,
            "name": names.metadata_name,
            "schedule": cron.schedule,
            "concurrencyPolicy": cron.concurrency_policy,
        });
        let mut cronjob = self.templates.render_document("cronjob", &params)?;

        let params = json!({
            "app": names.app,
            "process": names.process,
            "name": names.metadata_name,
            "image": image,
        });
        let mut job = self.templates.render_document("job", &params)?;

        builders::set_secret(&mut job, config);
        builders::set_resources(&mut job, config, &process.name);
        builders::set_command(&mut job, &process.start_command);
        builders::set_environment_variables(&mut job, config, config.port());
        builders::set_node_selector(&mut job, config, &process.name);

        let job_spec = job
            .get_mut("spec")
            .map(JsonValue::take)
            .unwrap_or_else(|| json!({}));
        builders::object_at(&mut cronjob, &["spec", "jobTemplate"]).insert("spec".to_string(), job_spec);

        let mut documents = vec![cronjob];
        if let Some(namespace) = builders::set_namespace(&mut documents, config, self.templates)? {
            documents.insert(0, namespace);
        }
        Ok(documents)
    }

    /// Whole manifest: every process block, then every cron job block
    pub fn build_deployment_yaml(&self, options: &BuildOptions) -> Result<String> {
        let mut blocks = Vec::new();
        for process in self.config.get_processes() {
            blocks.push(to_yaml_documents(&self.build_process(process, options)?)?);
        }
        for process in self.config.get_cronjobs() {
            blocks.push(to_yaml_documents(&self.build_cronjob(process, options)?)?);
        }
        Ok(blocks.join("\n"))
    }

    /// Ingress of a process, when an `ingress` template is available
    pub fn build_ingress_yaml(&self, process_name: &str) -> Result<Option<String>> {
        if !self.templates.contains("ingress") {
            return Ok(None);
        }
        let names = builders::get_sanitized_names(self.config, process_name);
        let params = json!({
            "app": names.app,
            "process": names.process,
            "name": names.metadata_name,
            "port": self.config.port(),
        });
        let mut documents = vec![self.templates.render_document("ingress", &params)?];
        if let Some(namespace) = builders::set_namespace(&mut documents, self.config, self.templates)? {
            documents.insert(0, namespace);
        }
        Ok(Some(to_yaml_documents(&documents)?))
    }
}

/// Serialize documents as a `---` delimited YAML stream
pub fn to_yaml_documents(documents: &[JsonValue]) -> Result<String> {
    let mut output = String::new();
    for document in documents {
        output.push_str("---\n");
        output.push_str(&serde_yaml::to_string(document)?);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    const DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ name }}
  labels:
    app: {{ app }}
    process: {{ process }}
spec:
  selector:
    matchLabels:
      app: {{ app }}
      process: {{ process }}
  template:
    metadata:
      labels:
        app: {{ app }}
        process: {{ process }}
    spec:
      containers:
        - name: {{ process }}
          image: {{ image }}
"#;

    const JOB: &str = r#"apiVersion: batch/v1
kind: Job
metadata:
  name: {{ name }}
spec:
  template:
    metadata:
      labels:
        app: {{ app }}
        process: {{ process }}
    spec:
      restartPolicy: Never
      containers:
        - name: {{ process }}
          image: {{ image }}
"#;

    fn templates() -> TemplateSet {
        Engine::default()
            .templates_from_sources([
                ("deployment", DEPLOYMENT),
                ("job", JOB),
                (
                    "service",
                    "apiVersion: v1\nkind: Service\nmetadata:\n  name: {{ name }}\nspec:\n  ports:\n    - port: {{ port }}\n",
                ),
                (
                    "hpa",
                    "apiVersion: autoscaling/v1\nkind: HorizontalPodAutoscaler\nmetadata:\n  name: {{ name }}\nspec:\n  minReplicas: {{ minReplicas }}\n  maxReplicas: {{ maxReplicas }}\n  targetCPUUtilizationPercentage: {{ targetCPUUtilizationPercentage }}\n",
                ),
                (
                    "cronjob",
                    "apiVersion: batch/v1\nkind: CronJob\nmetadata:\n  name: {{ name }}\nspec:\n  schedule: \"{{ schedule }}\"\n  concurrencyPolicy: {{ concurrencyPolicy }}\n",
                ),
                ("namespace", "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {{ name }}\n"),
                ("anti-affinity-node", "podAntiAffinity: {}\n"),
                ("anti-affinity-zone", "podAntiAffinity: {}\n"),
            ])
            .unwrap()
    }

    fn config(extra: &str) -> AppConfig {
        let yaml = format!(
            r#"
app: svc
workflow: [master, staging]
docker:
  registry:
    organization: acme
processes:
  - name: web
    start_command: npm start
  - name: mail_worker
    start_command: npm run worker
  - name: nightly
    is_cronjob: true
    start_command: npm run nightly
crons:
  nightly:
    schedule: "0 3 * * *"
{}
"#,
            extra
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn kinds(documents: &[JsonValue]) -> Vec<&str> {
        documents.iter().map(|d| d["kind"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_build_web_process() {
        let config = config("namespace: team-a");
        let templates = templates();
        let settings = Settings::default();
        let builder = ManifestBuilder::new(&config, &templates, &settings).with_timestamp(42);

        let documents = builder
            .build_process(&config.processes[0], &BuildOptions::new("1.0.0-sha-abc1234"))
            .unwrap();

        assert_eq!(
            kinds(&documents),
            vec!["Namespace", "HorizontalPodAutoscaler", "Service", "Deployment"]
        );
        assert!(documents[1..].iter().all(|d| d["metadata"]["namespace"] == "team-a"));

        let deployment = &documents[3];
        let container = &deployment["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["image"], "acme/svc:1.0.0-sha-abc1234");
        assert_eq!(container["args"][2], "npm start");
        assert_eq!(deployment["spec"]["template"]["metadata"]["annotations"]["timestamp"], "42");
        assert_eq!(documents[2]["spec"]["ports"][0]["port"], 8080);
    }

    #[test]
    fn test_build_worker_without_hpa() {
        let config = config("scales:\n  mail_worker:\n    minReplicas: 0");
        let templates = templates();
        let settings = Settings::default();
        let builder = ManifestBuilder::new(&config, &templates, &settings);

        let documents = builder
            .build_process(&config.processes[1], &BuildOptions::new("1.0.0"))
            .unwrap();

        assert_eq!(kinds(&documents), vec!["Deployment"]);
        assert_eq!(documents[0]["metadata"]["name"], "svc----mail-worker");
        assert_eq!(documents[0]["spec"]["replicas"], 0);
    }

    #[test]
    fn test_build_cronjob() {
        let config = config("secret: pull-secret");
        let templates = templates();
        let settings = Settings::default();
        let builder = ManifestBuilder::new(&config, &templates, &settings);

        let documents = builder
            .build_cronjob(&config.processes[2], &BuildOptions::new("2.0.0"))
            .unwrap();

        assert_eq!(kinds(&documents), vec!["CronJob"]);
        let cronjob = &documents[0];
        assert_eq!(cronjob["spec"]["schedule"], "0 3 * * *");
        assert_eq!(cronjob["spec"]["concurrencyPolicy"], "Forbid");

        let pod = &cronjob["spec"]["jobTemplate"]["spec"]["template"]["spec"];
        assert_eq!(pod["restartPolicy"], "Never");
        assert_eq!(pod["imagePullSecrets"][0]["name"], "pull-secret");
        assert_eq!(pod["containers"][0]["args"][2], "npm run nightly");
        assert!(pod["containers"][0].get("livenessProbe").is_none());
        assert!(pod.get("affinity").is_none());
    }

    #[test]
    fn test_missing_cron_configuration() {
        let mut config = config("");
        config.crons.clear();
        let templates = templates();
        let settings = Settings::default();
        let builder = ManifestBuilder::new(&config, &templates, &settings);

        let err = builder
            .build_cronjob(&config.processes[2], &BuildOptions::new("2.0.0"))
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingCron { .. }));
    }

    #[test]
    fn test_build_deployment_yaml_order() {
        let config = config("");
        let templates = templates();
        let settings = Settings::default();
        let builder = ManifestBuilder::new(&config, &templates, &settings);

        let yaml = builder.build_deployment_yaml(&BuildOptions::new("1.0.0")).unwrap();
        let documents: Vec<JsonValue> = yaml
            .split("---\n")
            .filter(|d| !d.trim().is_empty())
            .map(|d| serde_yaml::from_str(d).unwrap())
            .collect();

        let names: Vec<_> = documents
            .iter()
            .map(|d| format!("{}/{}", d["kind"].as_str().unwrap(), d["metadata"]["name"].as_str().unwrap()))
            .collect();
        assert_eq!(
            names,
            vec![
                "HorizontalPodAutoscaler/svc----web",
                "Service/svc----web",
                "Deployment/svc----web",
                "HorizontalPodAutoscaler/svc----mail-worker",
                "Deployment/svc----mail-worker",
                "CronJob/svc----nightly",
            ]
        );
    }

    #[test]
    fn test_fresh_timestamp_per_build() {
        let config = config("");
        let templates = templates();
        let settings = Settings::default();
        let builder = ManifestBuilder::new(&config, &templates, &settings);
        let process = &config.processes[0];

        let first = builder.build_process(process, &BuildOptions::new("1")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = builder.build_process(process, &BuildOptions::new("1")).unwrap();

        let stamp = |docs: &[JsonValue]| {
            docs.last().unwrap()["spec"]["template"]["metadata"]["annotations"]["timestamp"]
                .as_str()
                .unwrap()
                .parse::<i64>()
                .unwrap()
        };
        assert!(stamp(&second) > stamp(&first));
    }

    #[test]
    fn test_ingress_requires_template() {
        let config = config("");
        let templates = templates();
        let settings = Settings::default();
        let builder = ManifestBuilder::new(&config, &templates, &settings);
        assert!(builder.build_ingress_yaml("web").unwrap().is_none());
    }
}
