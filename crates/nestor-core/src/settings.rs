//! Runtime settings
//!
//! Settings are read once at start-up and handed to every component that
//! needs them. Nothing below the binary reads the process environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Default readiness / liveness probe timings, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeDefaults {
    pub delay: u32,
    pub period: u32,
    pub timeout: u32,
}

impl Default for ProbeDefaults {
    fn default() -> Self {
        Self {
            delay: 30,
            period: 10,
            timeout: 1,
        }
    }
}

/// Default horizontal autoscaling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaDefaults {
    pub min: u32,
    pub max: u32,
    pub target_cpu_usage: u32,
}

impl Default for ReplicaDefaults {
    fn default() -> Self {
        Self {
            min: 1,
            max: 10,
            target_cpu_usage: 75,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the configuration repository
    pub config_path: PathBuf,
    /// Folder (relative to `config_path`) holding `<app>.yaml` files
    pub apps_folder: String,
    /// Project file name (relative to `config_path`)
    pub project_filename: String,
    /// Branch of the configuration repository served by the API
    pub config_default_branch: String,
    /// Templates directory (relative to `config_path`)
    pub templates_dir: String,
    /// Where pristine mirrors of application repositories live
    pub pristine_path: PathBuf,
    /// Where working copies and temporary files are created
    pub work_path: PathBuf,
    pub git_provider_token: Option<String>,
    pub git_provider_url: String,
    /// Trunk branch skipped when initializing workflow branches
    pub git_master_tag: String,
    /// `HTTP_PROXY` handed to kubectl
    pub k8s_http_proxy: Option<String>,
    pub probes: ProbeDefaults,
    pub replicas: ReplicaDefaults,
    pub build_workers: usize,
    pub build_queue_size: usize,
    /// Finished job records kept for polling
    pub job_history_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config"),
            apps_folder: "apps".to_string(),
            project_filename: "project.yaml".to_string(),
            config_default_branch: "staging".to_string(),
            templates_dir: "templates".to_string(),
            pristine_path: PathBuf::from("/tmp/nestor/pristine"),
            work_path: PathBuf::from("/tmp/nestor/work"),
            git_provider_token: None,
            git_provider_url: "https://api.github.com".to_string(),
            git_master_tag: "master".to_string(),
            k8s_http_proxy: None,
            probes: ProbeDefaults::default(),
            replicas: ReplicaDefaults::default(),
            build_workers: 2,
            build_queue_size: 16,
            job_history_size: 256,
        }
    }
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary lookup function
    ///
    /// Unset variables keep their default. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let mut settings = Self::default();

        if let Some(v) = get("NESTOR_CONFIG_PATH") {
            settings.config_path = PathBuf::from(v);
        }
        if let Some(v) = get("NESTOR_CONFIG_APPS_FOLDER") {
            settings.apps_folder = v;
        }
        if let Some(v) = get("NESTOR_CONFIG_PROJECT_FILENAME") {
            settings.project_filename = v;
        }
        if let Some(v) = get("NESTOR_CONFIG_DEFAULT_BRANCH") {
            settings.config_default_branch = v;
        }
        if let Some(v) = get("NESTOR_K8S_TEMPLATES_DIR") {
            settings.templates_dir = v;
        }
        if let Some(v) = get("NESTOR_PRISTINE_PATH") {
            settings.pristine_path = PathBuf::from(v);
        }
        if let Some(v) = get("NESTOR_WORK_PATH") {
            settings.work_path = PathBuf::from(v);
        }
        if let Some(v) = get("NESTOR_GIT_PROVIDER_URL") {
            settings.git_provider_url = v;
        }
        if let Some(v) = get("NESTOR_GIT_MASTER_TAG") {
            settings.git_master_tag = v;
        }
        settings.git_provider_token = get("NESTOR_GIT_PROVIDER_TOKEN");
        settings.k8s_http_proxy = get("NESTOR_K8S_HTTP_PROXY");

        let number = |name: &str, default: u32| -> Result<u32> {
            get(name).map_or(Ok(default), |v| parse_setting(name, &v))
        };

        settings.probes = ProbeDefaults {
            delay: number("NESTOR_PROBES_DEFAULT_DELAY", settings.probes.delay)?,
            period: number("NESTOR_PROBES_DEFAULT_PERIOD", settings.probes.period)?,
            timeout: number("NESTOR_PROBES_DEFAULT_TIMEOUT", settings.probes.timeout)?,
        };
        settings.replicas = ReplicaDefaults {
            min: number("NESTOR_REPLICAS_DEFAULT_MIN", settings.replicas.min)?,
            max: number("NESTOR_REPLICAS_DEFAULT_MAX", settings.replicas.max)?,
            target_cpu_usage: number(
                "NESTOR_REPLICAS_DEFAULT_TARGET_CPU_USAGE",
                settings.replicas.target_cpu_usage,
            )?,
        };
        if let Some(v) = get("NESTOR_BUILD_WORKERS") {
            settings.build_workers = parse_setting("NESTOR_BUILD_WORKERS", &v)?;
        }
        if let Some(v) = get("NESTOR_BUILD_QUEUE_SIZE") {
            settings.build_queue_size = parse_setting("NESTOR_BUILD_QUEUE_SIZE", &v)?;
        }
        if let Some(v) = get("NESTOR_JOB_HISTORY_SIZE") {
            settings.job_history_size = parse_setting("NESTOR_JOB_HISTORY_SIZE", &v)?;
        }

        Ok(settings)
    }

    /// Override the configuration repository location
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    pub fn apps_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.apps_folder)
    }

    pub fn project_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.project_filename)
    }

    pub fn templates_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.templates_dir)
    }
}

fn parse_setting<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| CoreError::InvalidSetting {
        name: name.to_string(),
        value: value.to_string(),
        message: e.to_string(),
    })
}
