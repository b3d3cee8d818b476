//! Pristine mirrors and disposable working copies
//!
//! Each application has one long-lived clone under the pristine directory.
//! Work never happens there: callers get a private copy under the work
//! directory, removed when the [`WorkingCopy`] is dropped.

use async_trait::async_trait;
use nestor_core::workspace::{copy_dir, non_blocking_clean, unique_path};
use nestor_core::{AppConfig, CommandRunner, Settings};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::git::{Git, ORIGIN};

/// Branch mirrored when the application workflow is empty
pub const DEFAULT_TRUNK: &str = "master";

/// A private clone of an application repository
///
/// The directory is deleted on drop. Failures are logged, never raised.
#[derive(Debug)]
pub struct WorkingCopy {
    path: PathBuf,
}

impl WorkingCopy {
    /// Take ownership of an existing directory
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        non_blocking_clean(&self.path);
    }
}

/// Hands out working copies of application repositories
#[async_trait]
pub trait RepositorySource: Send + Sync {
    async fn create_working_repository(&self, config: &AppConfig) -> Result<WorkingCopy>;
}

pub struct PristineStore {
    git: Git,
    pristine_path: PathBuf,
    work_path: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PristineStore {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: &Settings) -> Self {
        Self {
            git: Git::new(runner),
            pristine_path: settings.pristine_path.clone(),
            work_path: settings.work_path.clone(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn app_lock(&self, app: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(app.to_string()).or_default().clone()
    }

    /// Location of the mirror of `app`
    pub fn pristine_repository_path(&self, app: &str) -> PathBuf {
        self.pristine_path.join(app)
    }

    /// Refresh the mirror of `app` to the remote trunk and copy it
    ///
    /// Concurrent calls for the same application are serialized.
    pub async fn create_working_copy(&self, app: &str, origin: &str, trunk: &str) -> Result<WorkingCopy> {
        let lock = self.app_lock(app);
        let _guard = lock.lock().await;

        let pristine = self.pristine_repository_path(app);
        let revision = format!("{}/{}", ORIGIN, trunk);
        self.git.update_repository(&pristine, origin, &revision).await?;

        std::fs::create_dir_all(&self.work_path)?;
        let copy = WorkingCopy::new(unique_path(&self.work_path, app));
        copy_dir(&pristine, copy.path())?;

        tracing::debug!(app = %app, path = %copy.path().display(), "working copy created");
        Ok(copy)
    }
}

#[async_trait]
impl RepositorySource for PristineStore {
    async fn create_working_repository(&self, config: &AppConfig) -> Result<WorkingCopy> {
        let trunk = config.trunk().unwrap_or(DEFAULT_TRUNK);
        self.create_working_copy(&config.app, config.origin()?, trunk).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestor_core::MockRunner;
    use tempfile::TempDir;

    const ORIGIN_URL: &str = "git@github.com:acme/api.git";

    fn store(runner: &MockRunner, root: &TempDir) -> PristineStore {
        let mut settings = Settings::default();
        settings.pristine_path = root.path().join("pristine");
        settings.work_path = root.path().join("work");
        PristineStore::new(Arc::new(runner.clone()), &settings)
    }

    #[tokio::test]
    async fn test_working_copy_is_a_copy_of_the_mirror() {
        let root = TempDir::new().unwrap();
        let runner = MockRunner::new();
        let store = store(&runner, &root);

        let pristine = store.pristine_repository_path("api");
        std::fs::create_dir_all(pristine.join("src")).unwrap();
        std::fs::write(pristine.join("src/main.rs"), "fn main() {}").unwrap();
        runner.on_in(&pristine, "git remote get-url origin", ORIGIN_URL);

        let copy = store.create_working_copy("api", ORIGIN_URL, "master").await.unwrap();
        let copy_path = copy.path().to_path_buf();

        assert!(copy_path.starts_with(root.path().join("work")));
        assert!(copy_path.file_name().unwrap().to_string_lossy().starts_with("api-"));
        assert_eq!(
            std::fs::read_to_string(copy_path.join("src/main.rs")).unwrap(),
            "fn main() {}"
        );
        assert_eq!(
            runner.lines_in(&pristine),
            vec![
                "git remote get-url origin",
                "git clean -dfx",
                "git fetch --all --tags",
                "git reset --hard origin/master",
            ]
        );

        drop(copy);
        assert!(!copy_path.exists());
        assert!(pristine.join("src/main.rs").exists());
    }

    #[tokio::test]
    async fn test_concurrent_copies_are_distinct() {
        let root = TempDir::new().unwrap();
        let runner = MockRunner::new();
        let store = Arc::new(store(&runner, &root));

        let pristine = store.pristine_repository_path("api");
        std::fs::create_dir_all(&pristine).unwrap();
        runner.on_in(&pristine, "git remote get-url origin", ORIGIN_URL);

        let (a, b) = tokio::join!(
            store.create_working_copy("api", ORIGIN_URL, "master"),
            store.create_working_copy("api", ORIGIN_URL, "master"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_missing_origin() {
        let root = TempDir::new().unwrap();
        let store = store(&MockRunner::new(), &root);
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "app": "api",
            "workflow": ["master"],
        }))
        .unwrap();

        assert!(store.create_working_repository(&config).await.is_err());
    }
}
