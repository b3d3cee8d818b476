//! Isolated checkouts of the configuration repository

use nestor_core::{CommandRunner, ConfigResolver, Settings};
use nestor_repo::WorkingCopy;

use crate::error::Result;

/// A private copy of the configuration repository switched to one branch
///
/// Concurrent operations each get their own copy, removed on drop.
pub struct ConfigEnvironment {
    resolver: ConfigResolver,
    _copy: WorkingCopy,
}

impl ConfigEnvironment {
    pub async fn checkout(settings: &Settings, runner: &dyn CommandRunner, branch: &str) -> Result<Self> {
        let source = ConfigResolver::from_settings(settings)?;
        let copy = WorkingCopy::new(source.create_temporary_config_copy()?);

        let resolver = ConfigResolver::new(copy.path(), settings)?;
        resolver.change_environment(runner, branch).await?;
        tracing::debug!(path = %copy.path().display(), branch = %branch, "configuration checked out");

        Ok(Self {
            resolver,
            _copy: copy,
        })
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }
}
