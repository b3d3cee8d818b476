//! Nestor Repository Operations
//!
//! This crate drives the tools around application repositories:
//!
//! - **Git**: branch, tag, rebase and push through a `CommandRunner`
//! - **Pristine store**: one mirror per application, disposable working copies
//! - **Docker**: image build, registry tagging and push
//! - **Git providers**: branch creation and protection on the hosting side
//!
//! ## Example
//!
//! ```rust,no_run
//! use nestor_core::{Settings, ShellRunner};
//! use nestor_repo::{Git, PristineStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::from_env()?;
//! let runner = Arc::new(ShellRunner::new());
//! let store = PristineStore::new(runner.clone(), &settings);
//!
//! let copy = store
//!     .create_working_copy("api", "git@github.com:acme/api.git", "master")
//!     .await?;
//! let tag = Git::new(runner).get_last_tag(copy.path()).await?;
//! println!("last tag: {}", tag);
//! # Ok(())
//! # }
//! ```

pub mod docker;
pub mod error;
pub mod git;
pub mod pristine;
pub mod provider;

pub use docker::{Docker, local_image};
pub use error::{RepoError, Result};
pub use git::{Git, ORIGIN};
pub use pristine::{DEFAULT_TRUNK, PristineStore, RepositorySource, WorkingCopy};
pub use provider::{Branch, BranchCommit, GitHubProvider, GitProvider, ProviderUser, get_git_provider};
