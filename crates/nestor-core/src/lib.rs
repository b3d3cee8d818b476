//! Nestor Core - Core types and utilities for the deployment orchestrator
//!
//! This crate provides the foundational pieces used throughout Nestor:
//! - `Settings`: Runtime settings read once from the environment
//! - `Values`: Raw configuration documents with deep merge and `{{var}}` references
//! - `AppConfig` / `ProjectConfig`: Typed configuration model
//! - `ConfigResolver`: Loads and resolves project and application configuration
//! - `CommandRunner`: Async shell-command execution (real and mock)

pub mod config;
pub mod error;
pub mod exec;
pub mod resolver;
pub mod schema;
pub mod settings;
pub mod values;
pub mod workspace;

pub use config::{
    AffinityConfig, AppConfig, CronConfig, DockerConfig, ProbeConfig, ProbeSettings, Process,
    ProjectConfig, RegistryConfig, RegistrySelector, ScaleConfig, SecretRef, Variables,
};
pub use error::{CoreError, Result, ValidationErrorInfo};
pub use exec::{CommandRunner, MockRunner, ShellCommand, ShellRunner};
pub use resolver::ConfigResolver;
pub use schema::AppSchemaValidator;
pub use settings::Settings;
pub use values::Values;
