//! CLI commands

pub mod advance;
pub mod build;
pub mod init;
pub mod next_step;
pub mod ready;
pub mod template;

// Cluster commands
pub mod deploy;
pub mod status;
