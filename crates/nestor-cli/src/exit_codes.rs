//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

#![allow(dead_code)]

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - project or application configuration unusable
pub const CONFIG_ERROR: i32 = 2;

/// Template error - manifest rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Workflow error - at least one application failed while the others went on
pub const WORKFLOW_ERROR: i32 = 6;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
