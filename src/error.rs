// ABOUTME: Application-wide error types for hotswap.
// ABOUTME: Uses thiserror for ergonomic error handling and maps errors to exit codes.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;
use crate::runtime::{ContainerError, RuntimeError};

/// Exit code for a successful release.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for any failure that left the previous production instance serving.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code when the previous production instance was lost and an operator must act.
pub const EXIT_MANUAL_INTERVENTION: i32 = 3;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("home directory unknown; set HOME or configure state_dir")]
    NoStateDir,

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("container operation failed: {0}")]
    Container(#[from] ContainerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Process exit code callers should see for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Deploy(e) => e.exit_code(),
            _ => EXIT_FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
