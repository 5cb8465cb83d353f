//! CLI error types.

use std::path::PathBuf;

use resumedl::error::{ConfigError, DownloadError};
use thiserror::Error;

/// Errors surfaced to the user by the `resumedl` binary.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("config file not found: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("failed to set signal handler: {0}")]
    Signal(String),

    #[error("invalid progress template: {0}")]
    Progress(String),

    #[error("{failed} of {total} downloads did not complete")]
    Incomplete { failed: usize, total: usize },
}
