//! Options shared by every subcommand and config resolution.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args};
use resumedl::config::{config_file_path, ManagerConfig};

use crate::error::CliError;

/// Global options, accepted before or after the subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Configuration file (defaults to the per-user config.ini if present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for partial and finished files
    #[arg(long, global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Credential appended to every request
    #[arg(long, global = true, value_name = "KEY", env = "RESUMEDL_API_KEY")]
    pub api_key: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub connect_timeout_ms: Option<u64>,

    /// Read timeout in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub read_timeout_ms: Option<u64>,

    /// Allow plain http:// identifiers
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Builds the manager configuration: defaults, then the config file, then flags.
pub fn resolve_config(args: &GlobalArgs) -> Result<ManagerConfig, CliError> {
    let mut config = match &args.config {
        Some(path) if !path.exists() => return Err(CliError::ConfigMissing(path.clone())),
        Some(path) => ManagerConfig::from_ini_file(path)?,
        None => {
            let default_path = config_file_path();
            if default_path.exists() {
                ManagerConfig::from_ini_file(&default_path)?
            } else {
                ManagerConfig::default()
            }
        }
    };

    if let Some(dir) = &args.dir {
        config = config.with_download_dir(dir.clone());
    }
    if let Some(key) = &args.api_key {
        config = config.with_credential(key.clone());
    }
    if let Some(ms) = args.connect_timeout_ms {
        config = config.with_connect_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = args.read_timeout_ms {
        config = config.with_read_timeout(Duration::from_millis(ms));
    }
    if args.insecure {
        config = config.with_allow_insecure(true);
    }

    Ok(config)
}
