//! resumedl CLI - Command-line interface
//!
//! This binary drives the resumedl library: queue downloads, watch progress
//! and inspect partial files.

mod commands;
mod error;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use resumedl::config::config_file_path;
use tracing_subscriber::EnvFilter;

use commands::common::{resolve_config, GlobalArgs};
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "resumedl", version, about = "Resumable HTTPS downloads")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download one or more identifiers, resuming any partial files
    Get {
        /// Download URLs
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show the local state of one or more identifiers
    Status {
        /// Download URLs
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show the configuration file path
    ConfigPath,
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,reqwest=warn", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Get { ids } => {
            let config = resolve_config(&cli.global)?;
            commands::get::run(config, ids).await
        }
        Commands::Status { ids } => {
            let config = resolve_config(&cli.global)?;
            commands::status::run(&config, &ids).await
        }
        Commands::ConfigPath => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
