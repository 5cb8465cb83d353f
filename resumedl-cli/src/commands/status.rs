//! `status` command: report what is on disk for each identifier.

use resumedl::config::ManagerConfig;
use resumedl::download::{FileStager, LocalState};

use crate::error::CliError;

/// Run the status command.
pub async fn run(config: &ManagerConfig, ids: &[String]) -> Result<(), CliError> {
    let stager = FileStager::new(config.download_dir.clone());
    println!("Download directory: {}", stager.dir().display());

    for id in ids {
        match stager.local_state(id).await {
            Ok(LocalState::Complete) => println!("  {}  complete", id),
            Ok(LocalState::Partial(bytes)) => println!("  {}  partial ({} bytes)", id, bytes),
            Ok(LocalState::Absent) => println!("  {}  not started", id),
            Err(e) => println!("  {}  invalid: {}", id, e),
        }
    }
    Ok(())
}
