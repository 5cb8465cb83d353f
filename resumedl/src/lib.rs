//! resumedl - resumable HTTPS downloads on a single worker lane
//!
//! Clients enqueue, cancel and query downloads of large files. Each transfer
//! streams into `<name>.partial` and is renamed to `<name>` once complete, so
//! an interrupted transfer resumes from the bytes already on disk. The manager
//! tears itself down once no client is attached and no work remains.

pub mod config;
pub mod download;
pub mod error;

pub use config::ManagerConfig;
pub use download::{DownloadEvent, DownloadManager, JobOutcome, JobResult};
pub use error::{DownloadError, DownloadResult, FailureKind, TransportErrorKind};
