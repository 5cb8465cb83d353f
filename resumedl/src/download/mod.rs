//! Resumable download manager.
//!
//! This module provides:
//! - Partial-file staging and atomic commit (`staging`)
//! - Change-only progress reporting (`progress`)
//! - The HTTP transport seam (`transport`)
//! - The single-transfer state machine (`worker`)
//! - Live-job bookkeeping (`registry`)
//! - The orchestrator with idle teardown (`manager`)
//!
//! # Architecture
//!
//! ```text
//! client ──enqueue/cancel/is_queued/attach/detach──► DownloadManager
//!                                                        │
//!                     JobRegistry ◄──── admit / reap ────┤
//!                                                        │ single lane
//!                                                        ▼
//!                                                  TransferWorker
//!                                                   │         │
//!                                  Transport (HTTP) ┘         └ FileStager
//!                                                        │
//! client ◄──── DownloadEvent (Progress / Finished / TeardownRequested)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use resumedl::config::ManagerConfig;
//! use resumedl::download::{DownloadEvent, DownloadManager};
//!
//! let config = ManagerConfig::new("/home/me/Videos").with_credential(api_key);
//! let (manager, mut events) = DownloadManager::start(config)?;
//!
//! manager.attach();
//! manager.enqueue("https://cdn.example.com/videos/episode-12.mp4");
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         DownloadEvent::Progress(p) => println!("{} {}%", p.id, p.signal.value()),
//!         DownloadEvent::Finished(result) => {
//!             println!("{} -> {}", result.id, result.status_code);
//!             manager.detach();
//!         }
//!         DownloadEvent::TeardownRequested => break,
//!     }
//! }
//! ```

mod events;
mod manager;
mod progress;
mod registry;
mod staging;
mod transport;
mod worker;

pub use events::{DownloadEvent, EventSink};
pub use manager::DownloadManager;
pub use progress::{
    activity_level, percent_of, ProgressEvent, ProgressSignal, ProgressTracker, ACTIVITY_STEP,
};
pub use registry::{JobHandle, JobRegistry, JobState};
pub use staging::{file_name_for, FileStager, LocalState, StagedWriter, PARTIAL_SUFFIX};
pub use transport::{
    parse_content_range_total, BodyStream, BoxFuture, HttpTransport, TransferRequest,
    TransferResponse, Transport, TransportFailure,
};
pub use worker::{
    JobOutcome, JobResult, TransferSettings, TransferState, TransferWorker, NO_STATUS,
};
