//! Download manager: admission, the single worker lane and idle teardown.
//!
//! # Locking
//!
//! Two locks, always taken in this order:
//!
//! 1. `observed` - whether a client is attached
//! 2. `lane` - the job registry plus the lane's sending half
//!
//! Admission, cancellation and queries take only `lane`. The shutdown check
//! takes both, so an `attach` racing a job completion either lands before the
//! check (and prevents teardown) or after the lane is already closed.
//!
//! # Teardown
//!
//! When a job finishes, or an observer detaches, the manager tears down if no
//! observer is attached and the registry holds nothing live (or only the job
//! that just finished). Teardown closes the lane to new work, lets the worker
//! exit, and publishes [`DownloadEvent::TeardownRequested`] exactly once.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{DownloadEvent, EventSink};
use super::registry::{JobHandle, JobRegistry};
use super::staging::FileStager;
use super::transport::{HttpTransport, Transport};
use super::worker::{JobResult, TransferWorker};
use crate::config::ManagerConfig;
use crate::error::{DownloadError, DownloadResult};

/// Registry and lane entry, guarded together.
struct Lane {
    registry: JobRegistry,
    queue: Option<mpsc::UnboundedSender<Arc<JobHandle>>>,
}

struct Inner<T> {
    observed: Mutex<bool>,
    lane: Mutex<Lane>,
    worker: TransferWorker<T>,
    events: EventSink,
    closed: CancellationToken,
}

impl<T: Transport> Inner<T> {
    /// Publishes a finished job (if any) and tears down when idle and unobserved.
    fn evaluate_teardown(&self, finished: Option<(&Arc<JobHandle>, JobResult)>) {
        let observed = self.observed.lock();
        let mut lane = self.lane.lock();

        let finished_handle = finished.map(|(handle, result)| {
            self.events.finished(result);
            handle
        });

        lane.registry.reap();
        let drained = match finished_handle {
            Some(handle) => lane.registry.is_drained_except(handle),
            None => lane.registry.is_empty(),
        };

        if *observed || !drained || lane.queue.is_none() {
            return;
        }

        lane.queue = None;
        self.closed.cancel();
        self.events.teardown();
        info!("No observer and no pending work, tearing down download lane");
    }

    /// Closes the lane and cancels every live job.
    fn close(&self) -> usize {
        let mut lane = self.lane.lock();
        lane.queue = None;
        self.closed.cancel();
        lane.registry.cancel_all()
    }
}

/// Owns the job registry and the single worker lane.
///
/// Must be created inside a Tokio runtime. Dropping the manager cancels all
/// live jobs and closes the lane without waiting for the worker.
pub struct DownloadManager<T: Transport = HttpTransport> {
    inner: Arc<Inner<T>>,
    worker_task: Mutex<Option<JoinHandle<()>>>,
}

impl DownloadManager<HttpTransport> {
    /// Start a manager using the `reqwest` transport.
    pub fn start(
        config: ManagerConfig,
    ) -> DownloadResult<(Self, mpsc::UnboundedReceiver<DownloadEvent>)> {
        let transport = HttpTransport::new(config.connect_timeout)
            .map_err(|failure| DownloadError::Client(failure.message))?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> DownloadManager<T> {
    /// Start a manager on top of `transport`.
    ///
    /// Returns the manager and the receiver for progress, completion and
    /// teardown events.
    pub fn with_transport(
        config: ManagerConfig,
        transport: T,
    ) -> (Self, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (events, events_rx) = EventSink::channel();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            observed: Mutex::new(false),
            lane: Mutex::new(Lane {
                registry: JobRegistry::new(),
                queue: Some(queue_tx),
            }),
            worker: TransferWorker::from_config(&config, transport),
            events,
            closed: CancellationToken::new(),
        });

        let worker_task = tokio::spawn(run_lane(Arc::clone(&inner), queue_rx));
        info!(dir = %config.download_dir.display(), "Download manager started");

        (
            Self {
                inner,
                worker_task: Mutex::new(Some(worker_task)),
            },
            events_rx,
        )
    }

    /// Queues `id` for download.
    ///
    /// Returns false if `id` is already live, has no derivable file name, or
    /// the manager has torn down.
    pub fn enqueue(&self, id: &str) -> bool {
        if let Err(e) = self.inner.worker.stager().final_path_for(id) {
            warn!(id = %id, error = %e, "Rejected job");
            return false;
        }

        let mut lane = self.inner.lane.lock();
        let Some(queue) = lane.queue.clone() else {
            debug!(id = %id, "Rejected job, lane is closed");
            return false;
        };

        let Some(handle) = lane.registry.admit(id) else {
            return false;
        };

        if queue.send(handle).is_err() {
            lane.registry.remove(id);
            warn!(id = %id, "Rejected job, worker lane is gone");
            return false;
        }

        debug!(id = %id, live = lane.registry.len(), "Admitted job");
        true
    }

    /// Raises cancellation for a live job.
    pub fn cancel(&self, id: &str) -> bool {
        let cancelled = self.inner.lane.lock().registry.cancel(id);
        if cancelled {
            debug!(id = %id, "Cancellation requested");
        }
        cancelled
    }

    /// Whether a live job exists for `id`.
    pub fn is_queued(&self, id: &str) -> bool {
        self.inner.lane.lock().registry.is_queued(id)
    }

    /// Identifiers of all live jobs.
    pub fn live_jobs(&self) -> Vec<String> {
        let mut lane = self.inner.lane.lock();
        lane.registry.reap();
        lane.registry.ids()
    }

    /// Marks a client as attached; teardown is suppressed while attached.
    pub fn attach(&self) {
        *self.inner.observed.lock() = true;
        debug!("Observer attached");
    }

    /// Marks the client as gone; tears down right away if nothing is live.
    pub fn detach(&self) {
        *self.inner.observed.lock() = false;
        debug!("Observer detached");
        self.inner.evaluate_teardown(None);
    }

    pub fn is_observed(&self) -> bool {
        *self.inner.observed.lock()
    }

    /// Whether the lane has been closed to new work.
    pub fn is_torn_down(&self) -> bool {
        self.inner.lane.lock().queue.is_none()
    }

    /// Resolves once the lane has been closed.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    /// The stager, for inspecting local files.
    pub fn stager(&self) -> &FileStager {
        self.inner.worker.stager()
    }

    /// Cancels every live job, closes the lane and waits for the worker.
    pub async fn shutdown(&self) {
        let cancelled = self.inner.close();
        info!(cancelled, "Shutting down download manager");

        let task = self.worker_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Download lane ended abnormally");
            }
        }
    }
}

impl<T: Transport> Drop for DownloadManager<T> {
    fn drop(&mut self) {
        self.inner.close();
    }
}

async fn run_lane<T: Transport>(
    inner: Arc<Inner<T>>,
    mut queue: mpsc::UnboundedReceiver<Arc<JobHandle>>,
) {
    info!("Download lane started");

    while let Some(handle) = queue.recv().await {
        let id = handle.id();
        let result = if handle.start() {
            inner
                .worker
                .run(id, handle.cancellation(), &inner.events)
                .await
        } else {
            debug!(id = %id, "Skipping job cancelled before start");
            JobResult::cancelled_before_start(id)
        };

        handle.finish(result.clone());
        inner.evaluate_teardown(Some((&handle, result)));
    }

    info!("Download lane stopped");
}
