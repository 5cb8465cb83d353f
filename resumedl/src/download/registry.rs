//! Job registry: one live handle per identifier.
//!
//! The registry is plain data; the manager keeps it behind its own lock so
//! that admission, cancellation and the shutdown check share one critical
//! section. Terminal handles are dropped lazily by [`JobRegistry::reap`],
//! which every operation runs first.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::worker::JobResult;

/// Lifecycle of a job handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    /// Succeeded, failed or cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// An admitted transfer.
#[derive(Debug)]
pub struct JobHandle {
    id: String,
    cancel: CancellationToken,
    state: Mutex<JobState>,
    result: Mutex<Option<JobResult>>,
}

impl JobHandle {
    pub(crate) fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            cancel: CancellationToken::new(),
            state: Mutex::new(JobState::Pending),
            result: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Result summary, once the worker has finished with this job.
    pub fn result(&self) -> Option<JobResult> {
        self.result.lock().clone()
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Raises the cancellation signal.
    ///
    /// A job still waiting for the lane becomes `Cancelled` at once. A running
    /// job stays live until the worker has closed its files. Returns false if
    /// the job is already terminal or was already asked to stop.
    pub(crate) fn request_cancel(&self) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() || self.cancel.is_cancelled() {
            return false;
        }
        self.cancel.cancel();
        if *state == JobState::Pending {
            *state = JobState::Cancelled;
        }
        true
    }

    /// Moves a pending job to running. False if it was cancelled meanwhile.
    pub(crate) fn start(&self) -> bool {
        let mut state = self.state.lock();
        if *state != JobState::Pending || self.cancel.is_cancelled() {
            return false;
        }
        *state = JobState::Running;
        true
    }

    /// Records the worker's verdict and makes the handle terminal.
    pub(crate) fn finish(&self, result: JobResult) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = result.outcome.terminal_state();
        }
        *self.result.lock() = Some(result);
    }
}

/// Map of identifier to live job handle.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: HashMap<String, Arc<JobHandle>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits `id` unless a live handle for it exists.
    pub fn admit(&mut self, id: &str) -> Option<Arc<JobHandle>> {
        self.reap();
        if self.jobs.contains_key(id) {
            debug!(id = %id, "Rejected duplicate job");
            return None;
        }
        let handle = JobHandle::new(id);
        self.jobs.insert(id.to_string(), Arc::clone(&handle));
        Some(handle)
    }

    /// Raises cancellation on the live handle for `id`.
    pub fn cancel(&mut self, id: &str) -> bool {
        let raised = match self.jobs.get(id) {
            Some(handle) => handle.request_cancel(),
            None => false,
        };
        self.reap();
        raised
    }

    /// Whether a live handle exists for `id`.
    pub fn is_queued(&mut self, id: &str) -> bool {
        self.reap();
        self.jobs.contains_key(id)
    }

    /// Drops every terminal handle; returns whether the registry is now empty.
    pub fn reap(&mut self) -> bool {
        self.jobs.retain(|_, handle| !handle.is_terminal());
        self.jobs.is_empty()
    }

    /// Removes `id` regardless of state.
    pub(crate) fn remove(&mut self, id: &str) -> Option<Arc<JobHandle>> {
        self.jobs.remove(id)
    }

    /// True if the registry holds nothing, or only `handle` itself.
    ///
    /// A different handle admitted under the same identifier is live work.
    pub fn is_drained_except(&self, handle: &Arc<JobHandle>) -> bool {
        match self.jobs.len() {
            0 => true,
            1 => self
                .jobs
                .get(handle.id())
                .is_some_and(|live| Arc::ptr_eq(live, handle)),
            _ => false,
        }
    }

    /// Raises cancellation on every live handle; returns how many were raised.
    pub fn cancel_all(&mut self) -> usize {
        let raised = self
            .jobs
            .values()
            .filter(|handle| handle.request_cancel())
            .count();
        self.reap();
        raised
    }

    /// Identifiers of live handles.
    pub fn ids(&self) -> Vec<String> {
        self.jobs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
