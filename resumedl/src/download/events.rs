//! Events published by the manager to its observer.

use tokio::sync::mpsc;

use super::progress::{ProgressEvent, ProgressSignal};
use super::worker::JobResult;

/// Everything an observer can hear from the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Progress for the running transfer.
    Progress(ProgressEvent),
    /// A job reached a terminal state.
    Finished(JobResult),
    /// No observer is attached and no work remains; the lane is closing.
    TeardownRequested,
}

/// Sending half of the event channel.
///
/// Sends never block and are dropped silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<DownloadEvent>,
}

impl EventSink {
    /// Creates a sink and the receiver the observer reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn progress(&self, id: &str, signal: ProgressSignal) {
        self.send(DownloadEvent::Progress(ProgressEvent {
            id: id.to_string(),
            signal,
        }));
    }

    pub fn finished(&self, result: JobResult) {
        self.send(DownloadEvent::Finished(result));
    }

    pub fn teardown(&self) {
        self.send(DownloadEvent::TeardownRequested);
    }

    fn send(&self, event: DownloadEvent) {
        let _ = self.tx.send(event);
    }
}
