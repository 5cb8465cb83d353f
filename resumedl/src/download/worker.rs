//! Transfer worker: one HTTP GET streamed into a partial file.
//!
//! ```text
//! Idle ─► Connecting ─► Streaming ─► Committing ─► Done
//!             │             │             │
//!             └─────────────┴─────────────┴──► Failed | Cancelled
//! ```
//!
//! The worker never returns an error. Every attempt ends in a [`JobResult`]
//! carrying the status code (−1 when no response arrived) and a message.
//! Files are flushed and closed on every path before a commit is considered,
//! and the partial file is never removed by the worker.

use std::fmt;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Url;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::EventSink;
use super::progress::ProgressTracker;
use super::registry::JobState;
use super::staging::{FileStager, StagedWriter};
use super::transport::{BodyStream, TransferRequest, TransferResponse, Transport, TransportFailure};
use crate::config::ManagerConfig;
use crate::error::{DownloadError, DownloadResult, FailureKind, TransportErrorKind};

/// Status code reported when no response was obtained.
pub const NO_STATUS: i32 = -1;

/// States of a single transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Connecting,
    Streaming,
    Committing,
    Done,
    Failed,
    Cancelled,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(FailureKind),
    Cancelled,
}

impl JobOutcome {
    pub(crate) fn terminal_state(&self) -> JobState {
        match self {
            Self::Succeeded => JobState::Succeeded,
            Self::Failed(_) => JobState::Failed,
            Self::Cancelled => JobState::Cancelled,
        }
    }
}

/// Summary kept for a job once it is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub id: String,
    /// HTTP status, or [`NO_STATUS`].
    pub status_code: i32,
    pub message: String,
    pub outcome: JobOutcome,
    /// Bytes in the partial or final file when the attempt ended.
    pub bytes_on_disk: u64,
}

impl JobResult {
    /// Result for a job cancelled before the lane reached it.
    pub fn cancelled_before_start(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status_code: NO_STATUS,
            message: "cancelled before start".to_string(),
            outcome: JobOutcome::Cancelled,
            bytes_on_disk: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == JobOutcome::Succeeded
    }
}

/// Request-shaping settings taken from [`ManagerConfig`].
#[derive(Clone)]
pub struct TransferSettings {
    pub credential: Option<String>,
    pub credential_param: String,
    pub accept: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub allow_insecure: bool,
}

impl fmt::Debug for TransferSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferSettings")
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("credential_param", &self.credential_param)
            .field("accept", &self.accept)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("allow_insecure", &self.allow_insecure)
            .finish()
    }
}

impl From<&ManagerConfig> for TransferSettings {
    fn from(config: &ManagerConfig) -> Self {
        Self {
            credential: config.credential.clone(),
            credential_param: config.credential_param.clone(),
            accept: config.accept.clone(),
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            allow_insecure: config.allow_insecure,
        }
    }
}

/// Why an attempt stopped early.
enum Stop {
    Cancelled,
    Failed(DownloadError),
}

impl From<DownloadError> for Stop {
    fn from(err: DownloadError) -> Self {
        Self::Failed(err)
    }
}

/// Bookkeeping for one attempt, read when building the result.
struct Attempt<'a> {
    id: &'a str,
    state: TransferState,
    status: Option<(u16, String)>,
    bytes_on_disk: u64,
}

impl<'a> Attempt<'a> {
    fn new(id: &'a str) -> Self {
        Self {
            id,
            state: TransferState::Idle,
            status: None,
            bytes_on_disk: 0,
        }
    }

    fn enter(&mut self, state: TransferState) {
        debug!(id = %self.id, from = %self.state, to = %state, "Transfer state change");
        self.state = state;
    }
}

/// Executes transfers one at a time.
#[derive(Debug)]
pub struct TransferWorker<T> {
    transport: T,
    stager: FileStager,
    settings: TransferSettings,
}

impl<T: Transport> TransferWorker<T> {
    pub fn new(transport: T, stager: FileStager, settings: TransferSettings) -> Self {
        Self {
            transport,
            stager,
            settings,
        }
    }

    /// Build a worker writing into `config.download_dir`.
    pub fn from_config(config: &ManagerConfig, transport: T) -> Self {
        let stager =
            FileStager::new(config.download_dir.clone()).with_buffer_size(config.buffer_size);
        Self::new(transport, stager, TransferSettings::from(config))
    }

    pub fn stager(&self) -> &FileStager {
        &self.stager
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Builds the request for `id`, resuming from `offset` when non-zero.
    pub fn request_for(&self, id: &str, offset: u64) -> DownloadResult<TransferRequest> {
        let malformed = |reason: String| DownloadError::Transport {
            url: id.to_string(),
            kind: TransportErrorKind::MalformedAddress,
            reason,
        };

        let mut url = Url::parse(id).map_err(|e| malformed(e.to_string()))?;
        match url.scheme() {
            "https" => {}
            "http" if self.settings.allow_insecure => {}
            other => return Err(malformed(format!("scheme '{}' not allowed", other))),
        }

        if let Some(credential) = &self.settings.credential {
            url.query_pairs_mut()
                .append_pair(&self.settings.credential_param, credential);
        }

        let mut request = TransferRequest::get(url)
            .accept(&self.settings.accept)
            .timeouts(self.settings.connect_timeout, self.settings.read_timeout);
        if offset > 0 {
            request = request.range_from(offset);
        }
        Ok(request)
    }

    /// Runs one attempt for `id` to a terminal result.
    pub async fn run(&self, id: &str, cancel: &CancellationToken, events: &EventSink) -> JobResult {
        let mut attempt = Attempt::new(id);
        let verdict = self.execute(&mut attempt, cancel, events).await;

        let status_code = attempt
            .status
            .as_ref()
            .map(|(code, _)| i32::from(*code))
            .unwrap_or(NO_STATUS);

        let (outcome, message) = match verdict {
            Ok(()) => {
                attempt.enter(TransferState::Done);
                info!(id = %id, bytes = attempt.bytes_on_disk, "Download complete");
                let message = attempt
                    .status
                    .take()
                    .map(|(_, reason)| reason)
                    .unwrap_or_default();
                (JobOutcome::Succeeded, message)
            }
            Err(Stop::Cancelled) => {
                attempt.enter(TransferState::Cancelled);
                info!(id = %id, bytes = attempt.bytes_on_disk, "Download cancelled");
                (JobOutcome::Cancelled, "cancelled".to_string())
            }
            Err(Stop::Failed(err)) => {
                attempt.enter(TransferState::Failed);
                log_failure(id, &err);
                (JobOutcome::Failed(err.kind()), err.to_string())
            }
        };

        JobResult {
            id: id.to_string(),
            status_code,
            message,
            outcome,
            bytes_on_disk: attempt.bytes_on_disk,
        }
    }

    async fn execute(
        &self,
        attempt: &mut Attempt<'_>,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> Result<(), Stop> {
        let id = attempt.id;
        attempt.enter(TransferState::Connecting);

        // Naming problems surface before any I/O.
        self.stager.partial_path_for(id)?;
        let resume_from = self.stager.existing_bytes(id).await.unwrap_or(0);
        attempt.bytes_on_disk = resume_from;

        let request = self.request_for(id, resume_from)?;
        if resume_from > 0 {
            debug!(id = %id, offset = resume_from, "Requesting resume");
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Stop::Cancelled),
            opened = timeout(request.connect_timeout, self.transport.open(&request)) => match opened {
                Err(_) => {
                    return Err(timed_out(id, "connect", request.connect_timeout).into());
                }
                Ok(Err(failure)) => return Err(transport_error(id, failure).into()),
                Ok(Ok(response)) => response,
            },
        };

        let TransferResponse {
            status,
            reason,
            content_length,
            total_length,
            body,
        } = response;
        attempt.status = Some((status, reason.clone()));

        let append = match status {
            200 => {
                if resume_from > 0 {
                    warn!(id = %id, offset = resume_from, "Server ignored range, restarting from zero");
                }
                false
            }
            206 => true,
            416 => return self.settle_unsatisfiable(attempt, resume_from, total_length).await,
            404 | 410 => {
                return Err(DownloadError::NotFound {
                    url: id.to_string(),
                }
                .into())
            }
            _ => {
                return Err(DownloadError::HttpStatus {
                    url: id.to_string(),
                    status,
                    reason,
                }
                .into())
            }
        };

        // A ranged response discloses only the remainder.
        let declared = if append {
            total_length.or(content_length.map(|len| len + resume_from))
        } else {
            content_length
        };

        if append && resume_from > 0 {
            match declared {
                Some(length) if resume_from > length => {
                    return Err(DownloadError::SizeMismatch {
                        url: id.to_string(),
                        offset: resume_from,
                        length,
                    }
                    .into());
                }
                None => {
                    warn!(id = %id, offset = resume_from, "Content length unknown, cannot validate resume offset");
                }
                _ => {}
            }
        }

        let (offset, mut writer) = self.stager.open_for_write(id, append).await?;
        attempt.bytes_on_disk = offset;
        attempt.enter(TransferState::Streaming);

        let mut tracker = ProgressTracker::new(declared);
        let streamed = self
            .stream_body(id, body, &mut writer, offset, &mut tracker, cancel, events, request.read_timeout)
            .await;

        let received = offset + writer.written();
        attempt.bytes_on_disk = received;
        let closed = writer.close().await;

        if let Err(stop) = streamed {
            if let Err(close_err) = closed {
                warn!(id = %id, error = %close_err, "Failed to close partial file after interruption");
            }
            return Err(stop);
        }
        closed?;

        attempt.enter(TransferState::Committing);
        if self.stager.commit(id, received, declared).await? {
            Ok(())
        } else {
            Err(DownloadError::Incomplete {
                url: id.to_string(),
                received,
                expected: declared.unwrap_or_default(),
            }
            .into())
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_body(
        &self,
        id: &str,
        mut body: BodyStream,
        writer: &mut StagedWriter,
        offset: u64,
        tracker: &mut ProgressTracker,
        cancel: &CancellationToken,
        events: &EventSink,
        read_timeout: Duration,
    ) -> Result<(), Stop> {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Stop::Cancelled),
                next = timeout(read_timeout, body.next()) => next,
            };

            let chunk = match next {
                Err(_) => return Err(timed_out(id, "read", read_timeout).into()),
                Ok(None) => return Ok(()),
                Ok(Some(Err(failure))) => return Err(transport_error(id, failure).into()),
                Ok(Some(Ok(chunk))) => chunk,
            };

            writer.write_chunk(&chunk).await?;

            if let Some(signal) = tracker.update(offset + writer.written()) {
                events.progress(id, signal);
            }
        }
    }

    /// Handles 416: the partial file is already as long as, or longer than, the resource.
    async fn settle_unsatisfiable(
        &self,
        attempt: &mut Attempt<'_>,
        resume_from: u64,
        total_length: Option<u64>,
    ) -> Result<(), Stop> {
        let id = attempt.id;
        match total_length {
            Some(length) if resume_from > length => Err(DownloadError::SizeMismatch {
                url: id.to_string(),
                offset: resume_from,
                length,
            }
            .into()),
            Some(length) if resume_from == length && length > 0 => {
                debug!(id = %id, length, "Partial file already complete");
                attempt.enter(TransferState::Committing);
                self.stager.commit(id, resume_from, Some(length)).await?;
                Ok(())
            }
            _ => Err(DownloadError::HttpStatus {
                url: id.to_string(),
                status: 416,
                reason: "Range Not Satisfiable".to_string(),
            }
            .into()),
        }
    }
}

fn timed_out(id: &str, phase: &str, limit: Duration) -> DownloadError {
    DownloadError::Transport {
        url: id.to_string(),
        kind: TransportErrorKind::Timeout,
        reason: format!("{} timed out after {}ms", phase, limit.as_millis()),
    }
}

fn transport_error(id: &str, failure: TransportFailure) -> DownloadError {
    DownloadError::Transport {
        url: id.to_string(),
        kind: failure.kind,
        reason: failure.message,
    }
}

fn log_failure(id: &str, err: &DownloadError) {
    match err {
        DownloadError::NotFound { .. } => info!(id = %id, "No resource found"),
        DownloadError::SizeMismatch { offset, length, .. } => {
            warn!(id = %id, offset, length, "Partial file larger than resource")
        }
        DownloadError::Incomplete {
            received, expected, ..
        } => warn!(
            id = %id,
            received,
            expected,
            "Received length differs from declared length, partial file kept"
        ),
        other => error!(id = %id, error = %other, "Download failed"),
    }
}
