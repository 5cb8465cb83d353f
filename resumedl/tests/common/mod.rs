//! Shared helpers for integration tests: a scripted transport and event waits.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, oneshot};

use resumedl::download::{
    BodyStream, BoxFuture, DownloadEvent, ProgressEvent, TransferRequest, TransferResponse,
    Transport, TransportFailure,
};
use resumedl::{JobResult, TransportErrorKind};

/// How long any single wait in a test may take.
pub const WAIT: Duration = Duration::from_secs(5);

/// One scripted reply to `open`.
pub enum Script {
    Respond(Scripted),
    Fail(TransportFailure),
    /// `open` never completes.
    Hang,
}

/// A response whose body is served from memory.
pub struct Scripted {
    pub status: u16,
    pub reason: &'static str,
    pub content_length: Option<u64>,
    pub total_length: Option<u64>,
    pub chunks: Vec<Vec<u8>>,
    /// Body yields nothing until this fires.
    pub gate: Option<oneshot::Receiver<()>>,
    /// After the chunks, the body never ends.
    pub stall: bool,
    /// After the chunks, the body fails with this.
    pub error: Option<TransportFailure>,
}

impl Scripted {
    /// 200 with `Content-Length` and `body` split into `chunk`-byte pieces.
    pub fn ok(body: &[u8], chunk: usize) -> Self {
        Self {
            status: 200,
            reason: "OK",
            content_length: Some(body.len() as u64),
            total_length: None,
            chunks: body.chunks(chunk).map(<[u8]>::to_vec).collect(),
            gate: None,
            stall: false,
            error: None,
        }
    }

    /// 206 carrying `rest`, the remainder after a resume.
    pub fn partial(rest: &[u8], chunk: usize) -> Self {
        Self {
            status: 206,
            reason: "Partial Content",
            ..Self::ok(rest, chunk)
        }
    }

    /// A body-less response with the given status.
    pub fn status(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            content_length: Some(0),
            ..Self::ok(&[], 1)
        }
    }

    pub fn without_length(mut self) -> Self {
        self.content_length = None;
        self
    }

    pub fn with_content_length(mut self, len: u64) -> Self {
        self.content_length = Some(len);
        self
    }

    pub fn with_total_length(mut self, total: u64) -> Self {
        self.total_length = Some(total);
        self
    }

    /// Serve only the first `n` chunks.
    pub fn truncated(mut self, n: usize) -> Self {
        self.chunks.truncate(n);
        self
    }

    /// Serve the first `n` chunks, then block forever.
    pub fn stalled_after(mut self, n: usize) -> Self {
        self.chunks.truncate(n);
        self.stall = true;
        self
    }

    /// Serve the first `n` chunks, then fail.
    pub fn failing_after(mut self, n: usize, failure: TransportFailure) -> Self {
        self.chunks.truncate(n);
        self.error = Some(failure);
        self
    }

    /// Hold the body back until the returned sender fires.
    pub fn gated(mut self) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        self.gate = Some(rx);
        (self, tx)
    }

    fn into_response(self) -> TransferResponse {
        let gate = self.gate;
        let held = stream::once(async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
        })
        .filter_map(|()| async { None::<Result<Bytes, TransportFailure>> });

        let chunks = stream::iter(self.chunks.into_iter().map(|c| Ok(Bytes::from(c))));

        let tail: BodyStream = match (self.error, self.stall) {
            (Some(failure), _) => stream::once(async move { Err(failure) }).boxed(),
            (None, true) => stream::pending().boxed(),
            (None, false) => stream::empty().boxed(),
        };

        TransferResponse {
            status: self.status,
            reason: self.reason.to_string(),
            content_length: self.content_length,
            total_length: self.total_length,
            body: held.chain(chunks).chain(tail).boxed(),
        }
    }
}

#[derive(Default)]
struct Shared {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<TransferRequest>>,
}

/// Transport replaying queued scripts in order and recording every request.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    shared: Arc<Shared>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, script: Script) {
        self.shared.scripts.lock().unwrap().push_back(script);
    }

    pub fn respond(&self, scripted: Scripted) {
        self.push(Script::Respond(scripted));
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        self.shared.requests.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.shared.requests.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn open<'a>(
        &'a self,
        request: &'a TransferRequest,
    ) -> BoxFuture<'a, Result<TransferResponse, TransportFailure>> {
        self.shared.requests.lock().unwrap().push(request.clone());
        let script = self.shared.scripts.lock().unwrap().pop_front();

        Box::pin(async move {
            match script {
                Some(Script::Respond(scripted)) => Ok(scripted.into_response()),
                Some(Script::Fail(failure)) => Err(failure),
                Some(Script::Hang) => futures::future::pending().await,
                None => Err(TransportFailure::new(
                    TransportErrorKind::Connect,
                    "no scripted response",
                )),
            }
        })
    }
}

/// Deterministic test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Next event, failing the test if none arrives in time.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<DownloadEvent>) -> DownloadEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Collects progress for `id` until its `Finished` event.
pub async fn wait_finished(
    rx: &mut mpsc::UnboundedReceiver<DownloadEvent>,
    id: &str,
) -> (Vec<ProgressEvent>, JobResult) {
    let mut progress = Vec::new();
    loop {
        match next_event(rx).await {
            DownloadEvent::Progress(event) if event.id == id => progress.push(event),
            DownloadEvent::Finished(result) if result.id == id => return (progress, result),
            _ => {}
        }
    }
}

/// Waits for a progress event for `id` with at least `value`.
pub async fn wait_progress(
    rx: &mut mpsc::UnboundedReceiver<DownloadEvent>,
    id: &str,
    value: u8,
) {
    loop {
        if let DownloadEvent::Progress(event) = next_event(rx).await {
            if event.id == id && event.signal.value() >= value {
                return;
            }
        }
    }
}
