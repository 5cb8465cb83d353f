//! Transfer worker behavior against a scripted transport.

mod common;

use std::time::Duration;

use reqwest::header::{ACCEPT, RANGE};
use tokio_util::sync::CancellationToken;

use common::{payload, Script, Scripted, ScriptedTransport};
use resumedl::config::{ManagerConfig, DEFAULT_ACCEPT};
use resumedl::download::{
    DownloadEvent, EventSink, ProgressSignal, TransferWorker, TransportFailure, NO_STATUS,
};
use resumedl::{FailureKind, JobOutcome, JobResult, TransportErrorKind};

const ID: &str = "https://cdn.test/videos/clip.mp4";

struct Harness {
    dir: tempfile::TempDir,
    transport: ScriptedTransport,
    worker: TransferWorker<ScriptedTransport>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(|config| config)
    }

    fn with_config(tweak: impl FnOnce(ManagerConfig) -> ManagerConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = tweak(ManagerConfig::new(dir.path()).with_credential("k3y"));
        let transport = ScriptedTransport::new();
        let worker = TransferWorker::from_config(&config, transport.clone());
        Self {
            dir,
            transport,
            worker,
        }
    }

    fn seed_partial(&self, bytes: &[u8]) {
        let path = self.worker.stager().partial_path_for(ID).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn partial(&self) -> Option<Vec<u8>> {
        std::fs::read(self.worker.stager().partial_path_for(ID).unwrap()).ok()
    }

    fn final_file(&self) -> Option<Vec<u8>> {
        std::fs::read(self.worker.stager().final_path_for(ID).unwrap()).ok()
    }

    async fn run(&self) -> (JobResult, Vec<ProgressSignal>) {
        let (events, mut rx) = EventSink::channel();
        let result = self.worker.run(ID, &CancellationToken::new(), &events).await;
        drop(events);

        let mut signals = Vec::new();
        while let Some(event) = rx.recv().await {
            if let DownloadEvent::Progress(progress) = event {
                assert_eq!(progress.id, ID);
                signals.push(progress.signal);
            }
        }
        (result, signals)
    }
}

#[tokio::test]
async fn test_fresh_download_commits_and_reports_percent() {
    let h = Harness::new();
    let body = payload(1000);
    h.transport.respond(Scripted::ok(&body, 100));

    let (result, signals) = h.run().await;

    assert_eq!(result.outcome, JobOutcome::Succeeded);
    assert_eq!(result.status_code, 200);
    assert_eq!(result.message, "OK");
    assert_eq!(result.bytes_on_disk, 1000);
    assert_eq!(h.final_file().unwrap(), body);
    assert!(h.partial().is_none());

    let expected: Vec<_> = (1..=10).map(|n| ProgressSignal::Percent(n * 10)).collect();
    assert_eq!(signals, expected);
}

#[tokio::test]
async fn test_request_carries_credential_and_accept() {
    let h = Harness::new();
    h.transport.respond(Scripted::ok(&payload(10), 10));
    h.run().await;

    let requests = h.transport.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.url.query(), Some("api_key=k3y"));
    assert_eq!(request.headers.get(ACCEPT).unwrap(), DEFAULT_ACCEPT);
    assert!(request.headers.get(RANGE).is_none());
}

#[tokio::test]
async fn test_resume_with_partial_content_appends() {
    let h = Harness::new();
    let body = payload(1000);
    h.seed_partial(&body[..400]);
    h.transport.respond(Scripted::partial(&body[400..], 100));

    let (result, signals) = h.run().await;

    assert_eq!(h.transport.requests()[0].resume_offset(), Some(400));
    assert_eq!(result.outcome, JobOutcome::Succeeded);
    assert_eq!(result.status_code, 206);
    assert_eq!(h.final_file().unwrap(), body);

    // Progress is measured against the whole resource.
    assert_eq!(signals.first(), Some(&ProgressSignal::Percent(50)));
    assert_eq!(signals.last(), Some(&ProgressSignal::Percent(100)));
}

#[tokio::test]
async fn test_resume_ignored_by_server_restarts_from_zero() {
    let h = Harness::new();
    let body = payload(1000);
    h.seed_partial(&[0xAA; 400]);
    h.transport.respond(Scripted::ok(&body, 250));

    let (result, _) = h.run().await;

    assert_eq!(h.transport.requests()[0].resume_offset(), Some(400));
    assert_eq!(result.outcome, JobOutcome::Succeeded);
    assert_eq!(h.final_file().unwrap(), body);
}

#[tokio::test]
async fn test_partial_longer_than_resource_is_size_mismatch() {
    let h = Harness::new();
    h.seed_partial(&payload(500));
    h.transport
        .respond(Scripted::partial(&[], 1).with_total_length(300));

    let (result, signals) = h.run().await;

    assert_eq!(result.outcome, JobOutcome::Failed(FailureKind::SizeMismatch));
    assert_eq!(result.status_code, 206);
    assert!(signals.is_empty());
    assert_eq!(h.partial().unwrap().len(), 500);
    assert!(h.final_file().is_none());
}

#[tokio::test]
async fn test_unsatisfiable_range_on_complete_partial_commits() {
    let h = Harness::new();
    let body = payload(1000);
    h.seed_partial(&body);
    h.transport.respond(
        Scripted::status(416, "Range Not Satisfiable").with_total_length(1000),
    );

    let (result, _) = h.run().await;

    assert_eq!(result.outcome, JobOutcome::Succeeded);
    assert_eq!(result.status_code, 416);
    assert_eq!(h.final_file().unwrap(), body);
    assert!(h.partial().is_none());
}

#[tokio::test]
async fn test_unsatisfiable_range_beyond_resource_is_size_mismatch() {
    let h = Harness::new();
    h.seed_partial(&payload(1200));
    h.transport.respond(
        Scripted::status(416, "Range Not Satisfiable").with_total_length(1000),
    );

    let (result, _) = h.run().await;

    assert_eq!(result.outcome, JobOutcome::Failed(FailureKind::SizeMismatch));
    assert_eq!(h.partial().unwrap().len(), 1200);
}

#[tokio::test]
async fn test_unknown_length_commits_with_activity_signal() {
    let h = Harness::new();
    let body = payload(2000);
    h.transport.respond(Scripted::ok(&body, 100).without_length());

    let (result, signals) = h.run().await;

    assert_eq!(result.outcome, JobOutcome::Succeeded);
    assert_eq!(h.final_file().unwrap(), body);
    assert!(!signals.is_empty());
    assert!(signals.iter().all(|s| !s.is_determinate()));
    assert!(signals.windows(2).all(|w| w[0] != w[1]));
}

#[tokio::test]
async fn test_short_stream_with_known_length_keeps_partial() {
    let h = Harness::new();
    let body = payload(1000);
    h.transport.respond(Scripted::ok(&body, 100).truncated(6));

    let (result, signals) = h.run().await;

    assert_eq!(result.outcome, JobOutcome::Failed(FailureKind::Incomplete));
    assert_eq!(result.bytes_on_disk, 600);
    assert_eq!(h.partial().unwrap(), &body[..600]);
    assert!(h.final_file().is_none());
    assert_eq!(signals.last(), Some(&ProgressSignal::Percent(60)));
}

#[tokio::test]
async fn test_overlong_stream_is_not_committed() {
    let h = Harness::new();
    let body = payload(1000);
    h.transport
        .respond(Scripted::ok(&body, 100).with_content_length(600));

    let (result, _) = h.run().await;

    assert_eq!(result.outcome, JobOutcome::Failed(FailureKind::Incomplete));
    assert_eq!(result.bytes_on_disk, 1000);
    assert!(result.message.contains("received 1000 bytes"));
    assert!(result.message.contains("declared length was 600"));
    assert_eq!(h.partial().unwrap().len(), 1000);
    assert!(h.final_file().is_none());
}

#[tokio::test]
async fn test_not_found_touches_nothing() {
    let h = Harness::new();
    h.transport.respond(Scripted::status(404, "Not Found"));

    let (result, _) = h.run().await;

    assert_eq!(result.outcome, JobOutcome::Failed(FailureKind::NotFound));
    assert_eq!(result.status_code, 404);
    assert_eq!(std::fs::read_dir(h.dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unexpected_status_is_reported() {
    let h = Harness::new();
    h.transport
        .respond(Scripted::status(503, "Service Unavailable"));

    let (result, _) = h.run().await;

    assert_eq!(result.outcome, JobOutcome::Failed(FailureKind::HttpStatus));
    assert_eq!(result.status_code, 503);
    assert!(result.message.contains("503"));
}

#[tokio::test]
async fn test_connect_timeout() {
    let h = Harness::with_config(|c| c.with_connect_timeout(Duration::from_millis(50)));
    h.transport.push(Script::Hang);

    let (result, _) = h.run().await;

    assert_eq!(result.status_code, NO_STATUS);
    assert_eq!(
        result.outcome,
        JobOutcome::Failed(FailureKind::Transport(TransportErrorKind::Timeout))
    );
    assert!(h.partial().is_none());
}

#[tokio::test]
async fn test_read_timeout_keeps_received_bytes() {
    let h = Harness::with_config(|c| c.with_read_timeout(Duration::from_millis(50)));
    let body = payload(1000);
    h.transport.respond(Scripted::ok(&body, 100).stalled_after(2));

    let (result, _) = h.run().await;

    assert_eq!(result.status_code, 200);
    assert_eq!(
        result.outcome,
        JobOutcome::Failed(FailureKind::Transport(TransportErrorKind::Timeout))
    );
    assert_eq!(h.partial().unwrap(), &body[..200]);
    assert!(h.final_file().is_none());
}

#[tokio::test]
async fn test_body_error_mid_stream() {
    let h = Harness::new();
    let body = payload(1000);
    h.transport.respond(Scripted::ok(&body, 100).failing_after(
        3,
        TransportFailure::new(TransportErrorKind::Body, "connection reset"),
    ));

    let (result, _) = h.run().await;

    assert_eq!(
        result.outcome,
        JobOutcome::Failed(FailureKind::Transport(TransportErrorKind::Body))
    );
    assert!(result.message.contains("connection reset"));
    assert_eq!(h.partial().unwrap().len(), 300);
}

#[tokio::test]
async fn test_incomplete_attempt_resumes_on_retry() {
    let h = Harness::new();
    let body = payload(800);
    h.transport.respond(Scripted::ok(&body, 100).truncated(3));
    h.transport.respond(Scripted::partial(&body[300..], 100));

    let (first, _) = h.run().await;
    assert_eq!(first.outcome, JobOutcome::Failed(FailureKind::Incomplete));

    let (second, _) = h.run().await;
    assert_eq!(second.outcome, JobOutcome::Succeeded);
    assert_eq!(h.transport.requests()[1].resume_offset(), Some(300));
    assert_eq!(h.final_file().unwrap(), body);
}
