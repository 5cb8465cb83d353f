//! HTTP transport seam.
//!
//! A [`TransferRequest`] describes one request (method, address, headers,
//! timeouts). A [`Transport`] opens it and hands back the status line, the
//! disclosed lengths and a body stream. The worker owns everything after
//! that: streaming into the partial file, progress and commit.
//!
//! [`HttpTransport`] is the `reqwest` implementation. Tests substitute
//! scripted transports.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_RANGE, RANGE};
use reqwest::{Client, Method, Url};
use thiserror::Error;

use crate::config::DEFAULT_TIMEOUT;
use crate::error::TransportErrorKind;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Response body as a stream of chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportFailure>> + Send>>;

/// A failure reported by a transport, before the worker attaches the identifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportFailure {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One outgoing request.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl TransferRequest {
    /// A GET for `url` with default timeouts and no headers.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the `Accept` header. Invalid header text is ignored.
    pub fn accept(mut self, media_range: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(media_range) {
            self.headers.insert(ACCEPT, value);
        }
        self
    }

    /// Requests the bytes from `offset` to the end.
    pub fn range_from(mut self, offset: u64) -> Self {
        let value = HeaderValue::from_str(&format!("bytes={}-", offset))
            .unwrap_or_else(|_| HeaderValue::from_static("bytes=0-"));
        self.headers.insert(RANGE, value);
        self
    }

    /// Sets both per-attempt limits.
    pub fn timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Offset requested through the `Range` header, if any.
    pub fn resume_offset(&self) -> Option<u64> {
        self.headers
            .get(RANGE)?
            .to_str()
            .ok()?
            .strip_prefix("bytes=")?
            .strip_suffix('-')?
            .parse()
            .ok()
    }
}

/// Status line, lengths and body of an opened transfer.
pub struct TransferResponse {
    pub status: u16,
    pub reason: String,
    /// `Content-Length` of this response body.
    pub content_length: Option<u64>,
    /// Complete resource length from `Content-Range`, when the server sent one.
    pub total_length: Option<u64>,
    pub body: BodyStream,
}

impl std::fmt::Debug for TransferResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("content_length", &self.content_length)
            .field("total_length", &self.total_length)
            .finish_non_exhaustive()
    }
}

/// Opens transfers.
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` and returns once the status line and headers are in.
    fn open<'a>(
        &'a self,
        request: &'a TransferRequest,
    ) -> BoxFuture<'a, Result<TransferResponse, TransportFailure>>;
}

/// Parses the complete length out of a `Content-Range` value.
///
/// Accepts `bytes 0-99/1000` and `bytes */1000`; `*` as the length is unknown.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport whose connections give up after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportFailure> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportFailure::new(TransportErrorKind::Client, e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn classify(err: reqwest::Error) -> TransportFailure {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_builder() {
        TransportErrorKind::MalformedAddress
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_body() || err.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Protocol
    };
    // The URL carries the credential.
    TransportFailure::new(kind, err.without_url().to_string())
}

impl Transport for HttpTransport {
    fn open<'a>(
        &'a self,
        request: &'a TransferRequest,
    ) -> BoxFuture<'a, Result<TransferResponse, TransportFailure>> {
        Box::pin(async move {
            let response = self
                .client
                .request(request.method.clone(), request.url.clone())
                .headers(request.headers.clone())
                .send()
                .await
                .map_err(classify)?;

            let status = response.status();
            let total_length = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range_total);

            Ok(TransferResponse {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                content_length: response.content_length(),
                total_length,
                body: response.bytes_stream().map_err(classify).boxed(),
            })
        })
    }
}
