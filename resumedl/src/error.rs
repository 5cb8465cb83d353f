//! Error types for the download manager.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// What went wrong on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connect or read exceeded its per-attempt limit.
    Timeout,
    /// The server spoke something other than HTTP.
    Protocol,
    /// The identifier is not a usable address.
    MalformedAddress,
    /// No connection could be established.
    Connect,
    /// The body stream broke mid-transfer.
    Body,
    /// The HTTP client itself could not be built.
    Client,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Protocol => "protocol violation",
            Self::MalformedAddress => "malformed address",
            Self::Connect => "connection failed",
            Self::Body => "body read failed",
            Self::Client => "client setup failed",
        };
        f.write_str(name)
    }
}

/// Errors raised while staging, transferring or committing a download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The identifier has no path segment a file name can be derived from.
    #[error("cannot derive a file name from '{0}'")]
    Naming(String),

    /// Local filesystem failure.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Timeout, protocol violation, bad address or broken connection.
    #[error("{kind} for {url}: {reason}")]
    Transport {
        url: String,
        kind: TransportErrorKind,
        reason: String,
    },

    /// The remote resource does not exist.
    #[error("resource not found: {url}")]
    NotFound { url: String },

    /// The partial file is longer than the resource the server describes.
    #[error("resume offset {offset} exceeds declared length {length} for {url}")]
    SizeMismatch { url: String, offset: u64, length: u64 },

    /// Any response status the worker does not know how to stream.
    #[error("server answered {status} {reason} for {url}")]
    HttpStatus {
        url: String,
        status: u16,
        reason: String,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// The bytes received do not match the declared length.
    #[error("received {received} bytes for {url}, declared length was {expected}")]
    Incomplete {
        url: String,
        received: u64,
        expected: u64,
    },
}

impl DownloadError {
    /// Builds an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Naming(_) => FailureKind::Naming,
            Self::Io { .. } => FailureKind::Io,
            Self::Transport { kind, .. } => FailureKind::Transport(*kind),
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::SizeMismatch { .. } => FailureKind::SizeMismatch,
            Self::HttpStatus { .. } => FailureKind::HttpStatus,
            Self::Client(_) => FailureKind::Transport(TransportErrorKind::Client),
            Self::Incomplete { .. } => FailureKind::Incomplete,
        }
    }
}

/// Copyable classification of a [`DownloadError`], kept in job results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Naming,
    Io,
    Transport(TransportErrorKind),
    NotFound,
    SizeMismatch,
    HttpStatus,
    Incomplete,
}

impl FailureKind {
    /// Whether enqueueing the same identifier again can make progress.
    ///
    /// Naming and not-found failures will fail identically on every attempt.
    pub fn is_resumable(&self) -> bool {
        !matches!(self, Self::Naming | Self::NotFound)
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or parsed.
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// Inline configuration text could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A known key holds a value of the wrong shape.
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}
