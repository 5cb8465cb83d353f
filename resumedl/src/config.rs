//! Configuration for the download manager.
//!
//! Settings can be built in code with the `with_*` builder methods or loaded
//! from an INI file:
//!
//! ```text
//! [downloads]
//! directory = /home/user/Videos
//! accept = video/mp4, video/*
//! connect_timeout_ms = 10000
//! read_timeout_ms = 10000
//! buffer_size = 65536
//! allow_insecure = false
//!
//! [credentials]
//! param = api_key
//! api_key = 0123456789abcdef
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use crate::error::ConfigError;

/// Default connect and read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default write buffer for partial files (64KB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default `Accept` header for transfers.
pub const DEFAULT_ACCEPT: &str = "video/mp4, video/*";

/// Default query parameter carrying the credential.
pub const DEFAULT_CREDENTIAL_PARAM: &str = "api_key";

const DOWNLOADS_SECTION: &str = "downloads";
const CREDENTIALS_SECTION: &str = "credentials";

/// Configuration for the download manager.
#[derive(Clone)]
pub struct ManagerConfig {
    /// Flat directory holding final and `.partial` files.
    pub download_dir: PathBuf,

    /// Static credential appended to every transfer request.
    pub credential: Option<String>,

    /// Query parameter name used for the credential.
    pub credential_param: String,

    /// Value of the `Accept` request header.
    pub accept: String,

    /// Per-attempt limit for establishing the connection.
    pub connect_timeout: Duration,

    /// Per-read limit while streaming the body.
    pub read_timeout: Duration,

    /// Write buffer size for the partial file.
    pub buffer_size: usize,

    /// Permit plain `http://` identifiers.
    pub allow_insecure: bool,
}

impl std::fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerConfig")
            .field("download_dir", &self.download_dir)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("credential_param", &self.credential_param)
            .field("accept", &self.accept)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("buffer_size", &self.buffer_size)
            .field("allow_insecure", &self.allow_insecure)
            .finish()
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            credential: None,
            credential_param: DEFAULT_CREDENTIAL_PARAM.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            allow_insecure: false,
        }
    }
}

impl ManagerConfig {
    /// Create a new configuration writing into `download_dir`.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            ..Default::default()
        }
    }

    /// Set the download directory.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Set the credential appended to every request.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Set the query parameter name carrying the credential.
    pub fn with_credential_param(mut self, param: impl Into<String>) -> Self {
        self.credential_param = param.into();
        self
    }

    /// Set the `Accept` header value.
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the partial-file write buffer size (minimum 1 byte).
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Allow or forbid plain `http://` identifiers.
    pub fn with_allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Load configuration from an INI file, starting from defaults.
    pub fn from_ini_file(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::default().merge_ini(&ini)
    }

    /// Load configuration from INI text, starting from defaults.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::default().merge_ini(&ini)
    }

    /// Overlay every key present in `ini` onto this configuration.
    pub fn merge_ini(mut self, ini: &Ini) -> Result<Self, ConfigError> {
        if let Some(section) = ini.section(Some(DOWNLOADS_SECTION)) {
            if let Some(dir) = section.get("directory") {
                self.download_dir = PathBuf::from(dir);
            }
            if let Some(accept) = section.get("accept") {
                self.accept = accept.to_string();
            }
            if let Some(ms) = parse_key::<u64>(section, DOWNLOADS_SECTION, "connect_timeout_ms")? {
                self.connect_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = parse_key::<u64>(section, DOWNLOADS_SECTION, "read_timeout_ms")? {
                self.read_timeout = Duration::from_millis(ms);
            }
            if let Some(size) = parse_key::<usize>(section, DOWNLOADS_SECTION, "buffer_size")? {
                self.buffer_size = size.max(1);
            }
            if let Some(allow) = parse_key::<bool>(section, DOWNLOADS_SECTION, "allow_insecure")? {
                self.allow_insecure = allow;
            }
        }

        if let Some(section) = ini.section(Some(CREDENTIALS_SECTION)) {
            if let Some(param) = section.get("param") {
                self.credential_param = param.to_string();
            }
            if let Some(key) = section.get("api_key").filter(|k| !k.is_empty()) {
                self.credential = Some(key.to_string());
            }
        }

        Ok(self)
    }
}

fn parse_key<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match section.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: format!("{}.{}", section_name, key),
                value: raw.to_string(),
            }),
    }
}

/// Default location of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("resumedl")
        .join("config.ini")
}
