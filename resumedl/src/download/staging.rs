//! Partial-file staging and atomic commit.
//!
//! Every identifier maps to two files in one flat directory:
//!
//! ```text
//! <name>.partial   bytes received so far (resume offset = its length)
//! <name>           committed download, produced only by rename
//! ```
//!
//! `<name>` is the last path segment of the identifier with any query or
//! fragment removed. The existence and length of these two files is the only
//! durable state; there is no manifest.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::config::DEFAULT_BUFFER_SIZE;
use crate::error::{DownloadError, DownloadResult};

/// Suffix appended to the derived name for in-progress files.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Derives the local file name for an identifier.
///
/// Drops any query or fragment, then takes the text after the last `/`.
/// Fails when that leaves nothing usable as a single file name.
pub fn file_name_for(id: &str) -> DownloadResult<String> {
    let naming_error = || DownloadError::Naming(id.to_string());

    let end = id.find(['?', '#']).unwrap_or(id.len());
    let path = &id[..end];
    let slash = path.rfind('/').ok_or_else(naming_error)?;
    let name = &path[slash + 1..];

    if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
        return Err(naming_error());
    }

    Ok(name.to_string())
}

/// Durable local state of an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    /// Neither file exists.
    Absent,
    /// A partial file holds this many bytes.
    Partial(u64),
    /// The committed file exists.
    Complete,
}

/// Maps identifiers to partial/final files and commits finished transfers.
#[derive(Debug, Clone)]
pub struct FileStager {
    dir: PathBuf,
    buffer_size: usize,
}

impl FileStager {
    /// Create a stager rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Set the write buffer size used by [`StagedWriter`].
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// The download directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the in-progress file for `id`.
    pub fn partial_path_for(&self, id: &str) -> DownloadResult<PathBuf> {
        let name = file_name_for(id)?;
        Ok(self.dir.join(format!("{}{}", name, PARTIAL_SUFFIX)))
    }

    /// Path of the committed file for `id`.
    pub fn final_path_for(&self, id: &str) -> DownloadResult<PathBuf> {
        Ok(self.dir.join(file_name_for(id)?))
    }

    /// Length of the partial file, if it exists and is writable.
    pub async fn existing_bytes(&self, id: &str) -> Option<u64> {
        let path = self.partial_path_for(id).ok()?;
        let meta = fs::metadata(&path).await.ok()?;
        if !meta.is_file() || meta.permissions().readonly() {
            return None;
        }
        Some(meta.len())
    }

    /// Whether the committed file exists.
    pub async fn is_downloaded(&self, id: &str) -> bool {
        match self.final_path_for(id) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Reports what is on disk for `id`.
    pub async fn local_state(&self, id: &str) -> DownloadResult<LocalState> {
        if fs::try_exists(self.final_path_for(id)?).await.unwrap_or(false) {
            return Ok(LocalState::Complete);
        }
        match self.existing_bytes(id).await {
            Some(len) => Ok(LocalState::Partial(len)),
            None => Ok(LocalState::Absent),
        }
    }

    /// Opens the partial file for writing.
    ///
    /// With `resumed` the file is opened for append (created if missing) and
    /// its current length is returned as the offset. Without it the file is
    /// recreated empty and the offset is 0.
    pub async fn open_for_write(
        &self,
        id: &str,
        resumed: bool,
    ) -> DownloadResult<(u64, StagedWriter)> {
        let path = self.partial_path_for(id)?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DownloadError::io(&self.dir, e))?;

        let (offset, file) = if resumed {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| DownloadError::io(&path, e))?;
            let len = file
                .metadata()
                .await
                .map_err(|e| DownloadError::io(&path, e))?
                .len();
            (len, file)
        } else {
            let file = File::create(&path)
                .await
                .map_err(|e| DownloadError::io(&path, e))?;
            (0, file)
        };

        debug!(id = %id, path = %path.display(), offset, resumed, "Opened partial file");

        Ok((
            offset,
            StagedWriter {
                writer: BufWriter::with_capacity(self.buffer_size, file),
                path,
                written: 0,
            },
        ))
    }

    /// Promotes the partial file to the final file.
    ///
    /// Renames only when `written_total` matches `declared_total`, or when the
    /// total was never disclosed. Returns whether the rename happened; an
    /// incomplete partial file is left untouched for a later resume.
    pub async fn commit(
        &self,
        id: &str,
        written_total: u64,
        declared_total: Option<u64>,
    ) -> DownloadResult<bool> {
        let complete = match declared_total {
            Some(total) => written_total == total,
            None => true,
        };
        if !complete {
            debug!(id = %id, written_total, ?declared_total, "Partial file kept for resume");
            return Ok(false);
        }

        if declared_total.is_none() {
            warn!(id = %id, written_total, "Committing download of undisclosed length");
        }

        let from = self.partial_path_for(id)?;
        let to = self.final_path_for(id)?;
        fs::rename(&from, &to)
            .await
            .map_err(|e| DownloadError::io(&to, e))?;

        debug!(id = %id, path = %to.display(), "Committed download");
        Ok(true)
    }
}

/// Buffered append handle for a partial file.
///
/// Must be finished with [`StagedWriter::close`]; dropping it discards
/// whatever is still buffered.
#[derive(Debug)]
pub struct StagedWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    written: u64,
}

impl StagedWriter {
    /// Appends one chunk.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> DownloadResult<()> {
        self.writer
            .write_all(chunk)
            .await
            .map_err(|e| DownloadError::io(&self.path, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes handed to this writer since it was opened.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered bytes and closes the file.
    pub async fn close(mut self) -> DownloadResult<u64> {
        let result: io::Result<()> = async {
            self.writer.flush().await?;
            self.writer.get_mut().sync_data().await?;
            self.writer.shutdown().await
        }
        .await;

        result.map_err(|e| DownloadError::io(&self.path, e))?;
        Ok(self.written)
    }
}
