//! Destination writer: positional writes into the output file.
//!
//! Chunks arrive in any order. Each worker writes its own disjoint range, so
//! the only coordination needed is serializing seek+write pairs on the shared
//! handle.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use super::DownloadError;

/// Shared handle to the destination file.
///
/// Cloning is cheap; all clones write to the same file.
#[derive(Debug, Clone)]
pub struct DestinationWriter {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl DestinationWriter {
    /// Creates (or truncates) the destination and pre-sizes it when the size is known.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the file cannot be created or resized.
    pub async fn create(path: &Path, total_size: Option<u64>) -> Result<Self, DownloadError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        if let Some(size) = total_size {
            file.set_len(size)
                .await
                .map_err(|e| DownloadError::io(path, e))?;
            debug!(path = %path.display(), size, "pre-allocated destination");
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Wraps an already open handle; tests use it to inject write failures.
    #[cfg(test)]
    pub(crate) fn from_file(path: &Path, file: File) -> Self {
        Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        }
    }

    /// Destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `bytes` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] on seek or write failure.
    pub async fn write_at(&self, offset: u64, bytes: &[u8]) -> Result<(), DownloadError> {
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| DownloadError::io(&self.path, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| DownloadError::io(&self.path, e))
    }

    /// Cuts the file back to `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the file cannot be resized.
    pub async fn truncate(&self, len: u64) -> Result<(), DownloadError> {
        let file = self.file.lock().await;
        file.set_len(len)
            .await
            .map_err(|e| DownloadError::io(&self.path, e))
    }

    /// Flushes and syncs the file, returning its final length.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if flushing or syncing fails.
    pub async fn finalize(&self) -> Result<u64, DownloadError> {
        let mut file = self.file.lock().await;
        file.flush()
            .await
            .map_err(|e| DownloadError::io(&self.path, e))?;
        file.sync_all()
            .await
            .map_err(|e| DownloadError::io(&self.path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| DownloadError::io(&self.path, e))?
            .len();
        debug!(path = %self.path.display(), len, "destination finalized");
        Ok(len)
    }

    /// Removes the partially written destination (best effort).
    pub async fn discard(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            debug!(path = %self.path.display(), error = %e, "could not remove partial file");
        }
    }
}
