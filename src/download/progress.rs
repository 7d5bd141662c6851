//! Progress hooks for a running download.
//!
//! The core only emits [`DownloadEvent`]s; rendering them (progress bars,
//! logs, IPC) is up to the [`ProgressObserver`] the caller installs.

use std::path::PathBuf;
use std::sync::Arc;

use super::Metadata;

/// Something that happened during a download.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// Probe finished and the destination is fixed.
    Metadata {
        /// Probed metadata.
        metadata: Metadata,
        /// Resolved destination path.
        path: PathBuf,
    },
    /// The plan is ready and transfers are about to start.
    Planned {
        /// Number of chunks.
        chunks: usize,
        /// Total bytes, when known.
        total_size: Option<u64>,
    },
    /// A worker started an attempt on a chunk.
    ChunkStarted {
        /// Chunk index.
        index: usize,
        /// Attempt number (1-based).
        attempt: u32,
    },
    /// Bytes were written for a chunk.
    ChunkProgress {
        /// Chunk index.
        index: usize,
        /// Bytes written by this packet.
        bytes: u64,
    },
    /// A chunk attempt failed and will be retried; its partial bytes are discarded.
    ChunkRetry {
        /// Chunk index.
        index: usize,
        /// Attempt number that failed.
        attempt: u32,
        /// Bytes of the failed attempt that will be fetched again.
        discarded: u64,
        /// Failure description.
        error: String,
    },
    /// A chunk is fully written.
    ChunkCompleted {
        /// Chunk index.
        index: usize,
        /// Bytes written for the chunk.
        bytes: u64,
    },
    /// The download finished and the file is complete.
    Completed {
        /// Final file path.
        path: PathBuf,
        /// Final file size.
        bytes: u64,
    },
    /// The download failed; this is the error `wait()` returns.
    Failed {
        /// Failure description.
        error: String,
    },
}

/// Receives download events. Called from worker tasks, so it must be cheap.
pub trait ProgressObserver: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &DownloadEvent);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_event(&self, _event: &DownloadEvent) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(&DownloadEvent) + Send + Sync,
{
    fn on_event(&self, event: &DownloadEvent) {
        self(event);
    }
}

/// Shared observer handle.
pub type SharedObserver = Arc<dyn ProgressObserver>;
