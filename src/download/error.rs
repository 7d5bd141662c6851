//! Error types for the download module.
//!
//! This module defines structured errors for all download operations,
//! providing context-rich error messages for debugging and user feedback.

use std::path::PathBuf;

use thiserror::Error;

use super::constants::{MAX_CONNECTIONS, MIN_CONNECTIONS};

/// Errors that can occur while probing, planning, or downloading a resource.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (429 and 503 responses).
        retry_after: Option<String>,
    },

    /// The metadata probe failed, so the download cannot be planned.
    #[error("metadata request failed for {url}: {source}")]
    Metadata {
        /// The probed URL.
        url: String,
        /// What went wrong with the probe.
        #[source]
        source: Box<DownloadError>,
    },

    /// The server answered a ranged request with a different range (or status).
    #[error("range mismatch for {url}: requested {expected}, got {actual}")]
    RangeMismatch {
        /// The chunk URL.
        url: String,
        /// What the request asked for.
        expected: String,
        /// What the response declared.
        actual: String,
    },

    /// The total size declared by `content-range` disagrees with the probed size.
    #[error("resource size changed for {url}: expected {expected} bytes, server reports {actual}")]
    SizeMismatch {
        /// The chunk URL.
        url: String,
        /// Size captured by the metadata probe.
        expected: u64,
        /// Size declared by the chunk response.
        actual: u64,
    },

    /// The response body ended before (or ran past) the requested byte count.
    #[error("chunk {index} of {url}: expected {expected_bytes} bytes, received {actual_bytes}")]
    Truncated {
        /// The chunk URL.
        url: String,
        /// Index of the affected chunk.
        index: usize,
        /// Bytes the chunk should contain.
        expected_bytes: u64,
        /// Bytes actually received.
        actual_bytes: u64,
    },

    /// A chunk failed on every allowed attempt.
    #[error("chunk {index} failed after {attempts} attempts: {source}")]
    ChunkExhausted {
        /// Index of the chunk that gave up.
        index: usize,
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        source: Box<DownloadError>,
    },

    /// File system error during download (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Invalid connections value provided.
    #[error(
        "invalid connections value {value}: must be between {MIN_CONNECTIONS} and {MAX_CONNECTIONS}"
    )]
    InvalidConnections {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The destination already exists and the configured behavior forbids reuse.
    #[error("destination already exists: {path}")]
    DestinationExists {
        /// The existing destination path.
        path: PathBuf,
    },

    /// Downloaded file size does not match expected server content length.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Download path that failed verification.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// A worker task ended without reporting a result (panic or runtime shutdown).
    #[error("chunk worker failed: {reason}")]
    Worker {
        /// Description of the join failure.
        reason: String,
    },

    /// `wait()` was called again after the download had already failed.
    #[error("download already failed: {reason}")]
    AlreadyFailed {
        /// Message of the original failure.
        reason: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Maps a reqwest error to `Timeout` or `Network`.
    pub fn from_request(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Wraps a probe failure.
    pub fn metadata(url: impl Into<String>, source: DownloadError) -> Self {
        Self::Metadata {
            url: url.into(),
            source: Box::new(source),
        }
    }

    /// Creates a range mismatch error.
    pub fn range_mismatch(
        url: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::RangeMismatch {
            url: url.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates an exhausted-retries error for a chunk.
    pub fn chunk_exhausted(index: usize, attempts: u32, source: DownloadError) -> Self {
        Self::ChunkExhausted {
            index,
            attempts,
            source: Box::new(source),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }
}

// No From<reqwest::Error> / From<std::io::Error>: every variant needs a url or path
// the source error does not carry. Use the constructors above.
