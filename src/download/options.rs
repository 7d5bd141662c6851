//! Per-download configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;

use super::client::ClientConfig;
use super::constants::{
    ATTEMPT_TIMEOUT_SECS, DEFAULT_CONNECTIONS, DEFAULT_MIN_CHUNK_SIZE, MAX_CONNECTIONS,
    MIN_CONNECTIONS,
};
use super::error::DownloadError;
use super::progress::{NoopObserver, SharedObserver};
use super::retry::RetryPolicy;

/// What to do when the resolved destination already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExistBehavior {
    /// Pick a fresh name: `name_1.ext`, `name_2.ext`, ...
    #[default]
    NewFile,
    /// Replace the existing file.
    Overwrite,
    /// Fail with [`DownloadError::DestinationExists`].
    Error,
    /// Keep the existing file and report success without transferring.
    Ignore,
}

/// Options for a single [`Download`](super::Download).
///
/// Build with [`DownloadOptions::default`] and the `with_*` methods.
#[derive(Clone)]
pub struct DownloadOptions {
    /// Maximum concurrent chunk requests.
    pub connections: usize,
    /// Smallest chunk the planner will create.
    pub min_chunk_size: u64,
    /// Per-chunk retry policy; its max attempts is the retry limit.
    pub retry: RetryPolicy,
    /// Existing-destination handling.
    pub exist_behavior: ExistBehavior,
    /// Probe with a one-byte GET when HEAD is rejected (405/501).
    pub method_fallback: bool,
    /// Longest a chunk attempt may wait for response headers or its next packet.
    pub attempt_timeout: Duration,
    /// Transport settings (timeouts, redirects, headers).
    pub client: ClientConfig,
    /// Receives progress events.
    pub observer: SharedObserver,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            connections: DEFAULT_CONNECTIONS,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            exist_behavior: ExistBehavior::default(),
            method_fallback: true,
            attempt_timeout: Duration::from_secs(ATTEMPT_TIMEOUT_SECS),
            client: ClientConfig::default(),
            observer: Arc::new(NoopObserver),
        }
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("connections", &self.connections)
            .field("min_chunk_size", &self.min_chunk_size)
            .field("retry", &self.retry)
            .field("exist_behavior", &self.exist_behavior)
            .field("method_fallback", &self.method_fallback)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl DownloadOptions {
    /// Sets the maximum number of concurrent connections.
    #[must_use]
    pub fn with_connections(mut self, connections: usize) -> Self {
        self.connections = connections;
        self
    }

    /// Sets the minimum chunk size in bytes (zero is treated as one).
    #[must_use]
    pub fn with_min_chunk_size(mut self, bytes: u64) -> Self {
        self.min_chunk_size = bytes.max(1);
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the headers sent with every request.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.client.headers = headers;
        self
    }

    /// Sets the existing-destination behavior.
    #[must_use]
    pub fn with_exist_behavior(mut self, behavior: ExistBehavior) -> Self {
        self.exist_behavior = behavior;
        self
    }

    /// Enables or disables the GET probe fallback.
    #[must_use]
    pub fn with_method_fallback(mut self, enabled: bool) -> Self {
        self.method_fallback = enabled;
        self
    }

    /// Enables or disables redirect following.
    #[must_use]
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.client.follow_redirects = follow;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.client.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout (maximum idle time between packets).
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.client.read_timeout = timeout;
        self
    }

    /// Sets how long a chunk attempt may wait for headers or the next packet.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Installs a progress observer.
    #[must_use]
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Checks values the planner and scheduler rely on.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidConnections`] when `connections` is out of range.
    pub fn validate(&self) -> Result<(), DownloadError> {
        if !(MIN_CONNECTIONS..=MAX_CONNECTIONS).contains(&self.connections) {
            return Err(DownloadError::InvalidConnections {
                value: self.connections,
            });
        }
        Ok(())
    }
}
