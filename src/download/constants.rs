//! Constants for the download module (timeouts, connection limits, chunk sizing).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default read timeout between body packets (60 seconds).
pub const READ_TIMEOUT_SECS: u64 = 60;

/// Default time a chunk attempt may go without progress (2 minutes): waiting
/// for response headers, or between two body packets.
pub const ATTEMPT_TIMEOUT_SECS: u64 = 120;

/// Default number of parallel connections per download.
pub const DEFAULT_CONNECTIONS: usize = 5;

/// Minimum allowed connections value.
pub const MIN_CONNECTIONS: usize = 1;

/// Maximum allowed connections value.
pub const MAX_CONNECTIONS: usize = 32;

/// Default minimum chunk size (1 MiB). Smaller resources use fewer connections.
pub const DEFAULT_MIN_CHUNK_SIZE: u64 = 1024 * 1024;

/// Maximum redirect hops followed when redirects are enabled.
pub const MAX_REDIRECTS: usize = 10;

/// Filename used when neither the response nor the URL yield one.
pub const GENERIC_FILENAME: &str = "download.bin";

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);
