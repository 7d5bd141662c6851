//! Parallel HTTP range download engine.
//!
//! A [`Download`] probes a URL, resolves the destination filename from the
//! server's `Content-Disposition` (falling back to the URL), splits the body
//! into byte ranges and fetches them over several connections, writing each
//! range straight to its offset in the destination file.
//!
//! # Features
//!
//! - `filename`, `filename*=UTF-8''...` and unquoted dispositions
//! - Bounded parallel range requests with per-chunk retries and backoff
//! - Retry-After aware rate limit handling
//! - `If-Range` validation so a changed resource is never stitched together
//! - Cancellation through a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! - Progress events for UIs ([`ProgressObserver`])
//!
//! # Example
//!
//! ```no_run
//! use rangedl::download::{Download, DownloadOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut download = Download::new(
//!     "https://example.com/file.iso",
//!     "./downloads",
//!     DownloadOptions::default(),
//! )?;
//! let completed = download.wait().await?;
//! assert!(completed);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod filename;
pub mod header;
mod job;
mod options;
mod planner;
mod probe;
mod progress;
mod retry;
mod scheduler;
mod worker;
mod writer;

pub use client::{ClientConfig, HttpClient};
pub use error::DownloadError;
pub use filename::{FilenameSource, ResolvedFilename, resolve_filename};
pub use job::{Download, JobState};
pub use options::{DownloadOptions, ExistBehavior};
pub use planner::{Chunk, ChunkState, plan};
pub use probe::{Metadata, probe};
pub use progress::{DownloadEvent, NoopObserver, ProgressObserver, SharedObserver};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error,
    parse_retry_after,
};
pub use writer::DestinationWriter;

// Per project convention there are no module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
