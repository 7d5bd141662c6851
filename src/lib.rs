//! rangedl core library
//!
//! Downloads a single HTTP resource over several parallel range requests and
//! names the result after the server's `Content-Disposition` header.
//!
//! # Architecture
//!
//! Everything lives in [`download`]:
//! - [`download::header`] - `Content-Disposition` / `Content-Range` parsing
//! - filename resolution, metadata probe, chunk planner
//! - chunk workers, the bounded scheduler and the destination writer
//! - [`Download`] - the public job tying them together

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;

// Re-export commonly used types
pub use download::{
    DEFAULT_MAX_RETRIES, Download, DownloadError, DownloadEvent, DownloadOptions, ExistBehavior,
    FailureType, JobState, Metadata, ProgressObserver, RetryPolicy, classify_error,
};
