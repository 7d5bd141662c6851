//! The public download job: probe, resolve, plan, fetch, settle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::DownloadError;
use super::client::HttpClient;
use super::filename::{
    ResolvedFilename, resolve_destination, resolve_filename, resolve_unique_path,
};
use super::options::{DownloadOptions, ExistBehavior};
use super::planner::{Chunk, plan};
use super::probe::{Metadata, probe};
use super::progress::DownloadEvent;
use super::scheduler::{self, RunOutcome};
use super::worker::WorkerContext;
use super::writer::DestinationWriter;

/// Lifecycle of a [`Download`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created, nothing in flight.
    Idle,
    /// Metadata request in flight.
    Probing,
    /// Computing chunks.
    Planning,
    /// Chunk workers running.
    Downloading,
    /// File fully written and verified.
    Completed,
    /// Settled with an error.
    Failed,
    /// Stopped through the cancellation token.
    Cancelled,
}

impl JobState {
    /// Whether `wait()` has settled.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Settled result of `wait()`, replayed on later calls.
#[derive(Debug, Clone)]
enum Outcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl Outcome {
    fn replay(&self) -> Result<bool, DownloadError> {
        match self {
            Self::Completed => Ok(true),
            Self::Cancelled => Ok(false),
            Self::Failed(reason) => Err(DownloadError::AlreadyFailed {
                reason: reason.clone(),
            }),
        }
    }
}

/// Probe result plus the destination it fixed.
#[derive(Debug, Clone)]
struct Probed {
    metadata: Metadata,
    filename: ResolvedFilename,
    destination: PathBuf,
}

/// A single parallel download of one URL to one destination.
///
/// # Example
///
/// ```no_run
/// use rangedl::download::{Download, DownloadOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut download = Download::new(
///     "https://example.com/file.iso",
///     "./downloads",
///     DownloadOptions::default().with_connections(8),
/// )?;
/// let metadata = download.metadata().await?;
/// println!("size: {:?}", metadata.total_size);
/// if download.wait().await?
///     && let Some(path) = download.saved_file_path()
/// {
///     println!("saved to {}", path.display());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Download {
    url: Url,
    target: PathBuf,
    options: DownloadOptions,
    client: HttpClient,
    cancel: CancellationToken,
    state: JobState,
    probed: Option<Probed>,
    chunks: Vec<Chunk>,
    outcome: Option<Outcome>,
}

impl Download {
    /// Creates a download of `url` into `destination`.
    ///
    /// `destination` is a directory (the resolved filename is appended) or a
    /// file path. Nothing is sent until [`metadata`](Self::metadata) or
    /// [`wait`](Self::wait) is called.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] if `url` is not an absolute http(s) URL
    /// - [`DownloadError::InvalidConnections`] if `connections` is out of range
    /// - [`DownloadError::Network`] if the HTTP client cannot be built
    pub fn new(
        url: &str,
        destination: impl Into<PathBuf>,
        options: DownloadOptions,
    ) -> Result<Self, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }
        options.validate()?;
        let client = HttpClient::new(&options.client)?;

        Ok(Self {
            url: parsed,
            target: destination.into(),
            options,
            client,
            cancel: CancellationToken::new(),
            state: JobState::Idle,
            probed: None,
            chunks: Vec::new(),
            outcome: None,
        })
    }

    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Options this download was created with.
    #[must_use]
    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Resolved destination, available once metadata has been fetched.
    #[must_use]
    pub fn saved_file_path(&self) -> Option<&Path> {
        self.probed.as_ref().map(|p| p.destination.as_path())
    }

    /// Resolved filename and where it came from, once metadata has been fetched.
    #[must_use]
    pub fn filename(&self) -> Option<&ResolvedFilename> {
        self.probed.as_ref().map(|p| &p.filename)
    }

    /// Chunk table of the last run (empty before `wait()`).
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Token that stops the download; `wait()` then returns `Ok(false)`.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Probes the resource and fixes the destination path.
    ///
    /// Only the first successful call sends a request; later calls return the
    /// cached value.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Metadata`] if the probe fails, or
    /// [`DownloadError::Io`] if the destination cannot be resolved.
    pub async fn metadata(&mut self) -> Result<&Metadata, DownloadError> {
        Ok(&self.ensure_probed().await?.metadata)
    }

    /// Runs the download to completion.
    ///
    /// Returns `Ok(true)` once every byte is written and verified, `Ok(false)`
    /// if the download was cancelled. The first call settles the outcome; later
    /// calls return it again without touching the network (a failure is
    /// reported as [`DownloadError::AlreadyFailed`]).
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the download: metadata failure,
    /// exhausted chunk retries, a permanent HTTP or I/O error, or an integrity
    /// mismatch.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn wait(&mut self) -> Result<bool, DownloadError> {
        if let Some(outcome) = &self.outcome {
            debug!(state = ?self.state, "download already settled");
            return outcome.replay();
        }

        let result = self.run().await;
        let (state, outcome) = match &result {
            Ok(true) => (JobState::Completed, Outcome::Completed),
            Ok(false) => (JobState::Cancelled, Outcome::Cancelled),
            Err(error) => {
                warn!(error = %error, "download failed");
                self.options.observer.on_event(&DownloadEvent::Failed {
                    error: error.to_string(),
                });
                (JobState::Failed, Outcome::Failed(error.to_string()))
            }
        };
        self.state = state;
        self.outcome = Some(outcome);
        result
    }

    async fn ensure_probed(&mut self) -> Result<&Probed, DownloadError> {
        let probed = match self.probed.take() {
            Some(probed) => probed,
            None => self.probe_destination().await?,
        };
        Ok(self.probed.insert(probed))
    }

    async fn probe_destination(&mut self) -> Result<Probed, DownloadError> {
        let previous = self.state;
        self.state = JobState::Probing;
        let probed = probe(&self.client, &self.url, self.options.method_fallback).await;
        self.state = previous;
        let metadata = probed?;

        let source_url = Url::parse(&metadata.final_url).unwrap_or_else(|_| self.url.clone());
        let filename = resolve_filename(metadata.disposition.as_deref(), &source_url);
        let destination = resolve_destination(&self.target, &filename.name)
            .map_err(|e| DownloadError::io(&self.target, e))?;
        let destination = match self.options.exist_behavior {
            ExistBehavior::NewFile => resolve_unique_path(&destination),
            ExistBehavior::Overwrite | ExistBehavior::Error | ExistBehavior::Ignore => destination,
        };

        info!(
            filename = %filename.name,
            source = ?filename.source,
            path = %destination.display(),
            "destination resolved"
        );
        self.options.observer.on_event(&DownloadEvent::Metadata {
            metadata: metadata.clone(),
            path: destination.clone(),
        });

        Ok(Probed {
            metadata,
            filename,
            destination,
        })
    }

    async fn run(&mut self) -> Result<bool, DownloadError> {
        let cancel = self.cancel.clone();
        if cancel.is_cancelled() {
            return Ok(false);
        }

        let probed = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(false),
            probed = self.ensure_probed() => probed?.clone(),
        };
        let Probed {
            metadata,
            destination,
            ..
        } = probed;

        if destination_exists(&destination).await? {
            match self.options.exist_behavior {
                ExistBehavior::Error => {
                    return Err(DownloadError::DestinationExists { path: destination });
                }
                ExistBehavior::Ignore => {
                    let bytes = tokio::fs::metadata(&destination)
                        .await
                        .map_err(|e| DownloadError::io(&destination, e))?
                        .len();
                    info!(path = %destination.display(), "destination exists, skipping");
                    self.options.observer.on_event(&DownloadEvent::Completed {
                        path: destination,
                        bytes,
                    });
                    return Ok(true);
                }
                ExistBehavior::NewFile | ExistBehavior::Overwrite => {}
            }
        }

        self.state = JobState::Planning;
        let mut chunks = plan(
            metadata.total_size,
            metadata.supports_range,
            self.options.connections,
            self.options.min_chunk_size,
        );
        info!(
            chunks = chunks.len(),
            total_size = ?metadata.total_size,
            connections = self.options.connections,
            "download planned"
        );
        self.options.observer.on_event(&DownloadEvent::Planned {
            chunks: chunks.len(),
            total_size: metadata.total_size,
        });

        self.state = JobState::Downloading;
        let writer = DestinationWriter::create(&destination, metadata.total_size).await?;
        let ctx = Arc::new(WorkerContext {
            client: self.client.clone(),
            url: metadata.final_url.clone(),
            writer: writer.clone(),
            observer: Arc::clone(&self.options.observer),
            total_size: metadata.total_size,
            validator: metadata.range_validator().map(str::to_string),
            attempt_timeout: self.options.attempt_timeout,
        });

        let result = scheduler::run(
            &mut chunks,
            ctx,
            self.options.connections,
            &self.options.retry,
            &cancel,
        )
        .await;
        self.chunks = chunks;

        match result {
            Ok(RunOutcome::Completed) => match finish(&writer, metadata.total_size).await {
                Ok(bytes) => {
                    info!(path = %destination.display(), bytes, "download complete");
                    self.options.observer.on_event(&DownloadEvent::Completed {
                        path: destination,
                        bytes,
                    });
                    Ok(true)
                }
                Err(error) => {
                    writer.discard().await;
                    Err(error)
                }
            },
            Ok(RunOutcome::Cancelled) => {
                writer.discard().await;
                Ok(false)
            }
            Err(error) => {
                writer.discard().await;
                Err(error)
            }
        }
    }
}

/// Flushes the destination and checks its length against the probed size.
/// Like `try_exists`, but keeps errors other than "not found".
async fn destination_exists(path: &Path) -> Result<bool, DownloadError> {
    tokio::fs::try_exists(path).await.map_err(|e| DownloadError::io(path, e))
}

async fn finish(writer: &DestinationWriter, total_size: Option<u64>) -> Result<u64, DownloadError> {
    let bytes = writer.finalize().await?;
    if let Some(expected) = total_size
        && bytes != expected
    {
        return Err(DownloadError::integrity(writer.path(), expected, bytes));
    }
    Ok(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_destination_exists_reports_lookup_errors() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        assert!(destination_exists(&file).await.unwrap());
        assert!(!destination_exists(&dir.path().join("absent.bin")).await.unwrap());
        // A regular file used as a directory is an error, not "absent".
        let result = destination_exists(&file.join("nested.bin")).await;
        assert!(matches!(result, Err(DownloadError::Io { .. })));
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let result = Download::new("not a url", ".", DownloadOptions::default());
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[test]
    fn test_new_rejects_non_http_scheme() {
        let result = Download::new("ftp://example.com/a", ".", DownloadOptions::default());
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[test]
    fn test_new_rejects_zero_connections() {
        let options = DownloadOptions::default().with_connections(0);
        let result = Download::new("https://example.com/a", ".", options);
        assert!(matches!(
            result,
            Err(DownloadError::InvalidConnections { value: 0 })
        ));
    }

    #[test]
    fn test_new_download_is_idle() {
        let download =
            Download::new("https://example.com/a.bin", ".", DownloadOptions::default()).unwrap();
        assert_eq!(download.state(), JobState::Idle);
        assert!(download.saved_file_path().is_none());
        assert!(download.chunks().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 10]))
            .expect(1)
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();

        let url = format!("{}/data.bin", server.uri());
        let mut download = Download::new(&url, dir.path(), DownloadOptions::default()).unwrap();
        assert_eq!(download.metadata().await.unwrap().total_size, Some(10));
        assert_eq!(download.metadata().await.unwrap().total_size, Some(10));
        assert_eq!(download.saved_file_path().unwrap(), dir.path().join("data.bin"));
        assert_eq!(download.state(), JobState::Idle);
    }

    #[tokio::test]
    async fn test_failed_wait_is_replayed() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();

        let mut download =
            Download::new(&server.uri(), dir.path(), DownloadOptions::default()).unwrap();
        assert!(matches!(
            download.wait().await,
            Err(DownloadError::Metadata { .. })
        ));
        assert_eq!(download.state(), JobState::Failed);
        assert!(matches!(
            download.wait().await,
            Err(DownloadError::AlreadyFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_before_wait_returns_false() {
        let dir = TempDir::new().unwrap();
        let mut download =
            Download::new("http://127.0.0.1:9/x", dir.path(), DownloadOptions::default()).unwrap();
        download.cancel_token().cancel();
        assert!(!download.wait().await.unwrap());
        assert_eq!(download.state(), JobState::Cancelled);
        assert!(!download.wait().await.unwrap());
    }
}
