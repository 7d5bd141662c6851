//! Chunk scheduler: a bounded worker pool with per-chunk retries.
//!
//! At most `connections` attempts run at once. A failed chunk goes back on
//! the queue with a backoff delay until its attempt budget is spent; the
//! first terminal failure stops every remaining worker.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::DownloadError;
use super::planner::{Chunk, ChunkState};
use super::progress::DownloadEvent;
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error, retry_after_delay};
use super::worker::{AttemptReport, WorkerContext, run_attempt};

/// How a scheduling run ended when no chunk failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    /// Every chunk is [`ChunkState::Done`].
    Completed,
    /// The cancellation token fired first.
    Cancelled,
}

/// Downloads every pending chunk of `chunks`.
///
/// Chunk states and attempt counters are updated in place.
///
/// # Errors
///
/// Returns the first terminal chunk failure: the error itself for permanent
/// failures, otherwise [`DownloadError::ChunkExhausted`].
pub(crate) async fn run(
    chunks: &mut [Chunk],
    ctx: Arc<WorkerContext>,
    connections: usize,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<RunOutcome, DownloadError> {
    let connections = connections.max(1);
    let mut queue: VecDeque<(usize, Duration)> = VecDeque::new();

    for chunk in chunks.iter_mut() {
        if chunk.state != ChunkState::Pending {
            continue;
        }
        if chunk.is_empty() {
            chunk.state = ChunkState::Done;
            ctx.observer.on_event(&DownloadEvent::ChunkCompleted {
                index: chunk.index,
                bytes: 0,
            });
            continue;
        }
        queue.push_back((chunk.index, Duration::ZERO));
    }

    debug!(queued = queue.len(), connections, "scheduling chunks");

    let mut workers: JoinSet<AttemptReport> = JoinSet::new();
    loop {
        while workers.len() < connections {
            let Some((index, delay)) = queue.pop_front() else {
                break;
            };
            let chunk = &mut chunks[index];
            chunk.attempts += 1;
            chunk.state = ChunkState::InFlight;
            workers.spawn(run_attempt(Arc::clone(&ctx), chunk.clone(), delay));
        }

        if workers.is_empty() {
            break;
        }

        let joined = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(in_flight = workers.len(), "download cancelled");
                workers.shutdown().await;
                reset_in_flight(chunks);
                return Ok(RunOutcome::Cancelled);
            }
            joined = workers.join_next() => joined,
        };

        let report = match joined {
            Some(Ok(report)) => report,
            Some(Err(join_error)) => {
                warn!(error = %join_error, "chunk worker did not finish");
                workers.shutdown().await;
                return Err(DownloadError::Worker {
                    reason: join_error.to_string(),
                });
            }
            None => break,
        };

        if let Err(error) = handle_report(chunks, &ctx, retry, &mut queue, report) {
            workers.shutdown().await;
            return Err(error);
        }
    }

    Ok(RunOutcome::Completed)
}

/// Applies one attempt result: marks success, requeues, or returns the terminal error.
fn handle_report(
    chunks: &mut [Chunk],
    ctx: &WorkerContext,
    retry: &RetryPolicy,
    queue: &mut VecDeque<(usize, Duration)>,
    report: AttemptReport,
) -> Result<(), DownloadError> {
    let chunk = &mut chunks[report.index];

    let error = match report.result {
        Ok(bytes) => {
            chunk.state = ChunkState::Done;
            debug!(index = chunk.index, bytes, attempt = report.attempt, "chunk completed");
            ctx.observer.on_event(&DownloadEvent::ChunkCompleted {
                index: chunk.index,
                bytes,
            });
            return Ok(());
        }
        Err(error) => error,
    };

    let failure = classify_error(&error);
    match retry.should_retry(failure, report.attempt) {
        RetryDecision::Retry { delay, attempt } => {
            let delay = retry_after_delay(&error).unwrap_or(delay);
            warn!(
                index = chunk.index,
                attempt = report.attempt,
                next_attempt = attempt,
                delay_ms = delay.as_millis(),
                discarded = report.written,
                error = %error,
                "chunk attempt failed, retrying"
            );
            ctx.observer.on_event(&DownloadEvent::ChunkRetry {
                index: chunk.index,
                attempt: report.attempt,
                discarded: report.written,
                error: error.to_string(),
            });
            chunk.state = ChunkState::Pending;
            queue.push_back((chunk.index, delay));
            Ok(())
        }
        RetryDecision::DoNotRetry { reason } => {
            chunk.state = ChunkState::Failed;
            warn!(
                index = chunk.index,
                attempts = report.attempt,
                reason = %reason,
                error = %error,
                "chunk failed"
            );
            if failure == FailureType::Permanent {
                Err(error)
            } else {
                Err(DownloadError::chunk_exhausted(
                    chunk.index,
                    report.attempt,
                    error,
                ))
            }
        }
    }
}

fn reset_in_flight(chunks: &mut [Chunk]) {
    for chunk in chunks.iter_mut() {
        if chunk.state == ChunkState::InFlight {
            chunk.state = ChunkState::Pending;
        }
    }
}
