//! Chunk worker: one attempt at fetching one chunk into the destination.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Response;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE};
use tracing::{debug, instrument};

use super::DownloadError;
use super::client::{HttpClient, header_str};
use super::header::parse_content_range;
use super::planner::Chunk;
use super::progress::{DownloadEvent, SharedObserver};
use super::writer::DestinationWriter;

/// Everything a chunk attempt needs, shared by all workers of one download.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub client: HttpClient,
    pub url: String,
    pub writer: DestinationWriter,
    pub observer: SharedObserver,
    pub total_size: Option<u64>,
    pub validator: Option<String>,
    pub attempt_timeout: Duration,
}

/// Result of a single attempt, reported back to the scheduler.
#[derive(Debug)]
pub(crate) struct AttemptReport {
    pub index: usize,
    pub attempt: u32,
    /// Bytes written before the attempt ended (discarded on failure).
    pub written: u64,
    pub result: Result<u64, DownloadError>,
}

/// Waits `delay`, then runs one attempt of `chunk`.
pub(crate) async fn run_attempt(
    ctx: Arc<WorkerContext>,
    chunk: Chunk,
    delay: Duration,
) -> AttemptReport {
    if !delay.is_zero() {
        debug!(index = chunk.index, delay_ms = delay.as_millis(), "backing off");
        tokio::time::sleep(delay).await;
    }

    ctx.observer.on_event(&DownloadEvent::ChunkStarted {
        index: chunk.index,
        attempt: chunk.attempts,
    });

    let mut written = 0;
    let result = fetch_chunk(&ctx, &chunk, &mut written).await;

    AttemptReport {
        index: chunk.index,
        attempt: chunk.attempts,
        written,
        result,
    }
}

/// Streams the chunk's byte range into the destination at its offset.
///
/// The attempt timeout bounds the wait for response headers and every gap
/// between body packets, so a slow chunk that keeps delivering bytes is never
/// cut off. `written` tracks bytes already stored, so the caller still knows
/// how much was discarded when the attempt fails midway.
#[instrument(level = "debug", skip_all, fields(index = chunk.index, attempt = chunk.attempts))]
pub(crate) async fn fetch_chunk(
    ctx: &WorkerContext,
    chunk: &Chunk,
    written: &mut u64,
) -> Result<u64, DownloadError> {
    let range = chunk.range_header();
    let if_range = range.as_ref().and(ctx.validator.as_deref());
    let response = tokio::time::timeout(
        ctx.attempt_timeout,
        ctx.client.get(&ctx.url, range.as_deref(), if_range),
    )
    .await
    .map_err(|_| DownloadError::timeout(&ctx.url))??;

    validate_response(ctx, chunk, &response)?;

    // Unknown length: a failed earlier attempt may have written past what
    // this one will deliver.
    if chunk.len.is_none() {
        ctx.writer.truncate(chunk.start).await?;
    }

    let mut stream = response.bytes_stream();
    let mut offset = chunk.start;
    loop {
        let next = tokio::time::timeout(ctx.attempt_timeout, stream.next())
            .await
            .map_err(|_| DownloadError::timeout(&ctx.url))?;
        let Some(packet) = next else {
            break;
        };
        let packet = packet.map_err(|e| DownloadError::from_request(&ctx.url, e))?;
        let size = packet.len() as u64;

        if let Some(expected) = chunk.len
            && *written + size > expected
        {
            return Err(truncated(ctx, chunk, expected, *written + size));
        }

        ctx.writer.write_at(offset, &packet).await?;
        offset += size;
        *written += size;
        ctx.observer.on_event(&DownloadEvent::ChunkProgress {
            index: chunk.index,
            bytes: size,
        });
    }

    if let Some(expected) = chunk.len
        && *written != expected
    {
        return Err(truncated(ctx, chunk, expected, *written));
    }

    debug!(bytes = *written, "chunk body complete");
    Ok(*written)
}

fn truncated(ctx: &WorkerContext, chunk: &Chunk, expected: u64, actual: u64) -> DownloadError {
    DownloadError::Truncated {
        url: ctx.url.clone(),
        index: chunk.index,
        expected_bytes: expected,
        actual_bytes: actual,
    }
}

/// Checks status and framing headers before any byte is written.
fn validate_response(
    ctx: &WorkerContext,
    chunk: &Chunk,
    response: &Response,
) -> Result<(), DownloadError> {
    let status = response.status().as_u16();

    if !chunk.ranged {
        if status == 206 {
            return Err(DownloadError::range_mismatch(
                &ctx.url,
                "full body (200)",
                "206 Partial Content",
            ));
        }
        if let (Some(total), Some(length)) = (
            ctx.total_size,
            header_str(response, CONTENT_LENGTH.as_str()).and_then(|v| v.parse::<u64>().ok()),
        ) && total != length
        {
            return Err(DownloadError::SizeMismatch {
                url: ctx.url.clone(),
                expected: total,
                actual: length,
            });
        }
        return Ok(());
    }

    let Some(end) = chunk.end() else {
        return Ok(());
    };
    let start = chunk.start;
    let expected = format!("bytes {start}-{end}");

    if status != 206 {
        // Typically a 200 after If-Range failed: the resource changed.
        return Err(DownloadError::range_mismatch(
            &ctx.url,
            expected,
            format!("status {status}"),
        ));
    }

    if let Some(raw) = header_str(response, CONTENT_RANGE.as_str()) {
        let Some(range) = parse_content_range(raw) else {
            return Err(DownloadError::range_mismatch(&ctx.url, expected, raw));
        };
        if range.start != start || range.end != end {
            return Err(DownloadError::range_mismatch(&ctx.url, expected, raw));
        }
        if let (Some(known), Some(reported)) = (ctx.total_size, range.total)
            && known != reported
        {
            return Err(DownloadError::SizeMismatch {
                url: ctx.url.clone(),
                expected: known,
                actual: reported,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::ClientConfig;
    use crate::download::planner::plan;
    use crate::download::progress::NoopObserver;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn context(server: &MockServer, dir: &TempDir, total: Option<u64>) -> WorkerContext {
        let path = dir.path().join("out.bin");
        WorkerContext {
            client: HttpClient::new(&ClientConfig::default()).unwrap(),
            url: server.uri(),
            writer: DestinationWriter::create(&path, total).await.unwrap(),
            observer: Arc::new(NoopObserver),
            total_size: total,
            validator: None,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn second_chunk() -> Chunk {
        // 200 bytes split into two ranged chunks of 100.
        plan(Some(200), true, 2, 100).remove(1)
    }

    #[tokio::test]
    async fn test_fetch_chunk_writes_at_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("range", "bytes=100-199"))
            .respond_with(
                ResponseTemplate::new(206)
                    .set_body_bytes(vec![9u8; 100])
                    .insert_header("content-range", "bytes 100-199/200"),
            )
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let ctx = context(&server, &dir, Some(200)).await;

        let mut written = 0;
        let bytes = fetch_chunk(&ctx, &second_chunk(), &mut written).await.unwrap();
        assert_eq!(bytes, 100);
        ctx.writer.finalize().await.unwrap();

        let data = std::fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(data.len(), 200);
        assert!(data[..100].iter().all(|b| *b == 0));
        assert!(data[100..].iter().all(|b| *b == 9));
    }

    #[tokio::test]
    async fn test_fetch_chunk_rejects_full_body_for_ranged_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 200]))
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let ctx = context(&server, &dir, Some(200)).await;

        let mut written = 0;
        let result = fetch_chunk(&ctx, &second_chunk(), &mut written).await;
        assert!(matches!(result, Err(DownloadError::RangeMismatch { .. })));
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_fetch_chunk_rejects_wrong_content_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(206)
                    .set_body_bytes(vec![0u8; 50])
                    .insert_header("content-range", "bytes 100-149/200"),
            )
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let ctx = context(&server, &dir, Some(200)).await;

        let mut written = 0;
        let result = fetch_chunk(&ctx, &second_chunk(), &mut written).await;
        assert!(matches!(result, Err(DownloadError::RangeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_fetch_chunk_detects_changed_total() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(206)
                    .set_body_bytes(vec![0u8; 100])
                    .insert_header("content-range", "bytes 100-199/999"),
            )
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let ctx = context(&server, &dir, Some(200)).await;

        let mut written = 0;
        let result = fetch_chunk(&ctx, &second_chunk(), &mut written).await;
        assert!(matches!(
            result,
            Err(DownloadError::SizeMismatch {
                expected: 200,
                actual: 999,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_fetch_chunk_short_body_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(206)
                    .set_body_bytes(vec![0u8; 60])
                    .insert_header("content-range", "bytes 100-199/200"),
            )
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let ctx = context(&server, &dir, Some(200)).await;

        let mut written = 0;
        let result = fetch_chunk(&ctx, &second_chunk(), &mut written).await;
        assert!(matches!(
            result,
            Err(DownloadError::Truncated {
                index: 1,
                expected_bytes: 100,
                actual_bytes: 60,
                ..
            })
        ));
        assert_eq!(written, 60);
    }

    #[tokio::test]
    async fn test_unranged_chunk_streams_whole_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let ctx = context(&server, &dir, None).await;
        let chunk = plan(None, false, 4, 1).remove(0);

        let mut written = 0;
        let bytes = fetch_chunk(&ctx, &chunk, &mut written).await.unwrap();
        assert_eq!(bytes, 11);
        ctx.writer.finalize().await.unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("out.bin")).unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn test_run_attempt_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(206)
                    .set_body_bytes(vec![0u8; 100])
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&server, &dir, Some(200)).await;
        ctx.attempt_timeout = Duration::from_millis(100);

        let mut chunk = second_chunk();
        chunk.attempts = 1;
        let report = run_attempt(Arc::new(ctx), chunk, Duration::ZERO).await;
        assert_eq!(report.index, 1);
        assert_eq!(report.attempt, 1);
        assert!(matches!(report.result, Err(DownloadError::Timeout { .. })));
    }

    /// Serves one 206 for bytes 100-199 in ten packets, `gap` apart.
    async fn trickle_server(gap: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(
                    b"HTTP/1.1 206 Partial Content\r\n\
                      Content-Length: 100\r\n\
                      Content-Range: bytes 100-199/200\r\n\
                      Connection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for _ in 0..10 {
                if socket.write_all(&[7u8; 10]).await.is_err() {
                    return;
                }
                tokio::time::sleep(gap).await;
            }
        });
        format!("http://{addr}/file")
    }

    #[tokio::test]
    async fn test_slow_chunk_that_keeps_progressing_completes() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&server, &dir, Some(200)).await;
        ctx.url = trickle_server(Duration::from_millis(60)).await;
        ctx.attempt_timeout = Duration::from_millis(300);

        let mut written = 0;
        let bytes = fetch_chunk(&ctx, &second_chunk(), &mut written).await.unwrap();
        assert_eq!(bytes, 100);
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&server, &dir, Some(200)).await;
        ctx.url = trickle_server(Duration::from_millis(500)).await;
        ctx.attempt_timeout = Duration::from_millis(150);

        let mut written = 0;
        let result = fetch_chunk(&ctx, &second_chunk(), &mut written).await;
        assert!(matches!(result, Err(DownloadError::Timeout { .. })));
        assert_eq!(written, 10);
    }

    #[tokio::test]
    async fn test_unranged_retry_discards_longer_earlier_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'B'; 600]))
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let ctx = context(&server, &dir, None).await;
        ctx.writer.write_at(0, &[b'A'; 1000]).await.unwrap();
        let chunk = plan(None, false, 4, 1).remove(0);

        let mut written = 0;
        fetch_chunk(&ctx, &chunk, &mut written).await.unwrap();
        assert_eq!(ctx.writer.finalize().await.unwrap(), 600);
        assert_eq!(
            std::fs::read(dir.path().join("out.bin")).unwrap(),
            vec![b'B'; 600]
        );
    }
}
