//! Shared helpers for integration tests: a range-aware wiremock responder.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rangedl::RetryPolicy;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Deterministic, non-repeating-looking test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| u8::try_from((i * 31 + i / 7) % 256).unwrap_or(0))
        .collect()
}

/// Retry policy with millisecond delays so retry tests stay fast.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_millis(10),
        Duration::from_millis(50),
        2.0,
    )
    .with_jitter(Duration::ZERO)
}

/// Parses `bytes=start-end` (closed ranges only, as the engine sends them).
pub fn requested_range(request: &Request) -> Option<(usize, usize)> {
    let raw = request.headers.get("range")?.to_str().ok()?;
    let (start, end) = raw.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

/// Serves a byte buffer, honoring `Range` when range support is enabled.
pub struct RangeFile {
    body: Vec<u8>,
    ranges: bool,
}

impl RangeFile {
    pub fn new(body: Vec<u8>, ranges: bool) -> Self {
        Self { body, ranges }
    }
}

impl Respond for RangeFile {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        match requested_range(request) {
            Some((start, end)) if self.ranges && start <= end && end < self.body.len() => {
                ResponseTemplate::new(206)
                    .set_body_bytes(self.body[start..=end].to_vec())
                    .insert_header(
                        "Content-Range",
                        format!("bytes {start}-{end}/{}", self.body.len()).as_str(),
                    )
            }
            _ => ResponseTemplate::new(200).set_body_bytes(self.body.clone()),
        }
    }
}

/// Fails the first `failures` requests with the given status, then serves ranges.
pub struct FlakyRangeFile {
    inner: RangeFile,
    failures: usize,
    status: u16,
    seen: AtomicUsize,
}

impl FlakyRangeFile {
    pub fn new(body: Vec<u8>, failures: usize, status: u16) -> Self {
        Self {
            inner: RangeFile::new(body, true),
            failures,
            status,
            seen: AtomicUsize::new(0),
        }
    }
}

impl Respond for FlakyRangeFile {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if self.seen.fetch_add(1, Ordering::SeqCst) < self.failures {
            return ResponseTemplate::new(self.status).insert_header("Retry-After", "0");
        }
        self.inner.respond(request)
    }
}

/// Mounts HEAD metadata for `route`.
pub async fn mount_head(
    server: &MockServer,
    route: &str,
    len: usize,
    disposition: Option<&str>,
    ranges: bool,
) {
    let mut head =
        ResponseTemplate::new(200).insert_header("Content-Length", len.to_string().as_str());
    if ranges {
        head = head.insert_header("Accept-Ranges", "bytes");
    }
    if let Some(disposition) = disposition {
        head = head.insert_header("Content-Disposition", disposition);
    }
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(head)
        .mount(server)
        .await;
}

/// Mounts HEAD and GET for `route` serving `body`.
pub async fn serve_file(
    server: &MockServer,
    route: &str,
    body: &[u8],
    disposition: Option<&str>,
    ranges: bool,
) {
    mount_head(server, route, body.len(), disposition, ranges).await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(RangeFile::new(body.to_vec(), ranges))
        .with_priority(u8::MAX)
        .mount(server)
        .await;
}

/// GET requests the server received for `route`.
pub async fn gets_for(server: &MockServer, route: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "GET" && r.url.path() == route)
        .collect()
}

/// Bare HTTP/1.1 server for responses wiremock cannot produce: no
/// `Content-Length`, or a body cut off mid-stream.
///
/// HEAD requests get `head`; GETs consume `gets` in order. Every connection
/// is closed after one response.
pub struct ScriptedServer {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedServer {
    pub async fn start(route: &str, head: Vec<u8>, gets: Vec<Vec<u8>>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}{route}", listener.local_addr()?);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        tokio::spawn(async move {
            let mut gets = VecDeque::from(gets);
            while let Ok((mut socket, _)) = listener.accept().await {
                let Some(request) = read_request_head(&mut socket).await else {
                    continue;
                };
                let reply = if request.starts_with("HEAD") {
                    head.clone()
                } else {
                    gets.pop_front().unwrap_or_else(|| {
                        b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_vec()
                    })
                };
                log.lock().unwrap_or_else(PoisonError::into_inner).push(request);
                let _ = socket.write_all(&reply).await;
                let _ = socket.shutdown().await;
            }
        });

        Ok(Self { url, requests })
    }

    /// Request heads of every GET received so far, lowercased.
    pub fn gets(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.starts_with("GET"))
            .map(|r| r.to_ascii_lowercase())
            .collect()
    }
}

/// Raw response: status line, headers, then `body`.
pub fn raw_response(status: &str, headers: &[&str], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status}\r\n");
    for header in headers {
        out.push_str(header);
        out.push_str("\r\n");
    }
    out.push_str("Connection: close\r\n\r\n");
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

async fn read_request_head(socket: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        head.extend_from_slice(&buf[..n]);
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}
