//! HTTP client wrapper for metadata probes and ranged chunk requests.
//!
//! This module provides the `HttpClient` struct which owns the pooled
//! `reqwest::Client`, applies timeouts, redirect policy and caller headers,
//! and turns non-success responses into structured [`DownloadError`]s.

use std::time::Duration;

use reqwest::header::{HeaderMap, IF_RANGE, RANGE, RETRY_AFTER};
use reqwest::{Client, Method, Response, redirect};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, MAX_REDIRECTS, READ_TIMEOUT_SECS};
use super::error::DownloadError;

/// Default User-Agent (identifies the tool and version).
const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Transport settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Maximum idle time between body packets.
    pub read_timeout: Duration,
    /// Follow redirects (up to [`MAX_REDIRECTS`] hops).
    pub follow_redirects: bool,
    /// Headers sent with every request. Passed through untouched.
    pub headers: HeaderMap,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            follow_redirects: true,
            headers: HeaderMap::new(),
        }
    }
}

/// HTTP client shared by the probe and every chunk worker of a download.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client from the given transport settings.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Network`] if the underlying client cannot be built
    /// (for example, invalid TLS backend configuration).
    pub fn new(config: &ClientConfig) -> Result<Self, DownloadError> {
        let redirect_policy = if config.follow_redirects {
            redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .redirect(redirect_policy)
            .user_agent(DEFAULT_USER_AGENT)
            .default_headers(config.headers.clone())
            .build()
            .map_err(|e| DownloadError::network("<client>", e))?;

        Ok(Self { client })
    }

    /// Sends a HEAD request.
    ///
    /// # Errors
    ///
    /// Returns a transport error or [`DownloadError::HttpStatus`] for non-2xx responses.
    #[instrument(level = "debug", skip(self))]
    pub async fn head(&self, url: &str) -> Result<Response, DownloadError> {
        self.send(Method::HEAD, url, None, None).await
    }

    /// Sends a GET request, optionally limited to a byte range.
    ///
    /// `if_range` carries the validator (ETag or Last-Modified) captured by the
    /// probe, so a changed resource answers with the full body instead of a
    /// stale range.
    ///
    /// # Errors
    ///
    /// Returns a transport error or [`DownloadError::HttpStatus`] for non-2xx responses.
    #[instrument(level = "debug", skip(self))]
    pub async fn get(
        &self,
        url: &str,
        range: Option<&str>,
        if_range: Option<&str>,
    ) -> Result<Response, DownloadError> {
        self.send(Method::GET, url, range, if_range).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        range: Option<&str>,
        if_range: Option<&str>,
    ) -> Result<Response, DownloadError> {
        let mut request = self.client.request(method, url);
        if let Some(range) = range {
            request = request.header(RANGE, range);
            if let Some(validator) = if_range {
                request = request.header(IF_RANGE, validator);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::from_request(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = header_str(&response, RETRY_AFTER.as_str()).map(str::to_string);
            debug!(status = status.as_u16(), ?retry_after, "request rejected");
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        Ok(response)
    }
}

/// Reads a response header as trimmed text, ignoring non-ASCII values.
pub(crate) fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
