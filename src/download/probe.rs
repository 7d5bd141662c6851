//! Metadata probe: size, range support, and filename hints for a resource.

use reqwest::Response;
use reqwest::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, ETAG, LAST_MODIFIED,
};
use serde::Serialize;
use tracing::{debug, info, instrument};
use url::Url;

use super::DownloadError;
use super::client::{HttpClient, header_str};
use super::header::{accepts_byte_ranges, parse_content_range, parse_disposition};

/// What the server told us about the resource before any body was transferred.
///
/// Captured once per download and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// URL after redirects; chunk requests go here.
    pub final_url: String,
    /// Total size in bytes, `None` when the server did not say.
    pub total_size: Option<u64>,
    /// Whether the server advertised `Accept-Ranges: bytes`.
    pub supports_range: bool,
    /// Raw `Content-Disposition` header.
    pub disposition: Option<String>,
    /// Filename hint decoded from the disposition, before sanitization.
    pub disposition_filename: Option<String>,
    /// Entity tag.
    pub etag: Option<String>,
    /// `Last-Modified` date.
    pub last_modified: Option<String>,
}

impl Metadata {
    /// Validator suitable for `If-Range`: a strong ETag, else `Last-Modified`.
    #[must_use]
    pub fn range_validator(&self) -> Option<&str> {
        self.etag
            .as_deref()
            .filter(|tag| !tag.starts_with("W/"))
            .or(self.last_modified.as_deref())
    }

    fn from_response(response: &Response, total_size: Option<u64>, supports_range: bool) -> Self {
        let disposition = header_str(response, CONTENT_DISPOSITION.as_str()).map(str::to_string);
        let disposition_filename = disposition
            .as_deref()
            .map(parse_disposition)
            .and_then(|d| d.filename().map(str::to_string));
        Self {
            final_url: response.url().to_string(),
            total_size,
            supports_range,
            disposition,
            disposition_filename,
            etag: header_str(response, ETAG.as_str()).map(str::to_string),
            last_modified: header_str(response, LAST_MODIFIED.as_str()).map(str::to_string),
        }
    }
}

/// Probes `url` with HEAD.
///
/// When `method_fallback` is set and the server rejects HEAD with 405 or 501,
/// the probe retries with `GET` + `Range: bytes=0-0` and discards the body.
///
/// # Errors
///
/// Returns [`DownloadError::Metadata`] wrapping the transport or status error.
#[instrument(skip(client), fields(url = %url))]
pub async fn probe(
    client: &HttpClient,
    url: &Url,
    method_fallback: bool,
) -> Result<Metadata, DownloadError> {
    let metadata = match client.head(url.as_str()).await {
        Ok(response) => {
            let total_size = header_str(&response, CONTENT_LENGTH.as_str())
                .and_then(|v| v.parse::<u64>().ok());
            let supports_range = header_str(&response, ACCEPT_RANGES.as_str())
                .is_some_and(accepts_byte_ranges);
            Metadata::from_response(&response, total_size, supports_range)
        }
        Err(DownloadError::HttpStatus {
            status: 405 | 501, ..
        }) if method_fallback => {
            debug!("HEAD not allowed, probing with a one-byte GET");
            probe_with_get(client, url)
                .await
                .map_err(|e| DownloadError::metadata(url.as_str(), e))?
        }
        Err(e) => return Err(DownloadError::metadata(url.as_str(), e)),
    };

    info!(
        total_size = ?metadata.total_size,
        supports_range = metadata.supports_range,
        final_url = %metadata.final_url,
        "metadata probed"
    );
    Ok(metadata)
}

async fn probe_with_get(client: &HttpClient, url: &Url) -> Result<Metadata, DownloadError> {
    let response = client.get(url.as_str(), Some("bytes=0-0"), None).await?;

    if response.status().as_u16() == 206 {
        let total_size = header_str(&response, CONTENT_RANGE.as_str())
            .and_then(parse_content_range)
            .and_then(|range| range.total);
        return Ok(Metadata::from_response(&response, total_size, true));
    }

    // 200: the server ignored the range and would send the whole body.
    let total_size =
        header_str(&response, CONTENT_LENGTH.as_str()).and_then(|v| v.parse::<u64>().ok());
    let supports_range =
        header_str(&response, ACCEPT_RANGES.as_str()).is_some_and(accepts_byte_ranges);
    Ok(Metadata::from_response(&response, total_size, supports_range))
}
