//! Filename resolution, sanitization, and destination path handling.
//!
//! The destination name comes from, in order:
//! 1. the `Content-Disposition` header (`filename*` before `filename`)
//! 2. the last path segment of the URL (percent-decoded)
//! 3. the fixed name [`GENERIC_FILENAME`]
//!
//! Every candidate goes through [`sanitize_filename`], so a hostile header or
//! URL can never smuggle a directory separator into the destination.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use url::Url;

use super::constants::GENERIC_FILENAME;
use super::header::parse_disposition;

/// Where a resolved filename came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenameSource {
    /// `Content-Disposition` response header.
    Disposition,
    /// Last path segment of the request URL.
    Url,
    /// Neither produced a usable name.
    Generic,
}

/// A safe, non-empty filename and its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFilename {
    /// Sanitized filename without any directory component.
    pub name: String,
    /// Which rule produced the name.
    pub source: FilenameSource,
}

/// Resolves the destination filename for a response.
///
/// Never fails: a missing or undecodable disposition silently falls back
/// to the URL, and an unusable URL falls back to [`GENERIC_FILENAME`].
#[must_use]
pub fn resolve_filename(disposition: Option<&str>, url: &Url) -> ResolvedFilename {
    if let Some(name) = disposition
        .map(parse_disposition)
        .as_ref()
        .and_then(|d| d.filename())
        .and_then(usable_filename)
    {
        return ResolvedFilename {
            name,
            source: FilenameSource::Disposition,
        };
    }

    if let Some(name) = filename_from_url(url) {
        return ResolvedFilename {
            name,
            source: FilenameSource::Url,
        };
    }

    ResolvedFilename {
        name: GENERIC_FILENAME.to_string(),
        source: FilenameSource::Generic,
    }
}

/// Filename derived from the URL's last path segment, percent-decoded and sanitized.
pub(crate) fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode_binary(last.as_bytes());
    usable_filename(&String::from_utf8_lossy(&decoded))
}

fn usable_filename(candidate: &str) -> Option<String> {
    let sanitized = sanitize_filename(candidate.trim());
    (!sanitized.trim_matches('_').trim().is_empty()).then_some(sanitized)
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            // Also handle null and control characters
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Combines the caller's target with a resolved filename.
///
/// A target that is an existing directory (or is spelled with a trailing
/// separator) receives `filename`; any other target is used as the file path.
/// The result is made absolute against the current directory.
pub(crate) fn resolve_destination(target: &Path, filename: &str) -> std::io::Result<PathBuf> {
    let spelled_as_dir = target
        .as_os_str()
        .to_string_lossy()
        .ends_with(std::path::MAIN_SEPARATOR)
        || target.as_os_str().to_string_lossy().ends_with('/');
    let joined = if spelled_as_dir || target.is_dir() {
        target.join(filename)
    } else {
        target.to_path_buf()
    };
    std::path::absolute(joined)
}

/// Resolves a unique file path, adding a numeric suffix if the file exists.
///
/// Example: `file.iso`, then `file_1.iso`, `file_2.iso`, ...
pub(crate) fn resolve_unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let filename = path
        .file_name()
        .map_or_else(|| GENERIC_FILENAME.to_string(), |n| n.to_string_lossy().into_owned());

    // Split filename into stem and extension
    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename.as_str(), ""),
    };

    for i in 1..1000 {
        let candidate = dir.join(format!("{stem}_{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }

    // Fallback (extremely unlikely)
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dir.join(format!("{stem}_{timestamp}{ext}"))
}
