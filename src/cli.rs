//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use rangedl::ExistBehavior;
use rangedl::download::constants::{
    ATTEMPT_TIMEOUT_SECS, CONNECT_TIMEOUT_SECS, DEFAULT_CONNECTIONS, DEFAULT_MIN_CHUNK_SIZE,
    MAX_CONNECTIONS,
};

/// Download a file over parallel HTTP range requests.
///
/// The file is named after the server's Content-Disposition header when it
/// provides one, otherwise after the URL.
#[derive(Parser, Debug)]
#[command(name = "rangedl")]
#[command(author, version, about)]
pub struct Args {
    /// URL to download
    pub url: String,

    /// Output directory or file path
    #[arg(default_value = ".")]
    pub output: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum parallel connections (1-32)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONNECTIONS as u8, value_parser = clap::value_parser!(u8).range(1..=MAX_CONNECTIONS as i64))]
    pub connections: u8,

    /// Smallest chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_MIN_CHUNK_SIZE, value_parser = clap::value_parser!(u64).range(1..))]
    pub min_chunk_size: u64,

    /// Maximum attempts per chunk, including the first (1-10)
    #[arg(short = 'r', long, default_value_t = rangedl::DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: u8,

    /// Extra request header, `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(HeaderName, HeaderValue)>,

    /// What to do when the destination file already exists
    #[arg(long, value_enum, default_value_t = OnExist::NewFile)]
    pub on_exist: OnExist,

    /// Do not follow HTTP redirects
    #[arg(long)]
    pub no_follow_redirects: bool,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = CONNECT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub connect_timeout: u64,

    /// Seconds a chunk attempt may wait for a response or its next packet
    #[arg(long, default_value_t = ATTEMPT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    pub attempt_timeout: u64,

    /// Print the probed metadata as JSON and exit without downloading
    #[arg(long)]
    pub metadata_only: bool,
}

impl Args {
    /// Collects `-H` values into a header map.
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            map.append(name.clone(), value.clone());
        }
        map
    }
}

/// `--on-exist` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnExist {
    /// Save as name_1.ext, name_2.ext, ...
    NewFile,
    /// Replace the existing file
    Overwrite,
    /// Fail
    Error,
    /// Keep the existing file and skip the download
    Ignore,
}

impl From<OnExist> for ExistBehavior {
    fn from(value: OnExist) -> Self {
        match value {
            OnExist::NewFile => Self::NewFile,
            OnExist::Overwrite => Self::Overwrite,
            OnExist::Error => Self::Error,
            OnExist::Ignore => Self::Ignore,
        }
    }
}

fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{raw}'"))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| format!("invalid header name '{}': {e}", name.trim()))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|e| format!("invalid header value for '{name}': {e}"))?;
    Ok((name, value))
}
