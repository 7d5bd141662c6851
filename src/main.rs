//! CLI entry point for rangedl.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use rangedl::{Download, DownloadOptions, RetryPolicy};
use tracing::{debug, info, warn};

mod cli;
mod progress_bar;

use cli::Args;
use progress_bar::BarObserver;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let show_bar = !args.quiet && !args.metadata_only;
    let options = DownloadOptions::default()
        .with_connections(usize::from(args.connections))
        .with_min_chunk_size(args.min_chunk_size)
        .with_retry(RetryPolicy::with_max_attempts(u32::from(args.max_retries)))
        .with_headers(args.header_map())
        .with_exist_behavior(args.on_exist.into())
        .with_follow_redirects(!args.no_follow_redirects)
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_attempt_timeout(Duration::from_secs(args.attempt_timeout))
        .with_observer(Arc::new(BarObserver::new(show_bar)));

    let mut download = Download::new(&args.url, &args.output, options)?;

    if args.metadata_only {
        let metadata = download.metadata().await?.clone();
        let report = serde_json::json!({
            "metadata": metadata,
            "filename": download.filename(),
            "path": download.saved_file_path(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let cancel = download.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let completed = download.wait().await?;
    if !completed {
        bail!("download cancelled");
    }

    let path = download
        .saved_file_path()
        .context("download finished without a destination path")?;
    info!(path = %path.display(), chunks = download.chunks().len(), "Download complete");
    println!("{}", path.display());

    Ok(())
}
