//! Terminal progress bar driven by download events.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use rangedl::{DownloadEvent, ProgressObserver};

/// Renders [`DownloadEvent`]s on a single `indicatif` bar.
///
/// The length is set once the plan is known; unknown sizes show a byte
/// counter instead. Bytes of failed attempts are subtracted again so the bar
/// never overshoots.
pub(crate) struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    pub(crate) fn new(visible: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        if !visible {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        Self { bar }
    }

    fn use_sized_style(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
    }

    fn use_unsized_style(&self) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] {bytes} ({bytes_per_sec}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
    }
}

impl ProgressObserver for BarObserver {
    fn on_event(&self, event: &DownloadEvent) {
        match event {
            DownloadEvent::Metadata { path, .. } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.bar.set_message(name);
            }
            DownloadEvent::Planned { total_size, .. } => match total_size {
                Some(total) => self.use_sized_style(*total),
                None => self.use_unsized_style(),
            },
            DownloadEvent::ChunkProgress { bytes, .. } => self.bar.inc(*bytes),
            DownloadEvent::ChunkRetry { discarded, .. } => {
                let position = self.bar.position().saturating_sub(*discarded);
                self.bar.set_position(position);
            }
            DownloadEvent::Completed { .. } => self.bar.finish(),
            DownloadEvent::Failed { .. } => self.bar.abandon(),
            DownloadEvent::ChunkStarted { .. } | DownloadEvent::ChunkCompleted { .. } => {}
        }
    }
}
