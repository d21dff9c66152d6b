use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use vimeo_engine::{DownloadProgress, ProgressReporter, TrackKind};

const BAR_TEMPLATE: &str =
    "{spinner:.yellow} {msg:>6} [{bar:30.yellow/white}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Byte progress bar, or a hidden one when output is suppressed.
pub fn byte_bar(visible: bool, total: Option<u64>, label: &str) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let bar = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::no_length(),
    };
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.set_message(label.to_string());
    bar
}

/// Renders the track downloads of the manifest pipeline as progress bars.
pub struct TrackBars {
    visible: bool,
    current: Mutex<Option<ProgressBar>>,
}

impl TrackBars {
    pub fn new(visible: bool) -> Self {
        Self {
            visible,
            current: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        if let Ok(mut guard) = self.current.lock() {
            f(&mut guard);
        }
    }
}

impl ProgressReporter for TrackBars {
    fn track_started(&self, kind: TrackKind, progress: DownloadProgress) {
        let bar = byte_bar(self.visible, Some(progress.total_bytes), kind.as_str());
        bar.set_position(progress.downloaded_bytes);
        self.with_bar(|slot| {
            if let Some(previous) = slot.replace(bar) {
                previous.finish_and_clear();
            }
        });
    }

    fn track_progress(&self, _kind: TrackKind, progress: DownloadProgress) {
        self.with_bar(|slot| {
            if let Some(bar) = slot.as_ref() {
                bar.set_position(progress.downloaded_bytes);
            }
        });
    }

    fn track_finished(&self, _kind: TrackKind, _progress: DownloadProgress) {
        self.with_bar(|slot| {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        });
    }
}
