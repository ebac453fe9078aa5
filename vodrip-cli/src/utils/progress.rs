use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use vodrip_engine::DownloadEvent;

use super::format_bytes;

fn segment_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

#[derive(Default)]
struct BarState {
    bar: Option<ProgressBar>,
    bytes: u64,
}

/// Renders download events as a segment progress bar.
#[derive(Clone)]
pub struct ProgressManager {
    multi: MultiProgress,
    state: Arc<Mutex<BarState>>,
    disabled: bool,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            state: Arc::new(Mutex::new(BarState::default())),
            disabled: false,
        }
    }

    pub fn new_disabled(multi: MultiProgress) -> Self {
        Self {
            disabled: true,
            ..Self::new(multi)
        }
    }

    fn state(&self) -> MutexGuard<'_, BarState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn handle_event(&self, event: DownloadEvent) {
        if self.disabled {
            return;
        }

        let mut state = self.state();
        match event {
            DownloadEvent::ManifestResolved {
                total_segments,
                variant,
                encrypted,
                ..
            } => {
                let bar = self.multi.add(ProgressBar::new(total_segments as u64));
                bar.set_style(segment_style());
                let quality = variant.map_or_else(|| "media playlist".to_string(), |v| v.resolution());
                let lock = if encrypted { " (encrypted)" } else { "" };
                bar.set_message(format!("Downloading {quality}{lock}"));
                bar.enable_steady_tick(Duration::from_millis(500));
                state.bar = Some(bar);
                state.bytes = 0;
            }
            DownloadEvent::SegmentCompleted {
                bytes, completed, ..
            } => {
                state.bytes += bytes as u64;
                let downloaded = format_bytes(state.bytes);
                if let Some(bar) = &state.bar {
                    bar.set_position(completed as u64);
                    bar.set_message(format!("Downloaded {downloaded}"));
                }
            }
            DownloadEvent::SegmentFailed { .. } => {}
            DownloadEvent::SegmentAbandoned { index, attempts } => {
                if let Some(bar) = &state.bar {
                    bar.println(format!("Segment {index} skipped after {attempts} attempts"));
                }
            }
            DownloadEvent::AssemblyFinished {
                path,
                bytes_written,
                ..
            } => {
                if let Some(bar) = state.bar.take() {
                    bar.finish_with_message(format!(
                        "Merged {} into {}",
                        format_bytes(bytes_written),
                        path.display()
                    ));
                }
            }
        }
    }

    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}
