use std::path::PathBuf;
use std::sync::Arc;

use crate::hls::playlist::Variant;

/// Progress notifications emitted while a download runs.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// The media playlist is known and segments are about to be queued.
    ManifestResolved {
        url: String,
        variant: Option<Variant>,
        total_segments: usize,
        encrypted: bool,
    },
    SegmentCompleted {
        index: usize,
        bytes: usize,
        completed: usize,
        total: usize,
    },
    /// A segment attempt failed. `will_retry` tells whether it went back on the queue.
    SegmentFailed {
        index: usize,
        attempt: u32,
        error: String,
        will_retry: bool,
    },
    SegmentAbandoned {
        index: usize,
        attempts: u32,
    },
    AssemblyFinished {
        path: PathBuf,
        bytes_written: u64,
        missing: usize,
    },
}

pub type EventCallback = Arc<dyn Fn(DownloadEvent) + Send + Sync>;
