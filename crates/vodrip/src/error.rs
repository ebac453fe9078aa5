use crate::hls::error::{AssembleError, FetchError, ManifestError};

// Errors a download job can end with. Per-segment failures are retried or
// reported as gaps and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Manifest fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("No variant matches quality {requested} (available: {})", available.join(", "))]
    NoMatchingVariant {
        requested: String,
        available: Vec<String>,
    },

    #[error("Assembly failed: {0}")]
    Assemble(#[from] AssembleError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download cancelled")]
    Cancelled,

    #[error("Segment worker failed: {0}")]
    Worker(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
