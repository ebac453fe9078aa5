use std::sync::Arc;

/// Failures of the fetch capability itself.
#[derive(Debug, thiserror::Error, Clone)]
pub enum FetchError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Arc<reqwest::Error>,
    },
    #[error("Request to {url} failed: {reason}")]
    Other { url: String, reason: String },
    #[error("Server returned status {status} for {url}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum ManifestError {
    #[error("Failed to parse playlist {url}: {reason}")]
    Parse { url: String, reason: String },
    #[error("Expected a {expected} playlist at {url}, found a {found} playlist")]
    Kind {
        url: String,
        expected: ManifestKind,
        found: ManifestKind,
    },
    #[error("Could not resolve {reference} against {base}: {reason}")]
    Url {
        base: String,
        reference: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Master,
    Media,
}

impl std::fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestKind::Master => f.write_str("master"),
            ManifestKind::Media => f.write_str("media"),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum KeyError {
    #[error("Key fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Invalid key reference {reference}: {reason}")]
    InvalidUrl { reference: String, reason: String },
    #[error("Key from {url} has {len} bytes (expected 16)")]
    InvalidLength { url: String, len: usize },
}

/// Everything that can go wrong with a single segment. All of these are
/// recoverable: the coordinator requeues the segment.
#[derive(Debug, thiserror::Error, Clone)]
pub enum SegmentError {
    #[error("Segment fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("Segment key error: {0}")]
    Key(#[from] KeyError),
    #[error("Segment decryption error: {0}")]
    Decrypt(String),
    #[error("Segment storage error: {source}")]
    Store {
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl From<std::io::Error> for SegmentError {
    fn from(err: std::io::Error) -> Self {
        SegmentError::Store {
            source: Arc::new(err),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("Failed to write merged output {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
