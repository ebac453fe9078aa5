// HLS VOD download engine

pub mod config;
pub mod coordinator;
pub mod decryption;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod hls_downloader;
pub mod output;
pub mod playlist;
pub mod retry;
pub mod selector;
pub mod store;

// Re-exports for easier access
pub use config::{HlsConfig, StorageMode};
pub use error::{AssembleError, FetchError, KeyError, ManifestError, SegmentError};
pub use hls_downloader::{DownloadReport, DownloadRequest, HlsDownloader, ResolvedStream};
pub use events::{DownloadEvent, EventCallback};
pub use playlist::{EncryptionKey, KeyMethod, Manifest, MediaManifest, Segment, Variant};
pub use retry::RetryPolicy;
pub use selector::{QualitySelector, QualityTable};
