use std::path::PathBuf;
use std::time::Duration;

use crate::DownloaderConfig;
use crate::hls::retry::RetryPolicy;
use crate::hls::selector::QualityTable;

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    /// HTTP configuration used when the engine builds its own client
    pub base: DownloaderConfig,
    pub playlist_config: HlsPlaylistConfig,
    pub scheduler_config: HlsSchedulerConfig,
    pub decryption_config: HlsDecryptionConfig,
    pub storage_config: HlsStorageConfig,
}

// --- Playlist Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsPlaylistConfig {
    /// Numeric quality shorthands ("720" -> "1280x720")
    pub quality_table: QualityTable,
}

// --- Scheduler Configuration ---
#[derive(Debug, Clone)]
pub struct HlsSchedulerConfig {
    /// Number of workers pulling segments off the queue
    pub download_concurrency: usize,
    pub retry_policy: RetryPolicy,
}

impl Default for HlsSchedulerConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 25,
            retry_policy: RetryPolicy::default(),
        }
    }
}

// --- Decryption Configuration ---
#[derive(Debug, Clone)]
pub struct HlsDecryptionConfig {
    pub key_cache_ttl: Duration,
    pub key_cache_capacity: u64,
}

impl Default for HlsDecryptionConfig {
    fn default() -> Self {
        Self {
            key_cache_ttl: Duration::from_secs(60 * 60),
            key_cache_capacity: 64,
        }
    }
}

// --- Storage Configuration ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum StorageMode {
    /// One temporary file per segment
    #[default]
    Disk,
    /// Keep every segment in memory until assembly
    Memory,
}

#[derive(Debug, Clone, Default)]
pub struct HlsStorageConfig {
    pub mode: StorageMode,
    /// Parent directory for segment files; the system temp dir when unset
    pub temp_dir: Option<PathBuf>,
}
