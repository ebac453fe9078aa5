//! # Protocol Builder
//!
//! Fluent construction of an [`HlsDownloader`] and its configuration.

use crate::{
    DownloadError, DownloaderConfig,
    hls::{
        HlsDownloader, QualityTable, RetryPolicy, StorageMode,
        config::HlsConfig,
    },
    http::HttpFetch,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};

/// Builder for HLS downloaders
#[derive(Debug, Clone)]
pub struct HlsProtocolBuilder {
    config: HlsConfig,
}

impl HlsProtocolBuilder {
    /// Create a new HLS protocol builder with default configuration
    pub fn new() -> Self {
        Self {
            config: HlsConfig::default(),
        }
    }

    pub fn with_base_config(mut self, base_config: DownloaderConfig) -> Self {
        self.config.base = base_config;
        self
    }

    // --- Base DownloaderConfig methods ---

    /// Set user agent for HTTP requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.base.user_agent = user_agent.into();
        self
    }

    /// Set overall HTTP timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.base.timeout = timeout;
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.base.connect_timeout = timeout;
        self
    }

    /// Set HTTP headers, replacing the defaults
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.config.base.headers = headers;
        self
    }

    /// Add a single HTTP header
    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            self.config.base.headers.insert(name, value);
        }
        self
    }

    // --- HLS PlaylistConfig methods ---

    /// Replace the numeric quality shorthand table.
    pub fn quality_table(mut self, table: QualityTable) -> Self {
        self.config.playlist_config.quality_table = table;
        self
    }

    // --- HLS SchedulerConfig methods ---

    /// Set the number of concurrent segment workers.
    pub fn download_concurrency(mut self, concurrency: usize) -> Self {
        self.config.scheduler_config.download_concurrency = concurrency;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.scheduler_config.retry_policy = policy;
        self
    }

    /// Set the attempt budget per segment; `None` retries forever.
    pub fn max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.config.scheduler_config.retry_policy.max_attempts = attempts;
        self
    }

    // --- HLS DecryptionConfig methods ---

    /// How long fetched key material stays cached.
    pub fn key_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.decryption_config.key_cache_ttl = ttl;
        self
    }

    // --- HLS StorageConfig methods ---

    pub fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.config.storage_config.mode = mode;
        self
    }

    /// Parent directory for on-disk segment slots.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage_config.temp_dir = Some(dir.into());
        self
    }

    // --- General Builder Methods ---

    /// Access the raw HLS configuration for more advanced customization.
    pub fn with_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut HlsConfig),
    {
        f(&mut self.config);
        self
    }

    /// Get a copy of the current HLS configuration.
    pub fn get_config(&self) -> HlsConfig {
        self.config.clone()
    }

    /// Build a downloader backed by a reqwest client made from the base config.
    pub fn build(self) -> Result<HlsDownloader, DownloadError> {
        HlsDownloader::with_config(self.config)
    }

    /// Build a downloader on top of a caller supplied fetch capability.
    pub fn build_with_fetch(self, fetch: Arc<dyn HttpFetch>) -> Result<HlsDownloader, DownloadError> {
        HlsDownloader::new(self.config, fetch)
    }
}

impl Default for HlsProtocolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
