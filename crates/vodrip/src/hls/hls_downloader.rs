use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::DownloadError;
use crate::http::{HttpFetch, ReqwestFetch};

use super::coordinator::{PendingSegment, SegmentCoordinator};
use super::decryption::KeyResolver;
use super::error::FetchError;
use super::events::{DownloadEvent, EventCallback};
use super::fetcher::SegmentFetcher;
use super::output::assemble;
use super::playlist::{Manifest, MediaManifest, Variant, parse_manifest, parse_media_manifest};
use super::selector::{QualitySelector, select};
use super::HlsConfig;
use super::store::{SegmentStore, create_store};

/// What to download and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Master or media playlist URL
    pub url: String,
    /// `max`, `min`, `WIDTHxHEIGHT` or a numeric shorthand such as `720`
    pub quality: String,
    pub output: PathBuf,
}

impl DownloadRequest {
    pub fn new(
        url: impl Into<String>,
        quality: impl Into<String>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            url: url.into(),
            quality: quality.into(),
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadReport {
    pub output_path: PathBuf,
    pub bytes_written: u64,
    pub total_segments: usize,
    /// Positions absent from the merged file.
    pub missing: Vec<usize>,
    /// Positions that ran out of retry attempts.
    pub abandoned: Vec<usize>,
    /// Rendition picked from a master playlist; `None` for a direct media playlist.
    pub variant: Option<Variant>,
    pub available_qualities: Vec<String>,
}

impl DownloadReport {
    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A media playlist ready to download.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStream {
    pub media: MediaManifest,
    pub variant: Option<Variant>,
    pub available_qualities: Vec<String>,
}

pub struct HlsDownloader {
    config: HlsConfig,
    fetch: Arc<dyn HttpFetch>,
    events: Option<EventCallback>,
    cancel: CancellationToken,
}

impl HlsDownloader {
    /// Create a downloader over an existing (typically authenticated) fetch capability.
    pub fn new(config: HlsConfig, fetch: Arc<dyn HttpFetch>) -> Result<Self, DownloadError> {
        if config.scheduler_config.download_concurrency == 0 {
            return Err(DownloadError::Config(
                "download concurrency must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            config,
            fetch,
            events: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Create a downloader with its own reqwest client built from `config.base`.
    pub fn with_config(config: HlsConfig) -> Result<Self, DownloadError> {
        let fetch = ReqwestFetch::from_config(&config.base)?;
        Self::new(config, Arc::new(fetch))
    }

    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(DownloadEvent) + Send + Sync + 'static,
    {
        self.events = Some(Arc::new(handler));
        self
    }

    /// Downloads stop, and return [`DownloadError::Cancelled`], once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &HlsConfig {
        &self.config
    }

    async fn fetch_manifest(&self, url: &Url) -> Result<Manifest, DownloadError> {
        let body = self.fetch.get(url).await?;
        Ok(parse_manifest(url, &body)?)
    }

    /// Resolve `url` to a media playlist, going through variant selection
    /// when it points at a master playlist.
    pub async fn resolve(&self, url: &str, quality: &str) -> Result<ResolvedStream, DownloadError> {
        let url = parse_url(url)?;
        match self.fetch_manifest(&url).await? {
            Manifest::Media(media) => Ok(ResolvedStream {
                media,
                variant: None,
                available_qualities: Vec::new(),
            }),
            Manifest::Master(master) => {
                let selector =
                    QualitySelector::parse(quality, &self.config.playlist_config.quality_table);
                let selection = select(&master.variants, &selector);
                let Some(variant) = selection.chosen else {
                    return Err(DownloadError::NoMatchingVariant {
                        requested: selector.to_string(),
                        available: selection.available,
                    });
                };
                info!(
                    quality = %variant.resolution(),
                    bandwidth = variant.bandwidth,
                    available = %selection.available.join(", "),
                    "Selected variant"
                );

                let body = self.fetch.get(&variant.uri).await?;
                let media = parse_media_manifest(&variant.uri, &body)?;
                Ok(ResolvedStream {
                    media,
                    variant: Some(variant),
                    available_qualities: selection.available,
                })
            }
        }
    }

    /// List the resolutions a master playlist offers. A media playlist offers none.
    pub async fn probe(&self, url: &str) -> Result<Vec<String>, DownloadError> {
        let url = parse_url(url)?;
        match self.fetch_manifest(&url).await? {
            Manifest::Master(master) => {
                Ok(select(&master.variants, &QualitySelector::Max).available)
            }
            Manifest::Media(_) => Ok(Vec::new()),
        }
    }

    /// Download every segment of the requested rendition and merge them into
    /// `request.output`.
    pub async fn download(
        &self,
        request: &DownloadRequest,
    ) -> Result<DownloadReport, DownloadError> {
        let started = Instant::now();
        let cancel = self.cancel.child_token();
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let resolved = tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            resolved = self.resolve(&request.url, &request.quality) => resolved?,
        };
        let media = resolved.media;
        let total = media.segments.len();

        self.emit(DownloadEvent::ManifestResolved {
            url: media.url.to_string(),
            variant: resolved.variant.clone(),
            total_segments: total,
            encrypted: media
                .segments
                .iter()
                .any(|s| media.effective_key(s).is_some_and(|k| k.is_aes128())),
        });
        info!(url = %media.url, segments = total, "Starting segment download");

        let keys = Arc::new(KeyResolver::new(
            Arc::clone(&self.fetch),
            &self.config.decryption_config,
        ));
        self.prefetch_playlist_key(&keys, &media).await;

        let store: Arc<dyn SegmentStore> = Arc::from(create_store(&self.config.storage_config)?);
        let queue = media
            .segments
            .iter()
            .map(|segment| {
                PendingSegment::new(segment.clone(), media.effective_key(segment).cloned())
            })
            .collect();

        let coordinator = Arc::new(SegmentCoordinator::new(
            queue,
            SegmentFetcher::new(Arc::clone(&self.fetch), keys),
            Arc::clone(&store),
            self.config.scheduler_config.retry_policy.clone(),
            self.events.clone(),
            cancel,
        ));
        let outcome = coordinator
            .run(self.config.scheduler_config.download_concurrency)
            .await?;

        let assembly = assemble(store.as_ref(), total, &request.output).await?;
        self.emit(DownloadEvent::AssemblyFinished {
            path: assembly.path.clone(),
            bytes_written: assembly.bytes_written,
            missing: assembly.missing.len(),
        });

        if !assembly.missing.is_empty() {
            warn!(missing = assembly.missing.len(), total, "Merged output has gaps");
        }
        info!(
            path = %assembly.path.display(),
            bytes = assembly.bytes_written,
            completed = outcome.completed,
            elapsed = ?started.elapsed(),
            "Download finished"
        );

        Ok(DownloadReport {
            output_path: assembly.path,
            bytes_written: assembly.bytes_written,
            total_segments: total,
            missing: assembly.missing,
            abandoned: outcome.abandoned,
            variant: resolved.variant,
            available_qualities: resolved.available_qualities,
        })
    }

    // Warm the key cache with the playlist-level key. Failures are left for
    // the segments to hit (and retry) on their own.
    async fn prefetch_playlist_key(&self, keys: &KeyResolver, media: &MediaManifest) {
        let Some(key) = media.key.as_ref().filter(|k| k.is_aes128()) else {
            return;
        };
        let Some(uri) = key.uri.as_ref() else {
            return;
        };
        match keys.resolve(&media.url, uri.as_str()).await {
            Ok(_) => debug!(key = %uri, "Pre-resolved playlist key"),
            Err(e) => warn!(key = %uri, error = %e, "Failed to pre-resolve playlist key"),
        }
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(callback) = &self.events {
            callback(event);
        }
    }
}

fn parse_url(url: &str) -> Result<Url, DownloadError> {
    Url::parse(url).map_err(|e| {
        DownloadError::Fetch(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
    })
}
