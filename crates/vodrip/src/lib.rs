//! # vodrip engine
//!
//! Downloads a complete HLS video-on-demand rendition into one transport
//! stream file.
//!
//! ## Features
//!
//! - Master playlist variant selection by resolution, shorthand or max/min
//! - AES-128 segment decryption with a shared key cache
//! - Concurrent segment workers with bounded, backed-off requeueing
//! - Gap-tolerant, order-preserving assembly from memory or temp files

pub mod builder;
pub mod config;
pub mod error;
pub mod hls;
pub mod http;
pub mod protocol_builder;

#[cfg(test)]
pub(crate) mod test_util;

pub use builder::DownloaderConfigBuilder;
pub use config::DownloaderConfig;
pub use error::DownloadError;
pub use hls::{
    DownloadEvent, DownloadReport, DownloadRequest, HlsConfig, HlsDownloader, RetryPolicy,
    StorageMode,
};
pub use http::{HttpFetch, ReqwestFetch, create_client};
pub use protocol_builder::HlsProtocolBuilder;
