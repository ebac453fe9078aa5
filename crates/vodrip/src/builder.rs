//! # Builder for DownloaderConfig
//!
//! Fluent construction of the HTTP options used by the bundled fetch
//! implementation.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use vodrip_engine::DownloaderConfig;
//!
//! let config = DownloaderConfig::builder()
//!     .with_timeout(Duration::from_secs(60))
//!     .with_connect_timeout(Duration::from_secs(15))
//!     .with_user_agent("MyApp/1.0")
//!     .with_header("Cookie", "session_id=abc")
//!     .with_follow_redirects(true)
//!     .build();
//! assert_eq!(config.user_agent, "MyApp/1.0");
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::DownloaderConfig;

/// Builder for creating DownloaderConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct DownloaderConfigBuilder {
    config: DownloaderConfig,
}

impl DownloaderConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: DownloaderConfig::default(),
        }
    }

    /// Set the overall timeout for a single HTTP request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set how long idle pooled connections are kept
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.headers.insert(name, value);
        }
        self
    }

    /// Merge headers over the defaults
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.merge_headers(&headers);
        self
    }

    /// Set whether to accept invalid certificates
    ///
    /// # Warning
    /// Only meant for testing or controlled environments.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.danger_accept_invalid_certs = accept;
        self
    }

    pub fn build(self) -> DownloaderConfig {
        self.config
    }
}

impl Default for DownloaderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = DownloaderConfigBuilder::new().build();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.follow_redirects);
        assert!(!config.danger_accept_invalid_certs);
        assert!(config.headers.contains_key(reqwest::header::ACCEPT));
    }

    #[test]
    fn test_builder_customization() {
        let config = DownloaderConfigBuilder::new()
            .with_timeout(Duration::from_secs(60))
            .with_connect_timeout(Duration::from_secs(20))
            .with_follow_redirects(false)
            .with_user_agent("CustomUserAgent/1.0")
            .with_header("X-Custom-Header", "CustomValue")
            .build();

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
        assert!(!config.follow_redirects);
        assert_eq!(config.user_agent, "CustomUserAgent/1.0");

        let header_value = config.headers.get("X-Custom-Header").unwrap();
        assert_eq!(header_value.to_str().unwrap(), "CustomValue");
    }

    #[test]
    fn test_custom_headers_override_defaults() {
        let mut custom = HeaderMap::new();
        custom.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/vnd.apple.mpegurl"),
        );
        let config = DownloaderConfigBuilder::new().with_headers(custom).build();

        assert_eq!(
            config.headers.get(reqwest::header::ACCEPT).unwrap(),
            "application/vnd.apple.mpegurl"
        );
        // Untouched defaults survive the merge
        assert!(config.headers.contains_key(reqwest::header::ACCEPT_LANGUAGE));
    }

    #[test]
    fn test_invalid_header_is_ignored() {
        let config = DownloaderConfigBuilder::new()
            .with_header("bad header", "value")
            .build();
        assert!(config.headers.get("bad header").is_none());
    }
}
