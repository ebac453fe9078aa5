//! The fetch capability the engine runs on.
//!
//! The engine never talks to the network directly: manifests, keys and
//! segments all go through [`HttpFetch`]. Callers that already hold an
//! authenticated session implement it themselves; [`ReqwestFetch`] covers the
//! plain case.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};
use url::Url;

use crate::hls::error::FetchError;
use crate::{DownloadError, DownloaderConfig};

#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// GET `url` and return the full response body.
    async fn get(&self, url: &Url) -> Result<Bytes, FetchError>;
}

/// Install the process-wide rustls crypto provider once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &DownloaderConfig) -> Result<Client, DownloadError> {
    install_rustls_provider();

    let mut client_builder = Client::builder()
        .use_rustls_tls()
        .pool_max_idle_per_host(8)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.pool_idle_timeout(config.read_timeout);
    }

    client_builder.build().map_err(DownloadError::from)
}

/// [`HttpFetch`] backed by a reqwest client.
#[derive(Clone)]
pub struct ReqwestFetch {
    client: Client,
}

impl ReqwestFetch {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &DownloaderConfig) -> Result<Self, DownloadError> {
        Ok(Self::new(create_client(config)?))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn get(&self, url: &Url) -> Result<Bytes, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source: Arc::new(e),
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        trace!(url = %url, bytes = body.len(), "Fetched");
        Ok(body)
    }
}
