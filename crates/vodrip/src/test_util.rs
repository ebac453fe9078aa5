//! In-memory fetch double shared by the engine's tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cipher::block_padding::Pkcs7;
use cipher::{BlockEncryptMut, KeyIvInit};
use parking_lot::Mutex;
use url::Url;

use crate::hls::error::FetchError;
use crate::http::HttpFetch;

#[derive(Default)]
struct Route {
    body: Option<Bytes>,
    failures_left: u32,
    always_fail: bool,
    delay: Duration,
    requests: usize,
}

/// Scripted [`HttpFetch`]: bodies, transient failures and delays per URL.
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct MockFetch {
    routes: Mutex<HashMap<String, Route>>,
}

impl MockFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, body: impl Into<Bytes>) {
        self.routes.lock().entry(url.to_string()).or_default().body = Some(body.into());
    }

    /// Fail the next `times` requests to `url` before serving its body.
    pub fn fail_times(&self, url: &str, times: u32) {
        self.routes.lock().entry(url.to_string()).or_default().failures_left = times;
    }

    pub fn fail_always(&self, url: &str) {
        self.routes.lock().entry(url.to_string()).or_default().always_fail = true;
    }

    pub fn delay(&self, url: &str, delay: Duration) {
        self.routes.lock().entry(url.to_string()).or_default().delay = delay;
    }

    /// Number of requests seen for `url`, failed ones included.
    pub fn requests(&self, url: &str) -> usize {
        self.routes.lock().get(url).map_or(0, |r| r.requests)
    }
}

#[async_trait]
impl HttpFetch for MockFetch {
    async fn get(&self, url: &Url) -> Result<Bytes, FetchError> {
        let key = url.to_string();
        let (delay, outcome) = {
            let mut routes = self.routes.lock();
            let route = routes.entry(key.clone()).or_default();
            route.requests += 1;
            let outcome = if route.always_fail {
                Err(FetchError::Other {
                    url: key.clone(),
                    reason: "connection reset".to_string(),
                })
            } else if route.failures_left > 0 {
                route.failures_left -= 1;
                Err(FetchError::Other {
                    url: key.clone(),
                    reason: "connection reset".to_string(),
                })
            } else {
                route.body.clone().ok_or(FetchError::Status {
                    url: key.clone(),
                    status: 404,
                })
            };
            (route.delay, outcome)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

/// AES-128-CBC encrypt with PKCS#7 padding, the way packagers produce segments.
pub fn encrypt(plaintext: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    let cipher = cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv).unwrap();
    let padded_len = ((plaintext.len() / 16) + 1) * 16;
    let mut buffer = vec![0u8; padded_len];
    buffer[..plaintext.len()].copy_from_slice(plaintext);
    cipher
        .encrypt_padded_mut::<Pkcs7>(&mut buffer, plaintext.len())
        .unwrap()
        .to_vec()
}

/// A fake transport-stream payload for segment `index`: sync byte followed by
/// recognizable filler.
pub fn ts_payload(index: usize, len: usize) -> Vec<u8> {
    let mut data = vec![0x47u8];
    data.extend((1..len).map(|i| ((index * 31 + i) % 200) as u8 + 1));
    data
}
