// HLS Segment Fetcher: download one segment, decrypt it when the playlist
// says so, and repair its transport-stream framing.

use crate::hls::decryption::{KeyResolver, decrypt_aes128};
use crate::hls::error::SegmentError;
use crate::hls::playlist::{EncryptionKey, KeyMethod, Segment};
use crate::http::HttpFetch;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, trace};

/// MPEG-TS packet sync byte.
pub const TS_SYNC_BYTE: u8 = 0x47;

pub struct SegmentFetcher {
    fetch: Arc<dyn HttpFetch>,
    keys: Arc<KeyResolver>,
}

impl SegmentFetcher {
    pub fn new(fetch: Arc<dyn HttpFetch>, keys: Arc<KeyResolver>) -> Self {
        Self { fetch, keys }
    }

    /// Fetch `segment` using its effective key and return the repaired bytes.
    pub async fn fetch(
        &self,
        segment: &Segment,
        key: Option<&EncryptionKey>,
    ) -> Result<Bytes, SegmentError> {
        let raw = self.fetch.get(&segment.uri).await?;
        trace!(index = segment.index, bytes = raw.len(), "Segment body received");

        let plain = match key {
            Some(key) => self.decrypt(segment, key, raw).await?,
            None => raw,
        };

        Ok(repair_framing(plain))
    }

    async fn decrypt(
        &self,
        segment: &Segment,
        key: &EncryptionKey,
        data: Bytes,
    ) -> Result<Bytes, SegmentError> {
        match &key.method {
            KeyMethod::None => Ok(data),
            KeyMethod::Aes128 => {
                let key_url = key.uri.as_ref().ok_or_else(|| {
                    SegmentError::Decrypt("AES-128 key declared without a URI".to_string())
                })?;
                let material = self.keys.resolve(&segment.uri, key_url.as_str()).await?;
                let decrypted = decrypt_aes128(&data, &material, key.iv.as_ref())?;
                debug!(
                    index = segment.index,
                    encrypted = data.len(),
                    decrypted = decrypted.len(),
                    "Segment decrypted"
                );
                Ok(decrypted)
            }
            KeyMethod::Other(method) => Err(SegmentError::Decrypt(format!(
                "unsupported encryption method {method}"
            ))),
        }
    }
}

/// Drop everything before the first sync byte. Buffers without one are
/// returned untouched.
pub fn repair_framing(data: Bytes) -> Bytes {
    match memchr::memchr(TS_SYNC_BYTE, &data) {
        Some(0) | None => data,
        Some(offset) => {
            trace!(offset, "Stripping bytes ahead of the first sync byte");
            data.slice(offset..)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::config::HlsDecryptionConfig;
    use crate::test_util::{MockFetch, encrypt};
    use url::Url;

    fn fetcher(mock: &Arc<MockFetch>) -> SegmentFetcher {
        let fetch: Arc<dyn HttpFetch> = mock.clone();
        let keys = Arc::new(KeyResolver::new(
            Arc::clone(&fetch),
            &HlsDecryptionConfig::default(),
        ));
        SegmentFetcher::new(fetch, keys)
    }

    fn segment(uri: &str) -> Segment {
        Segment {
            index: 0,
            sequence: 0,
            uri: Url::parse(uri).unwrap(),
            duration: 4.0,
            key: None,
        }
    }

    fn aes_key(uri: &str, iv: Option<[u8; 16]>) -> EncryptionKey {
        EncryptionKey {
            method: KeyMethod::Aes128,
            uri: Some(Url::parse(uri).unwrap()),
            iv,
        }
    }

    #[test]
    fn repair_strips_leading_garbage() {
        let repaired = repair_framing(Bytes::from_static(&[0x00, 0xFF, 0x12, 0x47, 0x01, 0x02]));
        assert_eq!(repaired.as_ref(), &[0x47, 0x01, 0x02]);
    }

    #[test]
    fn repair_leaves_clean_and_markerless_buffers_alone() {
        let clean = Bytes::from_static(&[0x47, 0x40, 0x00]);
        assert_eq!(repair_framing(clean.clone()), clean);

        let markerless = Bytes::from_static(&[0x01, 0x02, 0x03]);
        assert_eq!(repair_framing(markerless.clone()), markerless);

        assert!(repair_framing(Bytes::new()).is_empty());
    }

    #[tokio::test]
    async fn plain_segment_is_repaired() {
        let mock = Arc::new(MockFetch::new());
        mock.insert("https://cdn.example.com/seg0.ts", vec![9, 9, 9, 0x47, 1, 2, 3]);

        let bytes = fetcher(&mock)
            .fetch(&segment("https://cdn.example.com/seg0.ts"), None)
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), &[0x47, 1, 2, 3]);
    }

    #[tokio::test]
    async fn encrypted_segment_is_decrypted_then_repaired() {
        let key = [5u8; 16];
        let mut plaintext = vec![0xAA, 0xBB, 0xCC];
        plaintext.extend_from_slice(&[0x47; 188]);

        let mock = Arc::new(MockFetch::new());
        mock.insert("https://cdn.example.com/k.key", key.to_vec());
        mock.insert(
            "https://cdn.example.com/seg0.ts",
            encrypt(&plaintext, &key, &key),
        );

        let bytes = fetcher(&mock)
            .fetch(
                &segment("https://cdn.example.com/seg0.ts"),
                Some(&aes_key("https://cdn.example.com/k.key", None)),
            )
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), &plaintext[3..]);
    }

    #[tokio::test]
    async fn method_none_skips_decryption() {
        let mock = Arc::new(MockFetch::new());
        mock.insert("https://cdn.example.com/seg0.ts", vec![0x47, 7]);
        let key = EncryptionKey {
            method: KeyMethod::None,
            uri: None,
            iv: None,
        };

        let bytes = fetcher(&mock)
            .fetch(&segment("https://cdn.example.com/seg0.ts"), Some(&key))
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), &[0x47, 7]);
    }

    #[tokio::test]
    async fn failures_map_to_segment_errors() {
        let mock = Arc::new(MockFetch::new());
        mock.insert("https://cdn.example.com/seg0.ts", vec![0u8; 32]);
        let fetcher = fetcher(&mock);

        let missing = fetcher
            .fetch(&segment("https://cdn.example.com/missing.ts"), None)
            .await
            .unwrap_err();
        assert!(matches!(missing, SegmentError::Fetch(_)));

        let no_key = fetcher
            .fetch(
                &segment("https://cdn.example.com/seg0.ts"),
                Some(&aes_key("https://cdn.example.com/absent.key", None)),
            )
            .await
            .unwrap_err();
        assert!(matches!(no_key, SegmentError::Key(_)));

        let sample_aes = EncryptionKey {
            method: KeyMethod::Other("SAMPLE-AES".to_string()),
            uri: None,
            iv: None,
        };
        let unsupported = fetcher
            .fetch(&segment("https://cdn.example.com/seg0.ts"), Some(&sample_aes))
            .await
            .unwrap_err();
        assert!(matches!(unsupported, SegmentError::Decrypt(_)));
    }
}
