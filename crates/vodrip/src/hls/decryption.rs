// HLS Decryption: key resolution with an in-memory key cache, plus AES-128-CBC
// segment decryption.

use crate::hls::config::HlsDecryptionConfig;
use crate::hls::error::{KeyError, SegmentError};
use crate::hls::playlist::resolve_uri;
use crate::http::HttpFetch;
use aes::Aes128;
use bytes::Bytes;
use cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use moka::future::Cache;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

// --- KeyResolver ---
// Fetches raw key material and remembers it per absolute key URL.
pub struct KeyResolver {
    fetch: Arc<dyn HttpFetch>,
    cache: Cache<String, Bytes>,
}

impl KeyResolver {
    pub fn new(fetch: Arc<dyn HttpFetch>, config: &HlsDecryptionConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.key_cache_capacity)
            .time_to_live(config.key_cache_ttl)
            .build();
        Self { fetch, cache }
    }

    /// Resolve `reference` (absolute, or relative to `base`) into key bytes.
    ///
    /// Concurrent callers asking for the same key share one fetch. Failures
    /// are not cached and not retried here.
    pub async fn resolve(&self, base: &Url, reference: &str) -> Result<Bytes, KeyError> {
        let key_url = resolve_uri(base, reference).map_err(|e| KeyError::InvalidUrl {
            reference: reference.to_string(),
            reason: e.to_string(),
        })?;

        let fetch = Arc::clone(&self.fetch);
        let url_for_fetch = key_url.clone();
        self.cache
            .try_get_with(key_url.to_string(), async move {
                let key = fetch.get(&url_for_fetch).await?;
                if key.len() != AES_BLOCK_SIZE {
                    return Err(KeyError::InvalidLength {
                        url: url_for_fetch.to_string(),
                        len: key.len(),
                    });
                }
                debug!(url = %url_for_fetch, "Fetched decryption key");
                Ok(key)
            })
            .await
            .map_err(|e: Arc<KeyError>| (*e).clone())
    }
}

/// Decrypt one AES-128-CBC segment.
///
/// When no IV is declared the key material doubles as the IV. Padding is
/// removed by trusting the final byte as the pad length.
pub fn decrypt_aes128(
    data: &[u8],
    key: &[u8],
    iv: Option<&[u8; 16]>,
) -> Result<Bytes, SegmentError> {
    if key.len() != AES_BLOCK_SIZE {
        return Err(SegmentError::Decrypt(format!(
            "key has {} bytes (expected {AES_BLOCK_SIZE})",
            key.len()
        )));
    }
    if data.is_empty() || data.len() % AES_BLOCK_SIZE != 0 {
        return Err(SegmentError::Decrypt(format!(
            "ciphertext length {} is not a positive multiple of {AES_BLOCK_SIZE}",
            data.len()
        )));
    }

    let iv: &[u8] = match iv {
        Some(iv) => iv,
        None => &key[..AES_BLOCK_SIZE],
    };

    let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|e| {
        SegmentError::Decrypt(format!("Failed to initialize AES decryptor: {e}"))
    })?;

    let mut buffer = data.to_vec();
    let decrypted_len = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|e| SegmentError::Decrypt(format!("Decryption failed: {e}")))?
        .len();
    buffer.truncate(decrypted_len);

    let pad = usize::from(buffer[decrypted_len - 1]);
    if pad > buffer.len() {
        return Err(SegmentError::Decrypt(format!(
            "padding length {pad} exceeds decrypted length {}",
            buffer.len()
        )));
    }
    buffer.truncate(buffer.len() - pad);

    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{MockFetch, encrypt};

    #[test]
    fn key_doubles_as_iv_when_none_declared() {
        let key: [u8; 16] = *b"0123456789abcdef";
        let plaintext = b"\x47transport stream payload that spans several blocks".to_vec();
        let ciphertext = encrypt(&plaintext, &key, &key);

        let decrypted = decrypt_aes128(&ciphertext, &key, None).unwrap();
        assert_eq!(decrypted.as_ref(), plaintext.as_slice());
    }

    #[test]
    fn declared_iv_is_used() {
        let key = [0x42u8; 16];
        let iv = [0x24u8; 16];
        let plaintext: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        let ciphertext = encrypt(&plaintext, &key, &iv);

        let decrypted = decrypt_aes128(&ciphertext, &key, Some(&iv)).unwrap();
        assert_eq!(decrypted.as_ref(), plaintext.as_slice());

        // Decrypting with the key as IV garbles the first block only
        let wrong = decrypt_aes128(&ciphertext, &key, None).unwrap();
        assert_ne!(&wrong[..16], &plaintext[..16]);
    }

    #[test]
    fn block_aligned_plaintext_loses_full_padding_block() {
        let key = [7u8; 16];
        let plaintext = [0x47u8; 32];
        let ciphertext = encrypt(&plaintext, &key, &key);
        assert_eq!(ciphertext.len(), 48);

        let decrypted = decrypt_aes128(&ciphertext, &key, None).unwrap();
        assert_eq!(decrypted.as_ref(), &plaintext[..]);
    }

    #[test]
    fn misaligned_or_empty_ciphertext_is_rejected() {
        let key = [1u8; 16];
        assert!(matches!(
            decrypt_aes128(&[0u8; 17], &key, None),
            Err(SegmentError::Decrypt(_))
        ));
        assert!(matches!(
            decrypt_aes128(&[], &key, None),
            Err(SegmentError::Decrypt(_))
        ));
        assert!(matches!(
            decrypt_aes128(&[0u8; 16], &[1u8; 8], None),
            Err(SegmentError::Decrypt(_))
        ));
    }

    #[test]
    fn padding_longer_than_plaintext_is_rejected() {
        use cipher::BlockEncryptMut;

        let key: [u8; 16] = *b"fedcba9876543210";
        let mut block = [0x47u8; 16];
        block[15] = 32;
        let ciphertext = cbc::Encryptor::<Aes128>::new_from_slices(&key, &key)
            .unwrap()
            .encrypt_padded_mut::<NoPadding>(&mut block, 16)
            .unwrap()
            .to_vec();

        match decrypt_aes128(&ciphertext, &key, None) {
            Err(SegmentError::Decrypt(reason)) => {
                assert!(reason.contains("padding length 32"), "{reason}")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolver_fetches_each_key_once() {
        let fetch = Arc::new(MockFetch::new());
        fetch.insert("https://cdn.example.com/keys/k1.key", vec![9u8; 16]);
        let resolver = KeyResolver::new(fetch.clone(), &HlsDecryptionConfig::default());
        let base = Url::parse("https://cdn.example.com/vod/index.m3u8").unwrap();

        let first = resolver.resolve(&base, "../keys/k1.key").await.unwrap();
        let second = resolver
            .resolve(&base, "https://cdn.example.com/keys/k1.key")
            .await
            .unwrap();

        assert_eq!(first.as_ref(), &[9u8; 16]);
        assert_eq!(first, second);
        assert_eq!(fetch.requests("https://cdn.example.com/keys/k1.key"), 1);
    }

    #[tokio::test]
    async fn resolver_reports_fetch_failures_and_bad_lengths() {
        let fetch = Arc::new(MockFetch::new());
        fetch.insert("https://cdn.example.com/short.key", vec![1u8; 5]);
        let resolver = KeyResolver::new(fetch.clone(), &HlsDecryptionConfig::default());
        let base = Url::parse("https://cdn.example.com/index.m3u8").unwrap();

        let missing = resolver.resolve(&base, "missing.key").await.unwrap_err();
        assert!(matches!(missing, KeyError::Fetch(_)));

        let short = resolver.resolve(&base, "short.key").await.unwrap_err();
        assert!(matches!(short, KeyError::InvalidLength { len: 5, .. }));

        // Failures are not cached
        fetch.insert("https://cdn.example.com/missing.key", vec![3u8; 16]);
        assert!(resolver.resolve(&base, "missing.key").await.is_ok());
    }
}
