// HLS Manifest Model: typed master and media playlists built on top of m3u8-rs.
//
// Every URI found in a playlist is resolved against the playlist's own URL at
// parse time, so downstream components only ever see absolute locators.

use crate::hls::error::{ManifestError, ManifestKind};
use m3u8_rs::{Playlist, parse_playlist_res};
use tracing::{debug, trace};
use url::Url;

/// One alternate rendition listed in a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub width: u64,
    pub height: u64,
    pub bandwidth: u64,
    pub uri: Url,
}

impl Variant {
    /// Resolution rendered as `WIDTHxHEIGHT`, the format quality selectors use.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMethod {
    None,
    Aes128,
    Other(String),
}

/// An `EXT-X-KEY` declaration. Key material itself is fetched lazily by the
/// key resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    pub method: KeyMethod,
    pub uri: Option<Url>,
    pub iv: Option<[u8; 16]>,
}

impl EncryptionKey {
    pub fn is_aes128(&self) -> bool {
        self.method == KeyMethod::Aes128
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Position inside the media playlist. Slots are keyed by this value.
    pub index: usize,
    /// Media sequence number. Informational only.
    pub sequence: u64,
    pub uri: Url,
    pub duration: f32,
    /// Key declared after the first segment that covers this one, if any.
    pub key: Option<EncryptionKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaManifest {
    pub url: Url,
    pub media_sequence: u64,
    pub end_list: bool,
    /// Key declared ahead of the first segment.
    pub key: Option<EncryptionKey>,
    pub segments: Vec<Segment>,
}

impl MediaManifest {
    /// The key that applies to `segment`: a later declaration covering it
    /// wins, otherwise the playlist-level key is inherited.
    pub fn effective_key<'a>(&'a self, segment: &'a Segment) -> Option<&'a EncryptionKey> {
        segment.key.as_ref().or(self.key.as_ref())
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MasterManifest {
    pub url: Url,
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    Master(MasterManifest),
    Media(MediaManifest),
}

impl Manifest {
    pub fn kind(&self) -> ManifestKind {
        match self {
            Manifest::Master(_) => ManifestKind::Master,
            Manifest::Media(_) => ManifestKind::Media,
        }
    }
}

/// Resolve `reference` against `base`. References that already carry an
/// http(s) scheme are used as-is.
pub fn resolve_uri(base: &Url, reference: &str) -> Result<Url, ManifestError> {
    if let Ok(absolute) = Url::parse(reference) {
        if matches!(absolute.scheme(), "http" | "https") {
            return Ok(absolute);
        }
    }
    base.join(reference).map_err(|e| ManifestError::Url {
        base: base.to_string(),
        reference: reference.to_string(),
        reason: e.to_string(),
    })
}

/// Parse playlist text fetched from `url` into whichever kind it is.
pub fn parse_manifest(url: &Url, data: &[u8]) -> Result<Manifest, ManifestError> {
    let text = std::str::from_utf8(data).map_err(|e| ManifestError::Parse {
        url: url.to_string(),
        reason: format!("playlist content is not valid UTF-8: {e}"),
    })?;

    let playlist = parse_playlist_res(text.as_bytes()).map_err(|e| {
        let mut reason = e.to_string();
        // nom echoes the unparsed remainder back; keep the message readable
        if reason.len() > 160 {
            let cut = (0..=160).rev().find(|i| reason.is_char_boundary(*i)).unwrap_or(0);
            reason.truncate(cut);
            reason.push_str("...");
        }
        ManifestError::Parse {
            url: url.to_string(),
            reason,
        }
    })?;

    match playlist {
        Playlist::MasterPlaylist(pl) => {
            let mut variants = Vec::with_capacity(pl.variants.len());
            for variant in pl.variants.iter().filter(|v| !v.is_i_frame) {
                let (width, height) = variant
                    .resolution
                    .map(|r| (r.width, r.height))
                    .unwrap_or((0, 0));
                variants.push(Variant {
                    width,
                    height,
                    bandwidth: variant.bandwidth,
                    uri: resolve_uri(url, &variant.uri)?,
                });
            }
            debug!(url = %url, variants = variants.len(), "Parsed master playlist");
            Ok(Manifest::Master(MasterManifest {
                url: url.clone(),
                variants,
            }))
        }
        Playlist::MediaPlaylist(pl) => {
            let mut manifest_key = None;
            // m3u8-rs attaches EXT-X-KEY to the next segment only; a
            // mid-playlist declaration holds until the next one.
            let mut rotated_key: Option<EncryptionKey> = None;
            let mut segments = Vec::with_capacity(pl.segments.len());
            for (index, segment) in pl.segments.iter().enumerate() {
                let declared = segment
                    .key
                    .as_ref()
                    .map(|k| convert_key(url, k))
                    .transpose()?;
                // A key ahead of the first URI belongs to the playlist as a whole.
                if index == 0 {
                    manifest_key = declared;
                } else if declared.is_some() {
                    rotated_key = declared;
                }
                trace!(index, uri = %segment.uri, "Parsed media segment");
                segments.push(Segment {
                    index,
                    sequence: pl.media_sequence + index as u64,
                    uri: resolve_uri(url, &segment.uri)?,
                    duration: segment.duration,
                    key: rotated_key.clone(),
                });
            }
            debug!(
                url = %url,
                segments = segments.len(),
                encrypted = manifest_key.is_some(),
                "Parsed media playlist"
            );
            Ok(Manifest::Media(MediaManifest {
                url: url.clone(),
                media_sequence: pl.media_sequence,
                end_list: pl.end_list,
                key: manifest_key,
                segments,
            }))
        }
    }
}

/// Parse a playlist that must be a media playlist.
pub fn parse_media_manifest(url: &Url, data: &[u8]) -> Result<MediaManifest, ManifestError> {
    match parse_manifest(url, data)? {
        Manifest::Media(media) => Ok(media),
        Manifest::Master(_) => Err(ManifestError::Kind {
            url: url.to_string(),
            expected: ManifestKind::Media,
            found: ManifestKind::Master,
        }),
    }
}

/// Parse a playlist that must be a master playlist.
pub fn parse_master_manifest(url: &Url, data: &[u8]) -> Result<MasterManifest, ManifestError> {
    match parse_manifest(url, data)? {
        Manifest::Master(master) => Ok(master),
        Manifest::Media(_) => Err(ManifestError::Kind {
            url: url.to_string(),
            expected: ManifestKind::Master,
            found: ManifestKind::Media,
        }),
    }
}

fn convert_key(base: &Url, key: &m3u8_rs::Key) -> Result<EncryptionKey, ManifestError> {
    let method = match &key.method {
        m3u8_rs::KeyMethod::None => KeyMethod::None,
        m3u8_rs::KeyMethod::AES128 => KeyMethod::Aes128,
        other => KeyMethod::Other(format!("{other:?}")),
    };
    let uri = key
        .uri
        .as_deref()
        .map(|uri| resolve_uri(base, uri))
        .transpose()?;
    let iv = key
        .iv
        .as_deref()
        .map(|iv| parse_iv(base, iv))
        .transpose()?;
    Ok(EncryptionKey { method, uri, iv })
}

fn parse_iv(base: &Url, iv_hex_str: &str) -> Result<[u8; 16], ManifestError> {
    let iv_str = iv_hex_str
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let mut iv_bytes = [0u8; 16];
    hex::decode_to_slice(iv_str, &mut iv_bytes).map_err(|e| ManifestError::Parse {
        url: base.to_string(),
        reason: format!("Failed to parse IV '{iv_hex_str}': {e}"),
    })?;
    Ok(iv_bytes)
}
