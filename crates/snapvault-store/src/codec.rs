// ABOUTME: Codec selection, compression with an explicit fallback chain, and lenient decompression.
// ABOUTME: Every blob carries a short header naming the codec that actually produced it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Magic bytes at the start of every blob, followed by one codec id byte.
pub const BLOB_MAGIC: &[u8; 4] = b"SVB1";
const HEADER_LEN: usize = BLOB_MAGIC.len() + 1;

const SMALL_PAYLOAD: usize = 1024;
const LARGE_PAYLOAD: usize = 1024 * 1024;

/// Internal codec failures. Always recovered by falling back along the chain.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("codec {0} is not available in this build")]
    Unavailable(Codec),

    #[error("{codec} failed: {message}")]
    Failed { codec: Codec, message: String },
}

/// A compression algorithm a blob may be encoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    None,
    Lz4,
    Zstd,
    Gzip,
}

impl Codec {
    pub const ALL: [Codec; 4] = [Codec::Zstd, Codec::Lz4, Codec::Gzip, Codec::None];

    pub fn id(self) -> u8 {
        match self {
            Codec::None => 0,
            Codec::Lz4 => 1,
            Codec::Zstd => 2,
            Codec::Gzip => 3,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Codec::None),
            1 => Some(Codec::Lz4),
            2 => Some(Codec::Zstd),
            3 => Some(Codec::Gzip),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Lz4 => "lz4",
            Codec::Zstd => "zstd",
            Codec::Gzip => "gzip",
        }
    }

    /// Whether this codec was compiled into the build.
    pub fn is_available(self) -> bool {
        match self {
            Codec::None => true,
            Codec::Lz4 => cfg!(feature = "lz4"),
            Codec::Zstd => cfg!(feature = "zstd"),
            Codec::Gzip => cfg!(feature = "gzip"),
        }
    }

    /// Codecs to try, in order, when this one is preferred.
    fn fallback_chain(self) -> &'static [Codec] {
        match self {
            Codec::Zstd => &[Codec::Zstd, Codec::Lz4, Codec::Gzip, Codec::None],
            Codec::Lz4 => &[Codec::Lz4, Codec::Gzip, Codec::None],
            Codec::Gzip => &[Codec::Gzip, Codec::None],
            Codec::None => &[Codec::None],
        }
    }

    fn encode(self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        match self {
            Codec::None => Ok(data.to_vec()),
            Codec::Lz4 => lz4_encode(data),
            Codec::Zstd => zstd_encode(data, level),
            Codec::Gzip => gzip_encode(data, level),
        }
    }

    fn decode(self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Codec::None => Ok(data.to_vec()),
            Codec::Lz4 => lz4_decode(data),
            Codec::Zstd => zstd_decode(data),
            Codec::Gzip => gzip_decode(data),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the compressor picks a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionPolicy {
    /// Choose by payload size.
    Auto,
    /// Prefer one codec, still falling back when it is unavailable or fails.
    Fixed(Codec),
}

impl FromStr for CompressionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(CompressionPolicy::Auto),
            "none" => Ok(CompressionPolicy::Fixed(Codec::None)),
            "lz4" => Ok(CompressionPolicy::Fixed(Codec::Lz4)),
            "zstd" => Ok(CompressionPolicy::Fixed(Codec::Zstd)),
            "gzip" => Ok(CompressionPolicy::Fixed(Codec::Gzip)),
            other => Err(format!("unknown compression algorithm: {other}")),
        }
    }
}

/// Pick a codec from the uncompressed size.
pub fn select_codec(size: usize) -> Codec {
    if size < SMALL_PAYLOAD {
        Codec::None
    } else if size <= LARGE_PAYLOAD {
        Codec::Lz4
    } else {
        Codec::Zstd
    }
}

/// A compressed blob ready to be written, header included.
#[derive(Debug, Clone)]
pub struct CompressedBlob {
    pub codec: Codec,
    pub bytes: Vec<u8>,
}

/// Compress `data` under the given policy.
///
/// Walks the fallback chain of the preferred codec and records whichever
/// codec succeeded first in the blob header. `None` terminates every chain
/// and cannot fail.
pub fn compress(data: &[u8], policy: CompressionPolicy, level: i32) -> CompressedBlob {
    let preferred = match policy {
        CompressionPolicy::Auto => select_codec(data.len()),
        CompressionPolicy::Fixed(codec) => codec,
    };

    for &codec in preferred.fallback_chain() {
        match try_encode(codec, data, level) {
            Ok(body) => {
                if codec != preferred {
                    tracing::warn!("codec {} unavailable, stored blob with {}", preferred, codec);
                } else {
                    tracing::debug!("compressed {} bytes with {}", data.len(), codec);
                }
                let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
                bytes.extend_from_slice(BLOB_MAGIC);
                bytes.push(codec.id());
                bytes.extend_from_slice(&body);
                return CompressedBlob { codec, bytes };
            }
            Err(e) => {
                tracing::debug!("compression fallback: {}", e);
            }
        }
    }

    // Unreachable in practice: every chain ends in Codec::None.
    let mut bytes = Vec::with_capacity(HEADER_LEN + data.len());
    bytes.extend_from_slice(BLOB_MAGIC);
    bytes.push(Codec::None.id());
    bytes.extend_from_slice(data);
    CompressedBlob {
        codec: Codec::None,
        bytes,
    }
}

fn try_encode(codec: Codec, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
    if !codec.is_available() {
        return Err(CodecError::Unavailable(codec));
    }
    codec.encode(data, level)
}

/// Decompress a blob produced by [`compress`].
///
/// Tries the codec named in the header first, then every other known codec,
/// and finally returns the body unchanged. A blob without a valid header is
/// treated as a headerless body. This never fails so that blobs written by
/// older or newer codec sets stay readable.
pub fn decompress(blob: &[u8]) -> Vec<u8> {
    let (recorded, body) = parse_header(blob);

    if let Some(codec) = recorded {
        match try_decode(codec, body) {
            Ok(data) => return data,
            Err(e) => tracing::warn!("recorded codec failed, trying others: {}", e),
        }
    }

    for codec in Codec::ALL {
        if Some(codec) == recorded || codec == Codec::None {
            continue;
        }
        if let Ok(data) = try_decode(codec, body) {
            tracing::debug!("decoded blob with fallback codec {}", codec);
            return data;
        }
    }

    body.to_vec()
}

fn parse_header(blob: &[u8]) -> (Option<Codec>, &[u8]) {
    match blob.strip_prefix(BLOB_MAGIC.as_slice()) {
        Some(rest) => match rest.split_first() {
            Some((&id, body)) => match Codec::from_id(id) {
                Some(codec) => (Some(codec), body),
                None => (None, body),
            },
            None => (None, rest),
        },
        None => (None, blob),
    }
}

fn try_decode(codec: Codec, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if !codec.is_available() {
        return Err(CodecError::Unavailable(codec));
    }
    codec.decode(data)
}

fn failed(codec: Codec, e: impl fmt::Display) -> CodecError {
    CodecError::Failed {
        codec,
        message: e.to_string(),
    }
}

#[cfg(feature = "lz4")]
fn lz4_encode(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    Ok(lz4_flex::compress_prepend_size(data))
}

/// LZ4 cannot expand input by more than this factor.
#[cfg(feature = "lz4")]
const LZ4_MAX_RATIO: usize = 255;

#[cfg(feature = "lz4")]
fn lz4_decode(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let Some((size, body)) = data.split_first_chunk::<4>() else {
        return Err(failed(Codec::Lz4, "missing size prefix"));
    };
    let size = u32::from_le_bytes(*size) as usize;
    // Reject implausible prefixes before allocating for them.
    if size > body.len().saturating_mul(LZ4_MAX_RATIO) + 16 {
        return Err(failed(Codec::Lz4, "size prefix exceeds input bound"));
    }
    lz4_flex::decompress(body, size).map_err(|e| failed(Codec::Lz4, e))
}

#[cfg(not(feature = "lz4"))]
fn lz4_encode(_data: &[u8]) -> Result<Vec<u8>, CodecError> {
    Err(CodecError::Unavailable(Codec::Lz4))
}

#[cfg(not(feature = "lz4"))]
fn lz4_decode(_data: &[u8]) -> Result<Vec<u8>, CodecError> {
    Err(CodecError::Unavailable(Codec::Lz4))
}

#[cfg(feature = "zstd")]
fn zstd_encode(data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
    zstd::encode_all(data, level.clamp(1, 22)).map_err(|e| failed(Codec::Zstd, e))
}

#[cfg(feature = "zstd")]
fn zstd_decode(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    zstd::decode_all(data).map_err(|e| failed(Codec::Zstd, e))
}

#[cfg(not(feature = "zstd"))]
fn zstd_encode(_data: &[u8], _level: i32) -> Result<Vec<u8>, CodecError> {
    Err(CodecError::Unavailable(Codec::Zstd))
}

#[cfg(not(feature = "zstd"))]
fn zstd_decode(_data: &[u8]) -> Result<Vec<u8>, CodecError> {
    Err(CodecError::Unavailable(Codec::Zstd))
}

#[cfg(feature = "gzip")]
fn gzip_encode(data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let level = level.clamp(0, 9) as u32;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data).map_err(|e| failed(Codec::Gzip, e))?;
    encoder.finish().map_err(|e| failed(Codec::Gzip, e))
}

#[cfg(feature = "gzip")]
fn gzip_decode(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut decoder = GzDecoder::new(data);
    let mut buf = Vec::new();
    decoder
        .read_to_end(&mut buf)
        .map_err(|e| failed(Codec::Gzip, e))?;
    Ok(buf)
}

#[cfg(not(feature = "gzip"))]
fn gzip_encode(_data: &[u8], _level: i32) -> Result<Vec<u8>, CodecError> {
    Err(CodecError::Unavailable(Codec::Gzip))
}

#[cfg(not(feature = "gzip"))]
fn gzip_decode(_data: &[u8]) -> Result<Vec<u8>, CodecError> {
    Err(CodecError::Unavailable(Codec::Gzip))
}
