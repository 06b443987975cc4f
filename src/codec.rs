//! Compression codecs.
//!
//! The cache can hold resident entries in a compressed representation.
//! Codecs are identified by a small tag stored in the entry's flag bits:
//!
//! | Tag | Codec     | Backing                    | Profile                 |
//! |-----|-----------|----------------------------|-------------------------|
//! | 0   | `None`    | pass-through               | no compression          |
//! | 1   | `Fast`    | LZ4 block format           | cheap, modest ratio     |
//! | 2   | `Deflate` | zlib stream                | balanced                |
//! | 3   | `Lzma`    | xz stream                  | slow, best ratio        |
//!
//! Each codec provides one-shot `compress`/`decompress` plus a worst-case
//! output estimate used to pre-size scratch buffers. Decompression verifies
//! the caller-supplied expected length; a mismatch is a [`CodecError`].
//!
//! The tags are purely in-memory; nothing here is a wire format.

use std::io::{Read, Write};

use crate::error::CodecError;

/// Minimum payload length the [`CodecKind::Fast`] codec will accept.
/// Shorter payloads are never worth the per-block overhead.
pub const FAST_MIN_LEN: usize = 16;

/// Compression codec tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodecKind {
    /// No compression; entries stay raw.
    #[default]
    None,
    /// LZ4 block compression.
    Fast,
    /// zlib (deflate) compression.
    Deflate,
    /// xz (LZMA) compression.
    Lzma,
}

impl CodecKind {
    /// Numeric tag as stored in entry flag bits.
    #[inline]
    pub fn tag(self) -> u8 {
        match self {
            CodecKind::None => 0,
            CodecKind::Fast => 1,
            CodecKind::Deflate => 2,
            CodecKind::Lzma => 3,
        }
    }

    /// Reverses [`tag`](Self::tag); unknown values map to `None`.
    pub fn from_tag(tag: u8) -> Option<CodecKind> {
        match tag {
            0 => Some(CodecKind::None),
            1 => Some(CodecKind::Fast),
            2 => Some(CodecKind::Deflate),
            3 => Some(CodecKind::Lzma),
            _ => None,
        }
    }

    /// Human-readable codec name.
    pub fn name(self) -> &'static str {
        match self {
            CodecKind::None => "none",
            CodecKind::Fast => "fast",
            CodecKind::Deflate => "deflate",
            CodecKind::Lzma => "lzma",
        }
    }

    /// Worst-case compressed size for a `len`-byte input.
    pub fn worst_case(self, len: usize) -> usize {
        match self {
            CodecKind::None => len,
            CodecKind::Fast => lz4::block::compress_bound(len).unwrap_or(len + len / 16 + 80),
            // zlib bound: a few bytes per 16K block plus stream overhead
            CodecKind::Deflate => len + (len >> 12) + (len >> 14) + 13 + 64,
            CodecKind::Lzma => len + len / 3 + 128,
        }
    }

    /// Compresses `src`, returning the encoded bytes.
    pub fn compress(self, src: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            CodecKind::None => Ok(src.to_vec()),
            CodecKind::Fast => lz4::block::compress(src, None, false)
                .map_err(|e| CodecError::new(format!("lz4 compress: {e}"))),
            CodecKind::Deflate => {
                let out = Vec::with_capacity(self.worst_case(src.len()));
                let mut enc = flate2::write::ZlibEncoder::new(out, flate2::Compression::default());
                enc.write_all(src)
                    .map_err(|e| CodecError::new(format!("zlib compress: {e}")))?;
                enc.finish()
                    .map_err(|e| CodecError::new(format!("zlib compress: {e}")))
            }
            CodecKind::Lzma => {
                let mut out = Vec::with_capacity(src.len() / 2 + 64);
                xz2::read::XzEncoder::new(src, 6)
                    .read_to_end(&mut out)
                    .map_err(|e| CodecError::new(format!("xz compress: {e}")))?;
                Ok(out)
            }
        }
    }

    /// Decompresses `src` into exactly `expected_len` bytes.
    ///
    /// Returns an error if the stream is corrupt or the decoded length does
    /// not match `expected_len`.
    pub fn decompress(self, src: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        let out = match self {
            CodecKind::None => src.to_vec(),
            CodecKind::Fast => {
                let size = i32::try_from(expected_len)
                    .map_err(|_| CodecError::new("lz4 decompress: length exceeds block limit"))?;
                lz4::block::decompress(src, Some(size))
                    .map_err(|e| CodecError::new(format!("lz4 decompress: {e}")))?
            }
            CodecKind::Deflate => {
                let mut dec = flate2::write::ZlibDecoder::new(Vec::with_capacity(expected_len));
                dec.write_all(src)
                    .map_err(|e| CodecError::new(format!("zlib decompress: {e}")))?;
                dec.finish()
                    .map_err(|e| CodecError::new(format!("zlib decompress: {e}")))?
            }
            CodecKind::Lzma => {
                let mut out = Vec::with_capacity(expected_len);
                xz2::read::XzDecoder::new(src)
                    .read_to_end(&mut out)
                    .map_err(|e| CodecError::new(format!("xz decompress: {e}")))?;
                out
            }
        };
        if out.len() != expected_len {
            return Err(CodecError::new(format!(
                "{} decompress: expected {expected_len} bytes, got {}",
                self.name(),
                out.len()
            )));
        }
        Ok(out)
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPRESSIBLE: &[u8] =
        b"the quick brown fox jumps over the lazy dog, the quick brown fox jumps over the lazy dog";

    #[test]
    fn tags_round_trip() {
        for codec in [
            CodecKind::None,
            CodecKind::Fast,
            CodecKind::Deflate,
            CodecKind::Lzma,
        ] {
            assert_eq!(CodecKind::from_tag(codec.tag()), Some(codec));
        }
        assert_eq!(CodecKind::from_tag(7), None);
    }

    #[test]
    fn fast_round_trip() {
        let enc = CodecKind::Fast.compress(COMPRESSIBLE).unwrap();
        assert!(enc.len() < COMPRESSIBLE.len());
        let dec = CodecKind::Fast.decompress(&enc, COMPRESSIBLE.len()).unwrap();
        assert_eq!(dec, COMPRESSIBLE);
    }

    #[test]
    fn deflate_round_trip() {
        let enc = CodecKind::Deflate.compress(COMPRESSIBLE).unwrap();
        assert!(enc.len() < COMPRESSIBLE.len());
        let dec = CodecKind::Deflate
            .decompress(&enc, COMPRESSIBLE.len())
            .unwrap();
        assert_eq!(dec, COMPRESSIBLE);
    }

    #[test]
    fn lzma_round_trip() {
        let enc = CodecKind::Lzma.compress(COMPRESSIBLE).unwrap();
        let dec = CodecKind::Lzma.decompress(&enc, COMPRESSIBLE.len()).unwrap();
        assert_eq!(dec, COMPRESSIBLE);
    }

    #[test]
    fn decompress_rejects_wrong_length() {
        let enc = CodecKind::Deflate.compress(COMPRESSIBLE).unwrap();
        assert!(CodecKind::Deflate
            .decompress(&enc, COMPRESSIBLE.len() + 1)
            .is_err());
    }

    #[test]
    fn decompress_rejects_garbage() {
        let garbage = vec![0xA5u8; 64];
        assert!(CodecKind::Deflate.decompress(&garbage, 128).is_err());
        assert!(CodecKind::Lzma.decompress(&garbage, 128).is_err());
    }

    #[test]
    fn fast_output_within_worst_case() {
        let enc = CodecKind::Fast.compress(COMPRESSIBLE).unwrap();
        assert!(enc.len() <= CodecKind::Fast.worst_case(COMPRESSIBLE.len()));
    }

    #[test]
    fn none_is_pass_through() {
        let enc = CodecKind::None.compress(COMPRESSIBLE).unwrap();
        assert_eq!(enc, COMPRESSIBLE);
        let dec = CodecKind::None.decompress(&enc, COMPRESSIBLE.len()).unwrap();
        assert_eq!(dec, COMPRESSIBLE);
    }
}
