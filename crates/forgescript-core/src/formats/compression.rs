//! Decoders for compression envelopes.
//!
//! Every decoder is a pure function from compressed bytes to raw bytes. The
//! output is bounded so a small envelope cannot expand without limit; bundle
//! resolution shares one `ExtractionConfig::max_decompressed_size` budget
//! across all nested layers.
//!
//! # Supported Envelopes
//!
//! - **Gzip**: always available (multi-member streams are concatenated)
//! - **Bzip2**: always available
//! - **Xz**: behind the `xz` feature
//! - **Zstd**: behind the `zstd` feature

use std::io::Read;

use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;

use super::Format;
use crate::ExtractionConfig;
use crate::ForgeError;
use crate::Result;

/// Decompresses one envelope layer.
///
/// # Errors
///
/// - `UnrecognizedFormat` if `format` is not a compression envelope
/// - `NotImplemented` if the decoder for `format` is compiled out
/// - `DecompressionFailed` if the stream is malformed
/// - `SizeLimitExceeded` if the output exceeds the configured limit
///
/// # Examples
///
/// ```
/// use forgescript_core::ExtractionConfig;
/// use forgescript_core::ForgeError;
/// use forgescript_core::formats::Format;
/// use forgescript_core::formats::decompress;
///
/// let config = ExtractionConfig::default();
/// let err = decompress(Format::Tar, b"", &config).unwrap_err();
/// assert!(matches!(err, ForgeError::UnrecognizedFormat(Format::Tar)));
/// ```
pub fn decompress(format: Format, bytes: &[u8], config: &ExtractionConfig) -> Result<Vec<u8>> {
    decompress_bounded(format, bytes, config.max_decompressed_size)
}

/// Decompresses one envelope layer into at most `limit` bytes.
pub(crate) fn decompress_bounded(format: Format, bytes: &[u8], limit: u64) -> Result<Vec<u8>> {
    match format {
        Format::Gzip => read_bounded(MultiGzDecoder::new(bytes), format, limit),
        Format::Bzip2 => read_bounded(BzDecoder::new(bytes), format, limit),
        Format::Xz => decompress_xz(bytes, limit),
        Format::Zstd => decompress_zstd(bytes, limit),
        Format::Tar | Format::Zip | Format::Unknown => Err(ForgeError::UnrecognizedFormat(format)),
    }
}

/// Returns `true` if a decoder for `format` is compiled in.
#[must_use]
pub const fn has_decoder(format: Format) -> bool {
    match format {
        Format::Gzip | Format::Bzip2 => true,
        Format::Xz => cfg!(feature = "xz"),
        Format::Zstd => cfg!(feature = "zstd"),
        Format::Tar | Format::Zip | Format::Unknown => false,
    }
}

#[cfg(feature = "xz")]
fn decompress_xz(bytes: &[u8], limit: u64) -> Result<Vec<u8>> {
    read_bounded(xz2::read::XzDecoder::new(bytes), Format::Xz, limit)
}

#[cfg(not(feature = "xz"))]
fn decompress_xz(_bytes: &[u8], _limit: u64) -> Result<Vec<u8>> {
    Err(ForgeError::NotImplemented(Format::Xz))
}

#[cfg(feature = "zstd")]
fn decompress_zstd(bytes: &[u8], limit: u64) -> Result<Vec<u8>> {
    let decoder =
        zstd::stream::read::Decoder::new(bytes).map_err(|e| ForgeError::DecompressionFailed {
            format: Format::Zstd,
            reason: e.to_string(),
        })?;
    read_bounded(decoder, Format::Zstd, limit)
}

#[cfg(not(feature = "zstd"))]
fn decompress_zstd(_bytes: &[u8], _limit: u64) -> Result<Vec<u8>> {
    Err(ForgeError::NotImplemented(Format::Zstd))
}

/// Reads a decoder to the end, failing once more than `limit` bytes appear.
fn read_bounded<R: Read>(decoder: R, format: Format, limit: u64) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    decoder
        .take(limit.saturating_add(1))
        .read_to_end(&mut output)
        .map_err(|e| ForgeError::DecompressionFailed {
            format,
            reason: e.to_string(),
        })?;

    if output.len() as u64 > limit {
        return Err(ForgeError::SizeLimitExceeded { format, limit });
    }

    Ok(output)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::bzip2_compress;
    use crate::test_utils::gzip_compress;

    #[test]
    fn test_gzip_roundtrip_content() {
        let config = ExtractionConfig::default();
        let packed = gzip_compress(b"forgescript");
        assert_eq!(decompress(Format::Gzip, &packed, &config).unwrap(), b"forgescript");
    }

    #[test]
    fn test_gzip_multi_member() {
        let config = ExtractionConfig::default();
        let mut packed = gzip_compress(b"forge");
        packed.extend(gzip_compress(b"script"));
        assert_eq!(decompress(Format::Gzip, &packed, &config).unwrap(), b"forgescript");
    }

    #[test]
    fn test_bzip2_content() {
        let config = ExtractionConfig::default();
        let packed = bzip2_compress(b"alias bundle");
        assert_eq!(decompress(Format::Bzip2, &packed, &config).unwrap(), b"alias bundle");
    }

    #[test]
    #[cfg(feature = "xz")]
    fn test_xz_content() {
        let config = ExtractionConfig::default();
        let packed = crate::test_utils::xz_compress(b"xz works");
        assert_eq!(decompress(Format::Xz, &packed, &config).unwrap(), b"xz works");
    }

    #[test]
    #[cfg(not(feature = "xz"))]
    fn test_xz_not_implemented() {
        let config = ExtractionConfig::default();
        let err = decompress(Format::Xz, b"\xFD7zXZ\x00", &config).unwrap_err();
        assert!(matches!(err, ForgeError::NotImplemented(Format::Xz)));
    }

    #[test]
    #[cfg(feature = "zstd")]
    fn test_zstd_content() {
        let config = ExtractionConfig::default();
        let packed = crate::test_utils::zstd_compress(b"zstd works");
        assert_eq!(decompress(Format::Zstd, &packed, &config).unwrap(), b"zstd works");
    }

    #[test]
    fn test_corrupt_gzip() {
        let config = ExtractionConfig::default();
        // Valid member header followed by a reserved deflate block type.
        let corrupt = [0x1F, 0x8B, 0x08, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF];
        let err = decompress(Format::Gzip, &corrupt, &config).unwrap_err();
        assert!(matches!(
            err,
            ForgeError::DecompressionFailed {
                format: Format::Gzip,
                ..
            }
        ));
    }

    #[test]
    fn test_size_limit() {
        let config = ExtractionConfig {
            max_decompressed_size: 1024,
            ..Default::default()
        };
        let packed = gzip_compress(&vec![0u8; 4096]);
        let err = decompress(Format::Gzip, &packed, &config).unwrap_err();
        assert!(matches!(
            err,
            ForgeError::SizeLimitExceeded {
                format: Format::Gzip,
                limit: 1024
            }
        ));
    }

    #[test]
    fn test_size_limit_exact_fit() {
        let config = ExtractionConfig {
            max_decompressed_size: 4096,
            ..Default::default()
        };
        let packed = gzip_compress(&vec![7u8; 4096]);
        assert_eq!(decompress(Format::Gzip, &packed, &config).unwrap().len(), 4096);
    }

    #[test]
    fn test_containers_are_not_envelopes() {
        let config = ExtractionConfig::default();
        for format in [Format::Tar, Format::Zip, Format::Unknown] {
            let err = decompress(format, b"", &config).unwrap_err();
            assert!(matches!(err, ForgeError::UnrecognizedFormat(f) if f == format));
        }
    }

    #[test]
    fn test_has_decoder() {
        assert!(has_decoder(Format::Gzip));
        assert!(has_decoder(Format::Bzip2));
        assert_eq!(has_decoder(Format::Xz), cfg!(feature = "xz"));
        assert!(!has_decoder(Format::Tar));
    }
}
