//! Bundle format detection from leading byte signatures.
//!
//! Detection looks only at content. Caller-supplied names and extensions are
//! never consulted, so a `.zip` that is really a gzip stream is treated as
//! gzip.

use std::fmt;

/// Gzip member header (`ID1 ID2`).
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Bzip2 stream header (`BZh`), followed by a block size digit.
const BZIP2_MAGIC: [u8; 3] = *b"BZh";

/// Xz stream header.
const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];

/// Zstandard frame magic number (little endian `0xFD2FB528`).
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Zip local file header, empty archive end record, and spanned marker.
const ZIP_MAGICS: [[u8; 4]; 3] = [
    [b'P', b'K', 0x03, 0x04],
    [b'P', b'K', 0x05, 0x06],
    [b'P', b'K', 0x07, 0x08],
];

/// Offset of the `ustar` magic inside a POSIX/GNU tar header.
const USTAR_OFFSET: usize = 257;

/// Tar header block size.
const TAR_BLOCK: usize = 512;

/// Byte range of the header checksum field.
const TAR_CHECKSUM: std::ops::Range<usize> = 148..156;

/// Container or compression format of a byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Tar archive.
    Tar,
    /// ZIP archive.
    Zip,
    /// Gzip compression envelope.
    Gzip,
    /// Bzip2 compression envelope.
    Bzip2,
    /// Xz compression envelope.
    Xz,
    /// Zstandard compression envelope.
    Zstd,
    /// Anything else, including plain text.
    Unknown,
}

impl Format {
    /// Returns `true` for formats that hold files directly.
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Tar | Self::Zip)
    }

    /// Returns `true` for formats that wrap another byte stream.
    #[must_use]
    pub const fn is_envelope(self) -> bool {
        matches!(self, Self::Gzip | Self::Bzip2 | Self::Xz | Self::Zstd)
    }

    /// Returns a short lowercase name for this format.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Zip => "zip",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classifies a byte buffer by its leading signature.
///
/// # Examples
///
/// ```
/// use forgescript_core::formats::Format;
/// use forgescript_core::formats::detect;
///
/// assert_eq!(detect(&[0x1F, 0x8B, 0x08, 0x00]), Format::Gzip);
/// assert_eq!(detect(b"Hello World"), Format::Unknown);
/// ```
#[must_use]
pub fn detect(bytes: &[u8]) -> Format {
    if bytes.starts_with(&GZIP_MAGIC) {
        Format::Gzip
    } else if bytes.starts_with(&XZ_MAGIC) {
        Format::Xz
    } else if bytes.starts_with(&ZSTD_MAGIC) {
        Format::Zstd
    } else if is_bzip2(bytes) {
        Format::Bzip2
    } else if ZIP_MAGICS.iter().any(|magic| bytes.starts_with(magic)) {
        Format::Zip
    } else if is_tar(bytes) {
        Format::Tar
    } else {
        Format::Unknown
    }
}

fn is_bzip2(bytes: &[u8]) -> bool {
    bytes.starts_with(&BZIP2_MAGIC) && bytes.get(3).is_some_and(|b| (b'1'..=b'9').contains(b))
}

fn is_tar(bytes: &[u8]) -> bool {
    if bytes.len() < TAR_BLOCK {
        return false;
    }

    if bytes[USTAR_OFFSET..].starts_with(b"ustar") {
        return true;
    }

    // Pre-POSIX archives carry no magic; accept a first header whose checksum
    // field matches its content.
    has_valid_checksum(&bytes[..TAR_BLOCK])
}

fn has_valid_checksum(header: &[u8]) -> bool {
    let Some(stored) = parse_octal(&header[TAR_CHECKSUM]) else {
        return false;
    };

    let computed: u64 = header
        .iter()
        .enumerate()
        .map(|(idx, &b)| {
            if TAR_CHECKSUM.contains(&idx) {
                u64::from(b' ')
            } else {
                u64::from(b)
            }
        })
        .sum();

    // An all-zero block sums to 256 (the blank checksum field); that is the
    // end-of-archive marker, not a header.
    computed != 8 * u64::from(b' ') && computed == stored
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let digits: Vec<u8> = field
        .iter()
        .copied()
        .skip_while(|b| *b == b' ')
        .take_while(|b| (b'0'..=b'7').contains(b))
        .collect();

    if digits.is_empty() {
        return None;
    }

    digits
        .iter()
        .try_fold(0u64, |acc, d| acc.checked_mul(8)?.checked_add(u64::from(d - b'0')))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_tar;
    use crate::test_utils::create_test_zip;

    #[test]
    fn test_detect_plain_text() {
        assert_eq!(detect(b"Hello World"), Format::Unknown);
    }

    #[test]
    fn test_detect_empty() {
        assert_eq!(detect(b""), Format::Unknown);
    }

    #[test]
    fn test_detect_tar() {
        let tar = create_test_tar(vec![("file.py", b"print('hi')")]);
        assert_eq!(detect(&tar), Format::Tar);
    }

    #[test]
    fn test_detect_v7_tar_by_checksum() {
        let mut header = tar::Header::new_old();
        header.set_path("file.py").unwrap();
        header.set_size(0);
        header.set_mode(0o644);
        header.set_cksum();

        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 1024]);
        assert_eq!(detect(&bytes), Format::Tar);
    }

    #[test]
    fn test_detect_zero_block_is_not_tar() {
        assert_eq!(detect(&[0u8; 1024]), Format::Unknown);
    }

    #[test]
    fn test_detect_zip() {
        let zip = create_test_zip(vec![("file.py", b"")]);
        assert_eq!(detect(&zip), Format::Zip);
    }

    #[test]
    fn test_detect_empty_zip() {
        let zip = create_test_zip(vec![]);
        assert_eq!(detect(&zip), Format::Zip);
    }

    #[test]
    fn test_detect_envelopes() {
        assert_eq!(detect(&[0x1F, 0x8B, 0x08]), Format::Gzip);
        assert_eq!(detect(b"BZh91AY&SY"), Format::Bzip2);
        assert_eq!(detect(&[0xFD, b'7', b'z', b'X', b'Z', 0x00, 0x00]), Format::Xz);
        assert_eq!(detect(&[0x28, 0xB5, 0x2F, 0xFD, 0x00]), Format::Zstd);
    }

    #[test]
    fn test_bzip2_requires_block_size_digit() {
        assert_eq!(detect(b"BZhx"), Format::Unknown);
    }

    #[test]
    fn test_format_classification() {
        assert!(Format::Tar.is_container());
        assert!(Format::Zip.is_container());
        assert!(!Format::Gzip.is_container());
        assert!(Format::Gzip.is_envelope());
        assert!(Format::Xz.is_envelope());
        assert!(!Format::Unknown.is_envelope());
        assert!(!Format::Unknown.is_container());
    }

    #[test]
    fn test_format_display() {
        assert_eq!(Format::Bzip2.to_string(), "bzip2");
        assert_eq!(format!("{:?}", Format::Zip), "Zip");
    }
}
