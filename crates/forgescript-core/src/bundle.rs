//! Bundle resolution: peel compression envelopes until a container remains.

use std::borrow::Cow;

use tracing::debug;

use crate::ExtractionConfig;
use crate::ExtractionReport;
use crate::ForgeError;
use crate::Result;
use crate::formats::BundleExtractor;
use crate::formats::Format;
use crate::formats::TarExtractor;
use crate::formats::ZipExtractor;
use crate::formats::decompress_bounded;
use crate::formats::detect;
use crate::types::ArchiveEntry;
use crate::types::SandboxRoot;

/// Extractor for the terminal container of a bundle.
#[derive(Debug)]
pub enum Extractor {
    /// Tar archive.
    Tar(TarExtractor),
    /// ZIP archive.
    Zip(ZipExtractor),
}

impl Extractor {
    /// Returns the container format.
    #[must_use]
    pub const fn format(&self) -> Format {
        match self {
            Self::Tar(_) => Format::Tar,
            Self::Zip(_) => Format::Zip,
        }
    }

    fn for_container(format: Format, data: Vec<u8>, config: &ExtractionConfig) -> Option<Self> {
        match format {
            Format::Tar => Some(Self::Tar(TarExtractor::new(data, config.clone()))),
            Format::Zip => Some(Self::Zip(ZipExtractor::new(data, config.clone()))),
            _ => None,
        }
    }
}

impl BundleExtractor for Extractor {
    fn entries(&self) -> Result<Vec<ArchiveEntry>> {
        match self {
            Self::Tar(tar) => tar.entries(),
            Self::Zip(zip) => zip.entries(),
        }
    }

    fn list_paths(&self) -> Result<Vec<String>> {
        match self {
            Self::Tar(tar) => tar.list_paths(),
            Self::Zip(zip) => zip.list_paths(),
        }
    }

    fn extract_to(&self, root: &SandboxRoot) -> Result<ExtractionReport> {
        match self {
            Self::Tar(tar) => tar.extract_to(root),
            Self::Zip(zip) => zip.extract_to(root),
        }
    }

    fn format_name(&self) -> &'static str {
        match self {
            Self::Tar(tar) => tar.format_name(),
            Self::Zip(zip) => zip.format_name(),
        }
    }
}

/// Resolves `bytes` to an extractor, unwrapping compression envelopes.
///
/// # Errors
///
/// - `UnrecognizedFormat` if a layer is neither a container nor an envelope
/// - `UnwrapDepthExceeded` past `config.max_unwrap_depth` envelopes
/// - any decompression error from [`decompress`]
///
/// # Examples
///
/// ```
/// use forgescript_core::BundleExtractor;
/// use forgescript_core::ExtractionConfig;
/// use forgescript_core::resolve_extractor;
/// use forgescript_core::test_utils::create_test_tar;
/// use forgescript_core::test_utils::gzip_compress;
///
/// let bundle = gzip_compress(&create_test_tar(vec![("main.py", b"print(1)")]));
/// let extractor = resolve_extractor(&bundle, &ExtractionConfig::default()).unwrap();
/// assert_eq!(extractor.list_paths().unwrap(), vec!["main.py"]);
/// ```
pub fn resolve_extractor(bytes: &[u8], config: &ExtractionConfig) -> Result<Extractor> {
    BundleHandle::detect(bytes, config).map(BundleHandle::into_extractor)
}

/// A resolved bundle: its envelope chain and terminal container.
#[derive(Debug)]
pub struct BundleHandle {
    layers: Vec<Format>,
    extractor: Extractor,
}

impl BundleHandle {
    /// Detects the bundle format, unwrapping envelopes as needed.
    ///
    /// # Errors
    ///
    /// Same as [`resolve_extractor`].
    pub fn detect(bytes: &[u8], config: &ExtractionConfig) -> Result<Self> {
        let mut layers = Vec::new();
        let mut current = Cow::Borrowed(bytes);
        let mut inflated: u64 = 0;

        loop {
            let format = detect(&current);
            if format.is_container() {
                debug!(format = %format, envelopes = layers.len(), "resolved bundle container");
                let data = current.into_owned();
                return Extractor::for_container(format, data, config)
                    .map(|extractor| Self { layers, extractor })
                    .ok_or(ForgeError::UnrecognizedFormat(format));
            }
            if !format.is_envelope() {
                return Err(ForgeError::UnrecognizedFormat(format));
            }
            if layers.len() >= config.max_unwrap_depth {
                return Err(ForgeError::UnwrapDepthExceeded {
                    max: config.max_unwrap_depth,
                });
            }

            // Every layer draws from one shared budget.
            let budget = config.max_decompressed_size.saturating_sub(inflated);
            let inner = decompress_bounded(format, &current, budget).map_err(|e| match e {
                ForgeError::SizeLimitExceeded { format, .. } => ForgeError::SizeLimitExceeded {
                    format,
                    limit: config.max_decompressed_size,
                },
                other => other,
            })?;
            inflated = inflated.saturating_add(inner.len() as u64);
            debug!(format = %format, from = current.len(), to = inner.len(), "unwrapped envelope");
            layers.push(format);
            current = Cow::Owned(inner);
        }
    }

    /// Terminal container format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.extractor.format()
    }

    /// Envelopes that were removed, outermost first.
    #[must_use]
    pub fn layers(&self) -> &[Format] {
        &self.layers
    }

    /// Borrows the container extractor.
    #[must_use]
    pub const fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Consumes the handle, returning the container extractor.
    #[must_use]
    pub fn into_extractor(self) -> Extractor {
        self.extractor
    }

    /// Human-readable format chain, e.g. `tar+gzip+bzip2`.
    #[must_use]
    pub fn describe(&self) -> String {
        std::iter::once(self.format().name())
            .chain(self.layers.iter().rev().map(|f| f.name()))
            .collect::<Vec<_>>()
            .join("+")
    }
}
