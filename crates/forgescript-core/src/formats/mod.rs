//! Bundle format detection, decompression, and container extractors.

pub(crate) mod common;
pub mod compression;
pub mod detect;
pub mod tar;
pub mod traits;
pub mod zip;

// Re-export main types for convenience
pub use compression::decompress;
pub(crate) use compression::decompress_bounded;
pub use compression::has_decoder;
pub use detect::Format;
pub use detect::detect;
pub use tar::TarExtractor;
pub use traits::BundleExtractor;
pub use zip::ZipExtractor;
