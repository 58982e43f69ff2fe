//! Common trait for bundle container extractors.

use crate::ExtractionReport;
use crate::Result;
use crate::types::ArchiveEntry;
use crate::types::SandboxRoot;

/// Lists and extracts the files of one container format.
///
/// Implementations own the container bytes and the extraction limits they
/// were resolved with. Every write goes through path validation against the
/// sandbox root.
pub trait BundleExtractor {
    /// Returns entry metadata in archive order.
    ///
    /// # Errors
    ///
    /// Returns `CorruptArchive` if the container metadata cannot be read.
    fn entries(&self) -> Result<Vec<ArchiveEntry>>;

    /// Returns the entry names a script may refer to, in archive order.
    fn list_paths(&self) -> Result<Vec<String>>;

    /// Extracts every regular file and directory under `root`.
    ///
    /// The first failing entry aborts the extraction; files written before it
    /// are left in place.
    ///
    /// # Errors
    ///
    /// Returns `PathTraversal`, `TruncatedWrite`, `QuotaExceeded`,
    /// `CorruptArchive` or `Io`.
    fn extract_to(&self, root: &SandboxRoot) -> Result<ExtractionReport>;

    /// Returns the container format name.
    fn format_name(&self) -> &'static str;
}
