//! High-level public API for bundle listing and extraction.

use std::path::Path;

use crate::ExtractionConfig;
use crate::ExtractionReport;
use crate::Result;
use crate::bundle::resolve_extractor;
use crate::formats::BundleExtractor;
use crate::types::SandboxRoot;

/// Extracts a bundle into an existing sandbox directory.
///
/// The format is detected from content and compression envelopes are
/// unwrapped before extraction. Returns the relative paths of the files
/// written, in archive order.
///
/// # Errors
///
/// Returns an error if:
/// - `sandbox_root` does not exist or is not a directory
/// - the bundle format is not recognized or a decoder fails
/// - an entry would escape the sandbox
/// - a quota is exceeded or a write is truncated
///
/// Files written before the failure are left in place.
///
/// # Examples
///
/// ```no_run
/// use forgescript_core::ExtractionConfig;
/// use forgescript_core::extract_bundle;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("bundle.zip")?;
/// let paths = extract_bundle(&bytes, "/tmp/sandbox", &ExtractionConfig::default())?;
/// for path in paths {
///     println!("{path}");
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_bundle(
    bytes: &[u8],
    sandbox_root: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<Vec<String>> {
    extract_bundle_with_report(bytes, sandbox_root, config).map(|report| report.path_strings())
}

/// Same as [`extract_bundle`], returning the full [`ExtractionReport`].
///
/// # Errors
///
/// Same as [`extract_bundle`].
pub fn extract_bundle_with_report(
    bytes: &[u8],
    sandbox_root: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionReport> {
    let root = SandboxRoot::new(sandbox_root.as_ref())?;
    let extractor = resolve_extractor(bytes, config)?;
    extractor.extract_to(&root)
}

/// Lists the file paths of a bundle without extracting it.
///
/// # Errors
///
/// Returns an error if the bundle cannot be resolved or read.
pub fn list_bundle(bytes: &[u8], config: &ExtractionConfig) -> Result<Vec<String>> {
    resolve_extractor(bytes, config)?.list_paths()
}
