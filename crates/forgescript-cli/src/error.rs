//! Error conversion utilities for CLI.
//!
//! Converts forgescript-core's typed errors (thiserror) into user-friendly
//! contextual errors (anyhow) with actionable guidance.

use anyhow::anyhow;
use forgescript_core::ForgeError;
use std::path::Path;

/// Converts `ForgeError` to user-friendly anyhow error with context
pub fn convert_forge_error(err: ForgeError, bundle: &Path) -> anyhow::Error {
    match err {
        ForgeError::PathTraversal { entry } => {
            anyhow!(
                "Security violation: Bundle '{}' attempted path traversal with '{}'\n\
                 HINT: This bundle may be malicious. Do not load it.",
                bundle.display(),
                entry
            )
        }
        ForgeError::SizeLimitExceeded { format, limit } => {
            anyhow!(
                "Security violation: {} envelope of '{}' expands beyond {} bytes\n\
                 HINT: Use --max-decompressed-size to allow larger bundles if legitimate.",
                format,
                bundle.display(),
                limit
            )
        }
        ForgeError::UnwrapDepthExceeded { max } => {
            anyhow!(
                "Security violation: Bundle '{}' nests more than {} compression envelopes\n\
                 HINT: Use --max-unwrap-depth to allow deeper nesting if legitimate.",
                bundle.display(),
                max
            )
        }
        ForgeError::QuotaExceeded { resource } => {
            anyhow!(
                "Extraction limit exceeded for '{}': {}\n\
                 HINT: Use --max-files or --max-file-size to increase limits.",
                bundle.display(),
                resource
            )
        }
        ForgeError::UnrecognizedFormat(format) => {
            anyhow!(
                "Bundle format not recognized: {} ({format})\n\
                 HINT: Supported bundles: tar or zip, optionally wrapped in gzip, bzip2, xz or zstd",
                bundle.display()
            )
        }
        ForgeError::NotImplemented(format) => {
            anyhow!(
                "Bundle '{}' uses {format} compression, which this build cannot decode\n\
                 HINT: Rebuild with the '{}' feature enabled.",
                bundle.display(),
                format.name()
            )
        }
        ForgeError::CorruptArchive(reason) => {
            anyhow!(
                "Invalid bundle '{}': {}\n\
                 HINT: The bundle may be corrupted or truncated.",
                bundle.display(),
                reason
            )
        }
        ForgeError::ScriptNotInBundle(script) => {
            anyhow!(
                "Script '{}' is not part of bundle '{}'\n\
                 HINT: Use --script to pick the alias script to run.",
                script,
                bundle.display()
            )
        }
        ForgeError::Io(io_err) => {
            anyhow!(
                "I/O error while processing '{}': {}",
                bundle.display(),
                io_err
            )
        }
        // Engine messages are shown verbatim.
        ForgeError::ScriptError(message) | ForgeError::CallbackError(message) => {
            anyhow!("{message}")
        }
        _ => anyhow::Error::from(err)
            .context(format!("Error processing bundle '{}'", bundle.display())),
    }
}

/// Adds bundle context to a core result.
pub fn add_bundle_context<T>(
    result: forgescript_core::Result<T>,
    bundle: &Path,
) -> anyhow::Result<T> {
    result.map_err(|e| convert_forge_error(e, bundle))
}

/// Converts an error from running an alias script outside any bundle.
#[cfg_attr(not(feature = "python"), allow(dead_code))]
pub fn convert_script_error(err: ForgeError, script: &Path) -> anyhow::Error {
    match err {
        ForgeError::NotFound(path) => {
            anyhow!(
                "Alias script '{}' not found\n\
                 HINT: Pass the path of the forgescript_alias.py that registers the alias.",
                path.display()
            )
        }
        ForgeError::ScriptError(message) | ForgeError::CallbackError(message) => {
            anyhow!("{message}")
        }
        _ => anyhow::Error::from(err)
            .context(format!("Error running alias script '{}'", script.display())),
    }
}

/// Adds alias-script context to a core result.
#[cfg_attr(not(feature = "python"), allow(dead_code))]
pub fn add_script_context<T>(
    result: forgescript_core::Result<T>,
    script: &Path,
) -> anyhow::Result<T> {
    result.map_err(|e| convert_script_error(e, script))
}
