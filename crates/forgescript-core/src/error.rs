//! Error types for bundle extraction and script execution.

use std::path::PathBuf;
use thiserror::Error;

use crate::formats::Format;

/// Result type alias using `ForgeError`.
pub type Result<T> = std::result::Result<T, ForgeError>;

/// Represents a specific extraction quota that was exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaResource {
    /// Too many files in a single extraction.
    FileCount {
        /// Current file count.
        current: usize,
        /// Maximum allowed file count.
        max: usize,
    },
    /// A single entry declared more bytes than allowed.
    FileSize {
        /// File size in bytes.
        size: u64,
        /// Maximum allowed file size in bytes.
        max: u64,
    },
}

impl std::fmt::Display for QuotaResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileCount { current, max } => {
                write!(f, "quota exceeded: file count ({current} > {max})")
            }
            Self::FileSize { size, max } => {
                write!(f, "quota exceeded: single file size ({size} > {max})")
            }
        }
    }
}

/// Errors produced by bundle extraction and the interpreter executor.
#[derive(Error, Debug)]
pub enum ForgeError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The buffer is neither a supported container nor a compression envelope.
    #[error("unrecognized bundle format: {0}")]
    UnrecognizedFormat(Format),

    /// The format was detected but no decoder is compiled in for it.
    #[error("{0} decompression not implemented")]
    NotImplemented(Format),

    /// A decoder rejected its input.
    #[error("{format} decompression failed: {reason}")]
    DecompressionFailed {
        /// Envelope that failed to decode.
        format: Format,
        /// Decoder error message.
        reason: String,
    },

    /// Decompressed output grew past the configured limit.
    #[error("{format} output exceeds the decompressed size limit of {limit} bytes")]
    SizeLimitExceeded {
        /// Envelope being decoded.
        format: Format,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// More nested compression envelopes than the configured maximum.
    #[error("bundle nests more than {max} compression envelopes")]
    UnwrapDepthExceeded {
        /// Configured maximum depth.
        max: usize,
    },

    /// Container metadata or content is malformed.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// An entry would resolve outside the sandbox root.
    #[error("path traversal detected: {entry}")]
    PathTraversal {
        /// Entry name as it appears in the archive.
        entry: String,
    },

    /// Fewer bytes were written than the entry header declared.
    #[error("file write for {entry} truncated: wrote {written} of {expected} bytes")]
    TruncatedWrite {
        /// Entry name as it appears in the archive.
        entry: String,
        /// Bytes actually written.
        written: u64,
        /// Bytes declared by the archive.
        expected: u64,
    },

    /// Extraction quota exceeded.
    #[error("{resource}")]
    QuotaExceeded {
        /// The exceeded resource.
        resource: QuotaResource,
    },

    /// A script or bundle path does not exist.
    #[error("no such file: {}", .0.display())]
    NotFound(PathBuf),

    /// A script path names a directory.
    #[error("script path is a directory: {}", .0.display())]
    IsDirectory(PathBuf),

    /// The requested script is not part of the bundle listing.
    #[error("script '{0}' not found in bundle")]
    ScriptNotInBundle(String),

    /// The engine reported an error while running a script.
    #[error("{0}")]
    ScriptError(String),

    /// The engine reported an error while running an alias callback.
    #[error("{0}")]
    CallbackError(String),

    /// A task payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Execution did not finish within the configured timeout.
    #[error("execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The executor loop is no longer accepting work.
    #[error("interpreter executor is not running")]
    ExecutorUnavailable,

    /// An interpreter host primitive failed.
    #[error("interpreter host error: {0}")]
    Host(String),
}

impl ForgeError {
    /// Returns `true` if this error was raised by a sandbox or resource guard.
    ///
    /// # Examples
    ///
    /// ```
    /// use forgescript_core::ForgeError;
    ///
    /// let err = ForgeError::PathTraversal {
    ///     entry: "../../escape.py".into(),
    /// };
    /// assert!(err.is_security_violation());
    ///
    /// let err = ForgeError::ScriptError("boom".into());
    /// assert!(!err.is_security_violation());
    /// ```
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::PathTraversal { .. }
                | Self::SizeLimitExceeded { .. }
                | Self::UnwrapDepthExceeded { .. }
                | Self::QuotaExceeded { .. }
        )
    }

    /// Returns `true` if the message came from the embedded engine.
    ///
    /// Engine errors are passed through verbatim and are suitable for direct
    /// display to the operator.
    #[must_use]
    pub const fn is_engine_error(&self) -> bool {
        matches!(self, Self::ScriptError(_) | Self::CallbackError(_))
    }

    /// Returns the archive entry name involved in this error, if any.
    #[must_use]
    pub fn entry(&self) -> Option<&str> {
        match self {
            Self::PathTraversal { entry } | Self::TruncatedWrite { entry, .. } => Some(entry),
            _ => None,
        }
    }
}
