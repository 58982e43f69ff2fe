//! Configuration for bundle extraction and the interpreter executor.

use std::time::Duration;

/// Limits and policy applied while unwrapping and extracting a bundle.
///
/// # Examples
///
/// ```
/// use forgescript_core::ExtractionConfig;
///
/// // Use the defaults
/// let config = ExtractionConfig::default();
///
/// // Tighten for untrusted uploads
/// let strict = ExtractionConfig {
///     max_unwrap_depth: 2,
///     max_decompressed_size: 16 * 1024 * 1024, // 16 MB
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionConfig {
    /// Maximum number of nested compression envelopes to unwrap.
    pub max_unwrap_depth: usize,

    /// Maximum total bytes produced by unwrapping every compression layer of
    /// one bundle.
    pub max_decompressed_size: u64,

    /// Maximum declared size of a single extracted file in bytes.
    pub max_file_size: u64,

    /// Maximum number of files written by one extraction.
    pub max_file_count: usize,

    /// Apply the permission bits stored in the archive (sanitized).
    pub preserve_permissions: bool,

    /// Mode for directories created during extraction.
    pub directory_mode: u32,
}

impl Default for ExtractionConfig {
    /// Default values:
    /// - `max_unwrap_depth`: 4
    /// - `max_decompressed_size`: 512 MB
    /// - `max_file_size`: 64 MB
    /// - `max_file_count`: 10,000
    /// - `preserve_permissions`: true
    /// - `directory_mode`: 0o700
    fn default() -> Self {
        Self {
            max_unwrap_depth: 4,
            max_decompressed_size: 512 * 1024 * 1024, // 512 MB
            max_file_size: 64 * 1024 * 1024,          // 64 MB
            max_file_count: 10_000,
            preserve_permissions: true,
            directory_mode: 0o700,
        }
    }
}

impl ExtractionConfig {
    /// Strips setuid, setgid and sticky bits and keeps owner access.
    #[must_use]
    pub const fn sanitize_mode(mode: u32) -> u32 {
        (mode & 0o777) | 0o600
    }
}

/// Settings for the interpreter executor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Upper bound on a single script or callback execution.
    ///
    /// `None` waits indefinitely. On expiry the caller receives
    /// `ForgeError::Timeout`; the engine call keeps running on a helper thread
    /// and its sub-context is destroyed by the loop once it returns.
    pub execution_timeout: Option<Duration>,

    /// Name of the dedicated loop thread started by `Executor::spawn`.
    pub thread_name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            execution_timeout: None,
            thread_name: "forgescript-executor".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Sets the execution timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_extraction_config() {
        let config = ExtractionConfig::default();
        assert_eq!(config.max_unwrap_depth, 4);
        assert_eq!(config.max_decompressed_size, 512 * 1024 * 1024);
        assert_eq!(config.directory_mode, 0o700);
        assert!(config.preserve_permissions);
    }

    #[test]
    fn test_sanitize_mode() {
        assert_eq!(ExtractionConfig::sanitize_mode(0o4755), 0o755);
        assert_eq!(ExtractionConfig::sanitize_mode(0o2644), 0o644);
        assert_eq!(ExtractionConfig::sanitize_mode(0o000), 0o600);
        assert_eq!(ExtractionConfig::sanitize_mode(0o1777), 0o777);
    }

    #[test]
    fn test_executor_config() {
        let config = ExecutorConfig::default();
        assert!(config.execution_timeout.is_none());
        assert_eq!(config.thread_name, "forgescript-executor");

        let config = config.with_timeout(Duration::from_secs(5));
        assert_eq!(config.execution_timeout, Some(Duration::from_secs(5)));
    }
}
