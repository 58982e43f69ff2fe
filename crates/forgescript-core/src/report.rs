//! Extraction operation reporting.

use std::path::PathBuf;
use std::time::Duration;

/// Report of a bundle extraction.
///
/// Contains statistics and the relative paths of every file written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Number of files successfully extracted.
    pub files_extracted: usize,

    /// Number of directories created (explicit entries and implied parents).
    pub directories_created: usize,

    /// Total bytes written to disk.
    pub bytes_written: u64,

    /// Symlink and hardlink entries that were not materialized.
    pub entries_skipped: usize,

    /// Relative paths of extracted files, in archive order.
    pub paths: Vec<PathBuf>,

    /// Duration of the extraction operation.
    pub duration: Duration,
}

impl ExtractionReport {
    /// Creates a new empty extraction report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns total number of items materialized on disk.
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.files_extracted + self.directories_created
    }

    /// Returns the extracted paths as `/`-separated strings.
    #[must_use]
    pub fn path_strings(&self) -> Vec<String> {
        self.paths
            .iter()
            .map(|p| {
                p.components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_report() {
        let report = ExtractionReport::new();
        assert_eq!(report.files_extracted, 0);
        assert_eq!(report.directories_created, 0);
        assert_eq!(report.bytes_written, 0);
        assert!(report.paths.is_empty());
    }

    #[test]
    fn test_total_items() {
        let report = ExtractionReport {
            files_extracted: 10,
            directories_created: 5,
            entries_skipped: 2,
            ..Default::default()
        };
        assert_eq!(report.total_items(), 15);
    }

    #[test]
    fn test_path_strings() {
        let report = ExtractionReport {
            paths: vec![PathBuf::from("subdir/file.py"), PathBuf::from("main.py")],
            ..Default::default()
        };
        assert_eq!(report.path_strings(), vec!["subdir/file.py", "main.py"]);
    }
}
