//! Output formatter trait for CLI results.

use anyhow::Result;
use forgescript_core::AliasCommand;
use forgescript_core::ExtractionReport;
use forgescript_core::LoadReport;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;

/// Detected layout and contents of a bundle.
#[derive(Debug, Serialize)]
pub struct BundleListing {
    /// Container and envelopes, e.g. `tar+gzip`.
    pub format: String,
    /// Entry paths in archive order.
    pub paths: Vec<String>,
}

/// Common output formatter trait
pub trait OutputFormatter {
    /// Format bundle listing
    fn format_listing(&self, listing: &BundleListing) -> Result<()>;

    /// Format extraction result
    fn format_extraction_result(&self, dir: &Path, report: &ExtractionReport) -> Result<()>;

    /// Format load result
    #[cfg_attr(not(feature = "python"), allow(dead_code))]
    fn format_load_report(&self, report: &LoadReport) -> Result<()>;

    /// Format the command an alias callback returned
    #[cfg_attr(not(feature = "python"), allow(dead_code))]
    fn format_command(&self, command: &AliasCommand) -> Result<()>;

    /// Format removed directories
    fn format_cleaned(&self, removed: &[PathBuf]) -> Result<()>;

    /// Format error message
    fn format_error(&self, error: &anyhow::Error);

    /// Format warning message
    fn format_warning(&self, message: &str);
}

/// Generic JSON output structure
#[derive(Debug, Serialize)]
pub struct JsonOutput<T> {
    pub operation: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn success(operation: impl Into<String>, data: T) -> Self {
        Self {
            operation: operation.into(),
            status: Status::Success,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(operation: impl Into<String>, error: impl Into<String>) -> JsonOutput<()> {
        JsonOutput {
            operation: operation.into(),
            status: Status::Error,
            data: None,
            error: Some(error.into()),
        }
    }
}
