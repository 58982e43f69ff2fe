//! JSON output formatter for machine-readable results.

use super::formatter::BundleListing;
use super::formatter::JsonOutput;
use super::formatter::OutputFormatter;
use anyhow::Result;
use forgescript_core::AliasCommand;
use forgescript_core::ExtractionReport;
use forgescript_core::LoadReport;
use serde::Serialize;
use std::io::Write;
use std::io::{self};
use std::path::Path;
use std::path::PathBuf;

pub struct JsonFormatter;

impl JsonFormatter {
    fn output<T: Serialize>(value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        writeln!(io::stdout(), "{json}")?;
        Ok(())
    }
}

#[derive(Serialize)]
struct ExtractionOutput {
    output_dir: String,
    files_extracted: usize,
    directories_created: usize,
    entries_skipped: usize,
    bytes_written: u64,
    paths: Vec<String>,
    duration_ms: u128,
}

impl ExtractionOutput {
    fn new(dir: &Path, report: &ExtractionReport) -> Self {
        Self {
            output_dir: dir.display().to_string(),
            files_extracted: report.files_extracted,
            directories_created: report.directories_created,
            entries_skipped: report.entries_skipped,
            bytes_written: report.bytes_written,
            paths: report.path_strings(),
            duration_ms: report.duration.as_millis(),
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_listing(&self, listing: &BundleListing) -> Result<()> {
        Self::output(&JsonOutput::success("list", listing))
    }

    fn format_extraction_result(&self, dir: &Path, report: &ExtractionReport) -> Result<()> {
        Self::output(&JsonOutput::success(
            "extract",
            ExtractionOutput::new(dir, report),
        ))
    }

    fn format_load_report(&self, report: &LoadReport) -> Result<()> {
        #[derive(Serialize)]
        struct LoadOutput<'a> {
            aliases: &'a [String],
            listing: &'a [String],
            extraction: ExtractionOutput,
        }

        Self::output(&JsonOutput::success(
            "load",
            LoadOutput {
                aliases: &report.aliases,
                listing: &report.listing,
                extraction: ExtractionOutput::new(&report.dir, &report.extraction),
            },
        ))
    }

    fn format_command(&self, command: &AliasCommand) -> Result<()> {
        Self::output(&JsonOutput::success("invoke", command))
    }

    fn format_cleaned(&self, removed: &[PathBuf]) -> Result<()> {
        let removed: Vec<String> = removed.iter().map(|p| p.display().to_string()).collect();
        Self::output(&JsonOutput::success("clean", removed))
    }

    fn format_error(&self, error: &anyhow::Error) {
        let output = JsonOutput::<()>::error("error", format!("{error:?}"));
        let _ = Self::output(&output);
    }

    fn format_warning(&self, message: &str) {
        #[derive(Serialize)]
        struct WarningData {
            message: String,
        }

        let output = JsonOutput::success(
            "warning",
            WarningData {
                message: message.to_string(),
            },
        );
        let _ = Self::output(&output);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_output_structure() {
        let listing = BundleListing {
            format: "tar+gzip".into(),
            paths: vec!["forgescript_alias.py".into()],
        };

        let json = serde_json::to_value(JsonOutput::success("list", &listing)).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"]["format"], "tar+gzip");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_output_structure() {
        let json = serde_json::to_value(JsonOutput::<()>::error("error", "boom")).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
        assert!(json.get("data").is_none());
    }
}
