//! Extract command implementation.

use super::extraction_config;
use super::read_bundle;
use crate::cli::ExtractArgs;
use crate::error::add_bundle_context;
use crate::output::OutputFormatter;
use anyhow::Context;
use anyhow::Result;
use forgescript_core::ExtractionConfig;
use forgescript_core::extract_bundle_with_report;
use std::env;
use std::fs;

pub fn execute(args: &ExtractArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    let output_dir = match &args.output_dir {
        Some(dir) => dir.clone(),
        None => env::current_dir().context("failed to get current directory")?,
    };
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create '{}'", output_dir.display()))?;

    let config = ExtractionConfig {
        preserve_permissions: !args.no_preserve_permissions,
        ..extraction_config(&args.limits)
    };

    let bytes = read_bundle(&args.bundle)?;
    let report = add_bundle_context(
        extract_bundle_with_report(&bytes, &output_dir, &config),
        &args.bundle,
    )?;

    if report.entries_skipped > 0 {
        formatter.format_warning(&format!(
            "{} link entries were not extracted",
            report.entries_skipped
        ));
    }
    formatter.format_extraction_result(&output_dir, &report)
}
