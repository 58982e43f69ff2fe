//! Clean command implementation.

use crate::output::OutputFormatter;
use anyhow::Context;
use anyhow::Result;
use forgescript_core::RuntimePaths;

pub fn execute(paths: &RuntimePaths, formatter: &dyn OutputFormatter) -> Result<()> {
    let removed = paths
        .clean()
        .context("failed to remove forgescript directories")?;
    formatter.format_cleaned(&removed)
}
