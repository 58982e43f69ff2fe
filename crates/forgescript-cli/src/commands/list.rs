//! List command implementation

use super::extraction_config;
use super::read_bundle;
use crate::cli::ListArgs;
use crate::error::add_bundle_context;
use crate::output::BundleListing;
use crate::output::OutputFormatter;
use anyhow::Result;
use forgescript_core::BundleExtractor;
use forgescript_core::BundleHandle;

pub fn execute(args: &ListArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    let bytes = read_bundle(&args.bundle)?;
    let config = extraction_config(&args.limits);

    let handle = add_bundle_context(BundleHandle::detect(&bytes, &config), &args.bundle)?;
    let paths = add_bundle_context(handle.extractor().list_paths(), &args.bundle)?;

    formatter.format_listing(&BundleListing {
        format: handle.describe(),
        paths,
    })
}
