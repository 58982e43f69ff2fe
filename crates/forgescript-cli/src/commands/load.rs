//! Load command implementation.

use crate::cli::LoadArgs;
use crate::output::OutputFormatter;
use anyhow::Result;
use forgescript_core::RuntimePaths;

#[cfg(feature = "python")]
pub fn execute(
    args: &LoadArgs,
    paths: RuntimePaths,
    formatter: &dyn OutputFormatter,
) -> Result<()> {
    use super::extraction_config;
    use super::read_bundle;
    use super::with_python;
    use crate::error::add_bundle_context;
    use forgescript_core::BundleLoader;
    use forgescript_core::LoadTask;

    let bytes = read_bundle(&args.bundle)?;
    let file_id = match &args.file_id {
        Some(id) => id.clone(),
        None => bundle_file_id(&args.bundle)?,
    };
    let loader = BundleLoader::new(paths, extraction_config(&args.limits));
    let task = LoadTask {
        callback_id: args.callback_id,
        task_id: args.task_id,
        operator: args.operator.clone(),
    };

    let report = with_python(args.timeout, |executor| {
        add_bundle_context(
            loader.load(&bytes, &file_id, &args.script, executor, &task),
            &args.bundle,
        )
    })?;

    formatter.format_load_report(&report)
}

#[cfg(not(feature = "python"))]
pub fn execute(
    _args: &LoadArgs,
    _paths: RuntimePaths,
    _formatter: &dyn OutputFormatter,
) -> Result<()> {
    anyhow::bail!(super::NO_PYTHON)
}

/// Extraction directory name derived from the bundle file name.
#[cfg_attr(not(feature = "python"), allow(dead_code))]
fn bundle_file_id(bundle: &std::path::Path) -> Result<String> {
    let name = bundle
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("bundle path '{}' has no file name", bundle.display()))?;
    Ok(name.split('.').next().unwrap_or(&name).to_string())
}
