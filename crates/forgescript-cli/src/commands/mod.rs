//! Subcommand implementations.

pub mod clean;
pub mod extract;
pub mod invoke;
pub mod list;
pub mod load;

use crate::cli::LimitArgs;
use anyhow::Context;
use anyhow::Result;
use forgescript_core::ExtractionConfig;
use forgescript_core::RuntimePaths;
use std::fs;
use std::path::Path;

/// Builds the extraction config from command-line limits.
pub fn extraction_config(limits: &LimitArgs) -> ExtractionConfig {
    let defaults = ExtractionConfig::default();
    ExtractionConfig {
        max_file_count: limits.max_files,
        max_file_size: limits.max_file_size.unwrap_or(defaults.max_file_size),
        max_decompressed_size: limits
            .max_decompressed_size
            .unwrap_or(defaults.max_decompressed_size),
        max_unwrap_depth: limits.max_unwrap_depth,
        ..defaults
    }
}

/// Resolves runtime paths, honoring `--runtime-dir`.
pub fn runtime_paths(runtime_dir: Option<&Path>) -> RuntimePaths {
    let paths = RuntimePaths::from_env();
    match runtime_dir {
        Some(dir) => paths.with_runtime_dir(dir),
        None => paths,
    }
}

/// Reads a bundle file into memory.
pub fn read_bundle(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read bundle '{}'", path.display()))
}

/// Message for commands that need the embedded interpreter.
#[cfg(not(feature = "python"))]
pub const NO_PYTHON: &str = "this forgescript build has no Python support\n\
     HINT: Rebuild with `--features python` to run bundle scripts.";

/// Starts a Python executor, runs `f` against it, and shuts it down.
///
/// After a timeout the loop is abandoned rather than joined: the timed-out
/// script keeps its context until it finishes, and process exit reclaims it.
#[cfg(feature = "python")]
pub fn with_python<R>(
    timeout: Option<u64>,
    f: impl FnOnce(&forgescript_core::ExecutorHandle<forgescript_python::PythonHost>) -> Result<R>,
) -> Result<R> {
    use forgescript_core::Executor;
    use forgescript_core::ExecutorConfig;
    use forgescript_core::MemorySink;
    use forgescript_python::PythonHost;
    use std::sync::Arc;
    use std::time::Duration;

    let sink = Arc::new(MemorySink::new());
    let mut config = ExecutorConfig::default();
    if let Some(secs) = timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    let (handle, join) = Executor::start(PythonHost::with_sink(Arc::clone(&sink)), config)?;
    let result = f(&handle);
    drop(handle);

    if result.as_ref().is_err_and(is_timeout) {
        tracing::warn!("abandoning interpreter executor after timeout");
        return result;
    }

    join.join()
        .map_err(|_| anyhow::anyhow!("interpreter executor thread panicked"))??;

    for command in sink.commands() {
        tracing::debug!(callback_id = command.callback_id, definition = %command.command_json, "command definition");
    }
    for file in sink.files() {
        tracing::debug!(id = %file.id, name = %file.file_name, size = file.data.len(), "registered file");
    }
    result
}

/// True if `err` wraps an execution timeout anywhere in its chain.
#[cfg_attr(not(feature = "python"), allow(dead_code))]
fn is_timeout(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<forgescript_core::ForgeError>(),
            Some(forgescript_core::ForgeError::Timeout(_))
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::add_bundle_context;
    use forgescript_core::ForgeError;
    use std::time::Duration;

    #[test]
    fn test_timeout_detected_through_context() {
        let err = add_bundle_context::<()>(
            Err(ForgeError::Timeout(Duration::from_secs(1))),
            Path::new("sa.zip"),
        )
        .unwrap_err();
        assert!(is_timeout(&err));
    }

    #[test]
    fn test_other_errors_are_not_timeouts() {
        let err = add_bundle_context::<()>(
            Err(ForgeError::ScriptError("boom".into())),
            Path::new("sa.zip"),
        )
        .unwrap_err();
        assert!(!is_timeout(&err));
    }
}
