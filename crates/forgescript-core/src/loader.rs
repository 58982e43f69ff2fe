//! Loading an uploaded bundle: extract it, then run one of its scripts.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use tracing::info;

use crate::ExecutorHandle;
use crate::ExtractionConfig;
use crate::ExtractionReport;
use crate::ForgeError;
use crate::Result;
use crate::RuntimePaths;
use crate::bundle::resolve_extractor;
use crate::formats::BundleExtractor;
use crate::host::InterpreterHost;
use crate::types::SafePath;
use crate::types::SandboxRoot;

/// Script run by default after extraction.
pub const DEFAULT_SCRIPT: &str = "forgescript_alias.py";

/// Identity of the task that requested a load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadTask {
    /// Callback the aliases are registered for.
    pub callback_id: i64,
    /// Task id reported to the script.
    pub task_id: i64,
    /// Operator name, used as the default alias author.
    pub operator: String,
}

/// A bundle extracted to disk, ready to run.
#[derive(Debug)]
pub struct PreparedBundle {
    /// Extraction directory.
    pub dir: PathBuf,
    /// Bundle listing in archive order.
    pub listing: Vec<String>,
    /// Absolute path of the script to run.
    pub script_path: PathBuf,
    /// Extraction statistics.
    pub extraction: ExtractionReport,
}

/// Result of a full load.
#[derive(Debug)]
pub struct LoadReport {
    /// Extraction directory.
    pub dir: PathBuf,
    /// Bundle listing in archive order.
    pub listing: Vec<String>,
    /// Aliases registered by the script, in registration order.
    pub aliases: Vec<String>,
    /// Extraction statistics.
    pub extraction: ExtractionReport,
}

impl LoadReport {
    /// Operator-facing summary of the load.
    #[must_use]
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extracted bundle to {}", self.dir.display())?;
        for alias in &self.aliases {
            write!(f, "\nRegistered alias {alias}")?;
        }
        Ok(())
    }
}

/// Extracts uploaded bundles under the runtime directory.
#[derive(Debug, Clone)]
pub struct BundleLoader {
    paths: RuntimePaths,
    config: ExtractionConfig,
}

impl BundleLoader {
    /// Creates a loader.
    #[must_use]
    pub fn new(paths: RuntimePaths, config: ExtractionConfig) -> Self {
        Self { paths, config }
    }

    /// Returns the runtime paths.
    #[must_use]
    pub fn paths(&self) -> &RuntimePaths {
        &self.paths
    }

    /// Extracts `bytes` to `<runtime_dir>/<file_id>` after checking that
    /// `script_name` is part of the bundle.
    ///
    /// # Errors
    ///
    /// - any resolution error from [`resolve_extractor`]
    /// - `ScriptNotInBundle` if `script_name` is not listed
    /// - `PathTraversal` for a `file_id` that is not a single path component
    /// - `NotFound` / `IsDirectory` if the script was not extracted as a file
    pub fn prepare(&self, bytes: &[u8], file_id: &str, script_name: &str) -> Result<PreparedBundle> {
        let extractor = resolve_extractor(bytes, &self.config)?;
        let listing = extractor.list_paths()?;
        if !listing.iter().any(|path| path == script_name) {
            return Err(ForgeError::ScriptNotInBundle(script_name.to_string()));
        }

        let dir = self.paths.bundle_dir(file_id)?;
        self.paths.ensure_runtime_dir()?;
        let root = SandboxRoot::create(&dir, self.config.directory_mode)?;
        let extraction = extractor.extract_to(&root)?;
        info!(
            dir = %root.as_path().display(),
            format = extractor.format_name(),
            files = extraction.files_extracted,
            "extracted bundle"
        );

        let script = SafePath::validate(script_name, &root)?;
        let script_path = root.join(&script);
        check_script_file(&script_path)?;

        Ok(PreparedBundle {
            dir: root.into_path_buf(),
            listing,
            script_path,
            extraction,
        })
    }

    /// Extracts the bundle and runs `script_name` in a fresh sub-context.
    ///
    /// # Errors
    ///
    /// Any error from [`prepare`](Self::prepare) or
    /// [`ExecutorHandle::run_script`].
    pub fn load<H: InterpreterHost>(
        &self,
        bytes: &[u8],
        file_id: &str,
        script_name: &str,
        executor: &ExecutorHandle<H>,
        task: &LoadTask,
    ) -> Result<LoadReport> {
        let prepared = self.prepare(bytes, file_id, script_name)?;
        let aliases = executor.run_script(
            &prepared.script_path,
            task.callback_id,
            task.task_id,
            &task.operator,
        )?;

        for alias in &aliases {
            info!(alias = alias.as_str(), task_id = task.task_id, "registered alias");
        }

        Ok(LoadReport {
            dir: prepared.dir,
            listing: prepared.listing,
            aliases,
            extraction: prepared.extraction,
        })
    }
}

fn check_script_file(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Err(ForgeError::IsDirectory(path.to_path_buf())),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(ForgeError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(ForgeError::Io(e)),
    }
}
