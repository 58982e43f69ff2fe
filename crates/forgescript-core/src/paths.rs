//! On-disk locations used by forgescript.
//!
//! Bundles are extracted under `<runtime_dir>/<file_id>/`. Both the runtime and
//! cache directories always end in a `forgescript` component.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use tracing::info;

use crate::ForgeError;
use crate::Result;

/// Final path component appended to the runtime and cache directories.
pub const FORGE_DIR_NAME: &str = "forgescript";

/// Resolved runtime and cache directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    runtime_dir: PathBuf,
    cache_dir: PathBuf,
}

impl RuntimePaths {
    /// Resolves directories from the process environment.
    ///
    /// The runtime directory is `$XDG_RUNTIME_DIR` or the OS temporary
    /// directory. The cache directory is `$XDG_CACHE_HOME`, `.cache` under the
    /// user's home directory, or the temporary directory as a last resort.
    #[must_use]
    pub fn from_env() -> Self {
        Self::resolve(
            env::var_os("XDG_RUNTIME_DIR"),
            env::var_os("XDG_CACHE_HOME"),
            home::home_dir(),
        )
    }

    /// Resolves directories from explicit environment values.
    #[must_use]
    pub fn resolve(
        xdg_runtime_dir: Option<OsString>,
        xdg_cache_home: Option<OsString>,
        home: Option<PathBuf>,
    ) -> Self {
        let runtime = non_empty(xdg_runtime_dir).map_or_else(env::temp_dir, PathBuf::from);
        let cache = non_empty(xdg_cache_home)
            .map(PathBuf::from)
            .or_else(|| {
                home.filter(|h| !h.as_os_str().is_empty())
                    .map(|h| h.join(".cache"))
            })
            .unwrap_or_else(env::temp_dir);

        Self {
            runtime_dir: with_forge_suffix(&runtime),
            cache_dir: with_forge_suffix(&cache),
        }
    }

    /// Replaces the runtime directory, keeping the `forgescript` suffix rule.
    #[must_use]
    pub fn with_runtime_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.runtime_dir = with_forge_suffix(dir.as_ref());
        self
    }

    /// Replaces the cache directory, keeping the `forgescript` suffix rule.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cache_dir = with_forge_suffix(dir.as_ref());
        self
    }

    /// Returns the runtime directory.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the extraction directory for an uploaded bundle.
    ///
    /// # Errors
    ///
    /// Returns `PathTraversal` unless `file_id` is a single plain path
    /// component.
    pub fn bundle_dir(&self, file_id: &str) -> Result<PathBuf> {
        let mut components = Path::new(file_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if !file_id.contains('\0') => {
                Ok(self.runtime_dir.join(name))
            }
            _ => Err(ForgeError::PathTraversal {
                entry: file_id.to_string(),
            }),
        }
    }

    /// Creates the runtime directory (mode 0700) if needed.
    pub fn ensure_runtime_dir(&self) -> Result<&Path> {
        create_private_dir_all(&self.runtime_dir)?;
        info!(runtime_path = %self.runtime_dir.display(), "configured runtime directory");
        Ok(&self.runtime_dir)
    }

    /// Removes the runtime and cache directories.
    ///
    /// Both removals are attempted; the first failure is returned. Missing
    /// directories are not an error.
    pub fn clean(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        let mut first_error = None;

        for dir in [&self.runtime_dir, &self.cache_dir] {
            match fs::remove_dir_all(dir) {
                Ok(()) => removed.push(dir.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(ForgeError::Io(e)),
            None => Ok(removed),
        }
    }
}

impl Default for RuntimePaths {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Appends `forgescript` unless the path already ends with it.
#[must_use]
pub fn with_forge_suffix(path: &Path) -> PathBuf {
    if path.file_name().is_some_and(|name| name == FORGE_DIR_NAME) {
        path.to_path_buf()
    } else {
        path.join(FORGE_DIR_NAME)
    }
}

/// Creates a directory tree with owner-only permissions on Unix.
pub(crate) fn create_private_dir_all(path: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    builder.create(path)
}

fn non_empty(value: Option<OsString>) -> Option<OsString> {
    value.filter(|v| !v.is_empty())
}
