//! Validated extraction root.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use crate::ForgeError;
use crate::Result;

use super::SafePath;

/// Directory that bounds every write of an extraction.
///
/// A `SandboxRoot` is an existing directory held as an absolute canonical
/// path. Entry paths are joined onto it only after `SafePath` validation.
///
/// # Examples
///
/// ```no_run
/// use forgescript_core::types::SandboxRoot;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let root = SandboxRoot::new("/run/user/1000/forgescript/42")?;
/// println!("Extracting to: {}", root.as_path().display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRoot(PathBuf);

impl SandboxRoot {
    /// Validates an existing directory as a sandbox root.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the path does not exist, is not a directory, or cannot
    /// be canonicalized.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let metadata = fs::metadata(&path).map_err(|e| {
            ForgeError::Io(io::Error::new(
                e.kind(),
                format!("sandbox root {}: {e}", path.display()),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(ForgeError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sandbox root is not a directory: {}", path.display()),
            )));
        }

        let canonical = path.canonicalize().map_err(|e| {
            ForgeError::Io(io::Error::new(
                e.kind(),
                format!("failed to canonicalize path {}: {e}", path.display()),
            ))
        })?;

        Ok(Self(canonical))
    }

    /// Creates the directory (and missing parents) with `mode`, then validates
    /// it.
    ///
    /// `mode` is ignored on non-Unix platforms.
    pub fn create(path: impl Into<PathBuf>, mode: u32) -> Result<Self> {
        let path = path.into();
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        builder.create(&path)?;
        Self::new(path)
    }

    /// Returns the canonical root path.
    #[inline]
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Joins a validated entry path onto the root.
    #[inline]
    #[must_use]
    pub fn join(&self, safe_path: &SafePath) -> PathBuf {
        self.0.join(safe_path.as_path())
    }

    /// Converts into the inner `PathBuf`.
    #[inline]
    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sandbox_root_valid() {
        let temp = TempDir::new().expect("failed to create temp dir");
        let root = SandboxRoot::new(temp.path()).expect("root should be valid");
        assert!(root.as_path().is_absolute());
    }

    #[test]
    fn test_sandbox_root_nonexistent() {
        let result = SandboxRoot::new("/nonexistent/directory/that/does/not/exist");
        assert!(matches!(result, Err(ForgeError::Io(_))));
    }

    #[test]
    fn test_sandbox_root_is_file() {
        let temp = TempDir::new().expect("failed to create temp dir");
        let file = temp.path().join("file.py");
        fs::write(&file, b"").unwrap();

        let err = SandboxRoot::new(&file).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_sandbox_root_create() {
        let temp = TempDir::new().expect("failed to create temp dir");
        let target = temp.path().join("runtime").join("42");

        let root = SandboxRoot::create(&target, 0o700).expect("create should succeed");
        assert!(root.as_path().is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(root.as_path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn test_sandbox_root_create_existing() {
        let temp = TempDir::new().expect("failed to create temp dir");
        assert!(SandboxRoot::create(temp.path(), 0o700).is_ok());
    }
}
