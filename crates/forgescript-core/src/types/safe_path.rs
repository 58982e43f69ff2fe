//! Validated relative entry path.

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::ForgeError;
use crate::Result;

use super::SandboxRoot;

/// A relative entry path that resolves inside a sandbox root.
///
/// `SafePath` can only be built by [`SafePath::validate`]. A valid path
/// contains no `..`, root, or prefix components, no NUL bytes, and at least
/// one normal component. `.` components are dropped. Any ancestor that already
/// exists on disk must resolve (after following symlinks) inside the root.
///
/// # Examples
///
/// ```no_run
/// use forgescript_core::types::SafePath;
/// use forgescript_core::types::SandboxRoot;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let root = SandboxRoot::new("/tmp")?;
///
/// let safe = SafePath::validate("subdir/file.py", &root)?;
/// assert!(SafePath::validate("../../escape.py", &root).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafePath(PathBuf);

impl SafePath {
    /// Validates an archive entry name against `root`.
    ///
    /// # Errors
    ///
    /// Returns `PathTraversal` carrying the raw entry name when any check
    /// fails, and `Io` if an existing ancestor cannot be canonicalized.
    pub fn validate(entry: &str, root: &SandboxRoot) -> Result<Self> {
        let traversal = || ForgeError::PathTraversal {
            entry: entry.to_string(),
        };

        if entry.contains('\0') {
            return Err(traversal());
        }

        let mut normalized = PathBuf::new();
        for component in Path::new(entry).components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(traversal());
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(traversal());
        }

        // Symlinks already on disk may redirect a lexically clean path.
        let resolved = root.as_path().join(&normalized);
        if let Some(parent) = resolved.parent() {
            if let Some(existing) = deepest_existing_ancestor(parent) {
                let canonical = existing.canonicalize()?;
                if !canonical.starts_with(root.as_path()) {
                    return Err(traversal());
                }
            }
        }

        Ok(Self(normalized))
    }

    /// Returns the normalized relative path.
    #[inline]
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Converts into the inner `PathBuf`.
    #[inline]
    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

fn deepest_existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.symlink_metadata().is_ok())
}
