//! Sandboxed writer shared by the tar and zip extractors.
//!
//! Every entry goes through [`SandboxedWriter`], which validates its path,
//! enforces the per-extraction quotas, and materializes files and directories
//! under the sandbox root.

use std::collections::HashSet;
use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::BufWriter;
use std::io::Read;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::time::Instant;

use tracing::debug;
use tracing::warn;

use crate::ExtractionConfig;
use crate::ExtractionReport;
use crate::ForgeError;
use crate::Result;
use crate::copy::CopyBuffer;
use crate::copy::copy_with_buffer;
use crate::error::QuotaResource;
use crate::types::EntryKind;
use crate::types::SafePath;
use crate::types::SandboxRoot;

/// Writes validated entries under a sandbox root and accumulates a report.
pub(crate) struct SandboxedWriter<'a> {
    root: &'a SandboxRoot,
    config: &'a ExtractionConfig,
    report: ExtractionReport,
    copy_buffer: CopyBuffer,
    known_dirs: HashSet<PathBuf>,
    started: Instant,
}

impl<'a> SandboxedWriter<'a> {
    pub(crate) fn new(root: &'a SandboxRoot, config: &'a ExtractionConfig) -> Self {
        Self {
            root,
            config,
            report: ExtractionReport::new(),
            copy_buffer: CopyBuffer::new(),
            known_dirs: HashSet::new(),
            started: Instant::now(),
        }
    }

    /// Writes one regular file entry.
    ///
    /// Fails with `TruncatedWrite` if the reader yields fewer bytes than
    /// `declared_size`. The file is flushed and fsynced before returning.
    pub(crate) fn write_file<R: Read + ?Sized>(
        &mut self,
        entry: &str,
        reader: &mut R,
        declared_size: u64,
        mode: Option<u32>,
    ) -> Result<()> {
        let safe = SafePath::validate(entry, self.root)?;
        self.check_quotas(declared_size)?;

        if let Some(parent) = safe.as_path().parent() {
            self.ensure_dirs(entry, parent)?;
        }

        let target = self.root.join(&safe);
        refuse_symlink(entry, &target)?;

        let file = open_for_write(&target).map_err(|e| {
            if is_symlink_loop(&e) {
                ForgeError::PathTraversal {
                    entry: entry.to_string(),
                }
            } else {
                ForgeError::Io(e)
            }
        })?;

        // Never read past the declared size; a longer stream is truncated to
        // what the header promised.
        let mut limited = reader.take(declared_size);
        let mut writer = BufWriter::with_capacity(self.copy_buffer.size(), file);
        let written = copy_with_buffer(&mut limited, &mut writer, &mut self.copy_buffer)
            .map_err(|e| corrupt_or_io(entry, e))?;

        if written != declared_size {
            return Err(ForgeError::TruncatedWrite {
                entry: entry.to_string(),
                written,
                expected: declared_size,
            });
        }

        let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        self.apply_mode(&file, mode)?;
        file.sync_all()?;

        debug!(entry, bytes = written, "extracted file");

        self.report.files_extracted += 1;
        self.report.bytes_written = self.report.bytes_written.saturating_add(written);
        self.report.paths.push(safe.into_path_buf());
        Ok(())
    }

    /// Creates a directory entry (idempotent).
    ///
    /// An entry made only of `.` components (`./` from `tar -C dir .`) names
    /// the root itself and is a no-op.
    pub(crate) fn write_dir(&mut self, entry: &str) -> Result<()> {
        if names_root(entry) {
            debug!(entry, "directory entry names the sandbox root");
            return Ok(());
        }

        let safe = SafePath::validate(entry, self.root)?;
        self.ensure_dirs(entry, safe.as_path())
    }

    /// Records a link or special entry that is not materialized.
    pub(crate) fn skip(&mut self, entry: &str, kind: EntryKind) {
        warn!(entry, ?kind, "skipping non-regular bundle entry");
        self.report.entries_skipped += 1;
    }

    pub(crate) fn finish(mut self) -> ExtractionReport {
        self.report.duration = self.started.elapsed();
        self.report
    }

    fn check_quotas(&self, declared_size: u64) -> Result<()> {
        if declared_size > self.config.max_file_size {
            return Err(ForgeError::QuotaExceeded {
                resource: QuotaResource::FileSize {
                    size: declared_size,
                    max: self.config.max_file_size,
                },
            });
        }

        let next = self.report.files_extracted + 1;
        if next > self.config.max_file_count {
            return Err(ForgeError::QuotaExceeded {
                resource: QuotaResource::FileCount {
                    current: next,
                    max: self.config.max_file_count,
                },
            });
        }

        Ok(())
    }

    /// Creates each missing component of `relative` under the root.
    ///
    /// Existing components must be real directories; a symlink or file in
    /// the way is refused.
    fn ensure_dirs(&mut self, entry: &str, relative: &Path) -> Result<()> {
        let mut current = self.root.as_path().to_path_buf();

        for component in relative.components() {
            current.push(component);
            if self.known_dirs.contains(&current) {
                continue;
            }

            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    return Err(ForgeError::PathTraversal {
                        entry: entry.to_string(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    self.create_dir(&current)?;
                    self.report.directories_created += 1;
                }
                Err(e) => return Err(ForgeError::Io(e)),
            }

            self.known_dirs.insert(current.clone());
        }

        Ok(())
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();

        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(self.config.directory_mode);
        }

        match builder.create(path) {
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
            other => other,
        }
    }

    #[cfg(unix)]
    fn apply_mode(&self, file: &File, mode: Option<u32>) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(mode) = mode.filter(|_| self.config.preserve_permissions) {
            let sanitized = ExtractionConfig::sanitize_mode(mode);
            file.set_permissions(fs::Permissions::from_mode(sanitized))?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    #[allow(clippy::unused_self, clippy::unnecessary_wraps)]
    fn apply_mode(&self, _file: &File, _mode: Option<u32>) -> Result<()> {
        Ok(())
    }
}

/// True when `entry` is non-empty and consists only of `.` components.
fn names_root(entry: &str) -> bool {
    let mut components = Path::new(entry).components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::CurDir))
}

/// Refuses to write through an existing symlink at the target.
fn refuse_symlink(entry: &str, target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.file_type().is_symlink() || meta.is_dir() => {
            Err(ForgeError::PathTraversal {
                entry: entry.to_string(),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn open_for_write(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
}

#[cfg(not(unix))]
fn open_for_write(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(unix)]
fn is_symlink_loop(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::ELOOP)
}

#[cfg(not(unix))]
fn is_symlink_loop(_e: &io::Error) -> bool {
    false
}

/// Read failures while streaming an entry come from the archive itself.
pub(crate) fn corrupt_or_io(entry: &str, e: io::Error) -> ForgeError {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof | io::ErrorKind::Other => {
            ForgeError::CorruptArchive(format!("{entry}: {e}"))
        }
        _ => ForgeError::Io(e),
    }
}
