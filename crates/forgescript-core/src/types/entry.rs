//! Archive entry metadata.

/// Kind of an entry inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link (never materialized).
    Symlink,
    /// Hard link (never materialized).
    Hardlink,
    /// Device nodes, FIFOs and other special entries.
    Other,
}

impl EntryKind {
    /// Returns `true` for link entries that extraction skips.
    #[must_use]
    pub const fn is_link(self) -> bool {
        matches!(self, Self::Symlink | Self::Hardlink)
    }
}

/// One entry of a bundle as recorded in the container metadata.
///
/// The path is the raw name from the archive and has not been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name as stored in the archive.
    pub path: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Unix mode bits, if the archive records them.
    pub mode: Option<u32>,
    /// Entry kind.
    pub kind: EntryKind,
}

impl ArchiveEntry {
    /// Returns `true` if this entry is a regular file.
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File)
    }
}
