//! Type-safe wrappers used during bundle extraction.
//!
//! `SandboxRoot` and `SafePath` can only be built through validation, so an
//! extractor holding both can join them without re-checking.

pub mod entry;
pub mod safe_path;
pub mod sandbox_root;

pub use entry::ArchiveEntry;
pub use entry::EntryKind;
pub use safe_path::SafePath;
pub use sandbox_root::SandboxRoot;
