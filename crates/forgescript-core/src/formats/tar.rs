//! Tar container extractor.

use std::io;
use std::io::Cursor;

use tracing::info;

use super::common::SandboxedWriter;
use super::traits::BundleExtractor;
use crate::ExtractionConfig;
use crate::ExtractionReport;
use crate::ForgeError;
use crate::Result;
use crate::types::ArchiveEntry;
use crate::types::EntryKind;
use crate::types::SandboxRoot;

/// Extractor for an uncompressed tar stream.
#[derive(Debug, Clone)]
pub struct TarExtractor {
    data: Vec<u8>,
    config: ExtractionConfig,
}

impl TarExtractor {
    /// Wraps raw tar bytes.
    #[must_use]
    pub fn new(data: Vec<u8>, config: ExtractionConfig) -> Self {
        Self { data, config }
    }

    /// Returns the raw tar bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn archive(&self) -> tar::Archive<Cursor<&[u8]>> {
        tar::Archive::new(Cursor::new(self.data.as_slice()))
    }
}

impl BundleExtractor for TarExtractor {
    fn entries(&self) -> Result<Vec<ArchiveEntry>> {
        let mut archive = self.archive();
        let mut entries = Vec::new();

        for entry in archive.entries().map_err(corrupt)? {
            let entry = entry.map_err(corrupt)?;
            let header = entry.header();
            entries.push(ArchiveEntry {
                path: entry_name(&entry),
                size: entry.size(),
                mode: header.mode().ok(),
                kind: kind_of(header.entry_type()),
            });
        }

        Ok(entries)
    }

    /// Every entry name in archive order, directories included.
    fn list_paths(&self) -> Result<Vec<String>> {
        Ok(self.entries()?.into_iter().map(|e| e.path).collect())
    }

    fn extract_to(&self, root: &SandboxRoot) -> Result<ExtractionReport> {
        let mut archive = self.archive();
        let mut writer = SandboxedWriter::new(root, &self.config);

        for entry in archive.entries().map_err(corrupt)? {
            let mut entry = entry.map_err(corrupt)?;
            let name = entry_name(&entry);
            let kind = kind_of(entry.header().entry_type());

            match kind {
                EntryKind::File => {
                    let size = entry.size();
                    let mode = entry.header().mode().ok();
                    writer.write_file(&name, &mut entry, size, mode)?;
                }
                EntryKind::Directory => writer.write_dir(&name)?,
                EntryKind::Symlink | EntryKind::Hardlink | EntryKind::Other => {
                    writer.skip(&name, kind);
                }
            }
        }

        let report = writer.finish();
        info!(
            format = "tar",
            files = report.files_extracted,
            bytes = report.bytes_written,
            root = %root.as_path().display(),
            "extracted bundle"
        );
        Ok(report)
    }

    fn format_name(&self) -> &'static str {
        "tar"
    }
}

fn entry_name<R: io::Read>(entry: &tar::Entry<'_, R>) -> String {
    String::from_utf8_lossy(&entry.path_bytes()).into_owned()
}

fn kind_of(entry_type: tar::EntryType) -> EntryKind {
    match entry_type {
        tar::EntryType::Regular | tar::EntryType::Continuous => EntryKind::File,
        tar::EntryType::Directory => EntryKind::Directory,
        tar::EntryType::Symlink => EntryKind::Symlink,
        tar::EntryType::Link => EntryKind::Hardlink,
        _ => EntryKind::Other,
    }
}

fn corrupt(e: io::Error) -> ForgeError {
    ForgeError::CorruptArchive(e.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_utils::TarTestBuilder;
    use crate::test_utils::create_test_tar;
    use crate::test_utils::tar_with_raw_entries;
    use crate::test_utils::tar_with_raw_name;
    use std::fs;
    use tempfile::TempDir;

    fn extractor(data: Vec<u8>) -> TarExtractor {
        TarExtractor::new(data, ExtractionConfig::default())
    }

    fn sandbox() -> (TempDir, SandboxRoot) {
        let temp = TempDir::new().expect("failed to create temp dir");
        let root = SandboxRoot::new(temp.path()).expect("root should be valid");
        (temp, root)
    }

    #[test]
    fn test_list_paths_nested() {
        let data = create_test_tar(vec![
            ("file.py", b"a"),
            ("subdir/file.py", b"b"),
            ("subdir/deeper/file.py", b"c"),
        ]);
        assert_eq!(
            extractor(data).list_paths().unwrap(),
            vec!["file.py", "subdir/file.py", "subdir/deeper/file.py"]
        );
    }

    #[test]
    fn test_list_paths_includes_directories() {
        let data = TarTestBuilder::new()
            .add_directory("pkg/")
            .add_file("pkg/mod.py", b"")
            .build();
        assert_eq!(extractor(data).list_paths().unwrap(), vec!["pkg/", "pkg/mod.py"]);
    }

    #[test]
    fn test_extract_roundtrip() {
        let (temp, root) = sandbox();
        let data = create_test_tar(vec![("subdir/file.py", b"print('ok')")]);

        let report = extractor(data).extract_to(&root).unwrap();

        assert_eq!(
            fs::read(temp.path().join("subdir/file.py")).unwrap(),
            b"print('ok')"
        );
        assert_eq!(report.files_extracted, 1);
        assert_eq!(report.bytes_written, 11);
        assert_eq!(report.path_strings(), vec!["subdir/file.py"]);
    }

    #[test]
    fn test_extract_directory_entry() {
        let (temp, root) = sandbox();
        let data = TarTestBuilder::new().add_directory("empty/").build();

        let report = extractor(data).extract_to(&root).unwrap();
        assert!(temp.path().join("empty").is_dir());
        assert_eq!(report.directories_created, 1);
        assert_eq!(report.files_extracted, 0);
    }

    #[test]
    fn test_extract_dot_rooted_bundle() {
        let (temp, root) = sandbox();
        let data = tar_with_raw_entries(vec![
            ("./", b""),
            ("./lib/", b""),
            ("./forgescript_alias.py", b"import forgescript\n"),
        ]);

        let ext = extractor(data);
        assert_eq!(
            ext.list_paths().unwrap(),
            vec!["./", "./lib/", "./forgescript_alias.py"]
        );

        let report = ext.extract_to(&root).unwrap();
        assert_eq!(
            fs::read(temp.path().join("forgescript_alias.py")).unwrap(),
            b"import forgescript\n"
        );
        assert!(temp.path().join("lib").is_dir());
        assert_eq!(report.files_extracted, 1);
        assert_eq!(report.directories_created, 1);
        assert_eq!(report.path_strings(), vec!["forgescript_alias.py"]);
    }

    #[test]
    fn test_extract_path_traversal() {
        let (temp, root) = sandbox();
        let data = tar_with_raw_name("../../escape.py", b"import os");

        let err = extractor(data).extract_to(&root).unwrap_err();
        assert!(matches!(
            &err,
            ForgeError::PathTraversal { entry } if entry == "../../escape.py"
        ));
        assert!(!temp.path().join("../../escape.py").exists());
        assert!(!temp.path().parent().unwrap().join("escape.py").exists());
    }

    #[test]
    fn test_traversal_aborts_remaining_entries() {
        let (temp, root) = sandbox();
        let mut data = tar_with_raw_name("../evil.py", b"x");
        // Drop the end-of-archive blocks and append a valid entry after it.
        data.truncate(data.len() - 1024);
        data.extend(create_test_tar(vec![("after.py", b"y")]));

        assert!(extractor(data).extract_to(&root).is_err());
        assert!(!temp.path().join("after.py").exists());
    }

    #[test]
    fn test_links_are_skipped() {
        let (temp, root) = sandbox();
        let data = TarTestBuilder::new()
            .add_file("real.py", b"x")
            .add_symlink("link.py", "/etc/passwd")
            .add_hardlink("hard.py", "real.py")
            .build();

        let report = extractor(data).extract_to(&root).unwrap();
        assert_eq!(report.files_extracted, 1);
        assert_eq!(report.entries_skipped, 2);
        assert!(fs::symlink_metadata(temp.path().join("link.py")).is_err());
        assert!(!temp.path().join("hard.py").exists());
    }

    #[test]
    fn test_short_body_never_succeeds() {
        let (_temp, root) = sandbox();
        let mut data = create_test_tar(vec![("file.py", &[b'x'; 600])]);
        // Header block plus 100 bytes of the body.
        data.truncate(512 + 100);

        let err = extractor(data).extract_to(&root).unwrap_err();
        assert!(
            matches!(
                err,
                ForgeError::TruncatedWrite { .. } | ForgeError::CorruptArchive(_)
            ),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_mode_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let (temp, root) = sandbox();
        let data = TarTestBuilder::new()
            .add_file_with_mode("run.py", b"", 0o750)
            .build();

        extractor(data).extract_to(&root).unwrap();
        let mode = fs::metadata(temp.path().join("run.py"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_entries_metadata() {
        let data = TarTestBuilder::new()
            .add_file_with_mode("a.py", b"abc", 0o640)
            .add_directory("d/")
            .build();

        let entries = extractor(data).entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].size, 3);
        assert_eq!(entries[0].mode, Some(0o640));
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[1].kind, EntryKind::Directory);
    }

    #[test]
    fn test_format_name() {
        assert_eq!(extractor(Vec::new()).format_name(), "tar");
    }
}
