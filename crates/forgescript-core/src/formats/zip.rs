//! ZIP container extractor.

use std::io::Cursor;
use std::io::Read;
use std::io::Seek;

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

/// File type mask and symlink type from `st_mode`.
const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

/// Extractor for a ZIP archive held in memory.
#[derive(Debug, Clone)]
pub struct ZipExtractor {
    data: Vec<u8>,
    config: ExtractionConfig,
}

impl ZipExtractor {
    /// Wraps raw ZIP bytes.
    #[must_use]
    pub fn new(data: Vec<u8>, config: ExtractionConfig) -> Self {
        Self { data, config }
    }

    /// Returns the raw ZIP bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn archive(&self) -> Result<zip::ZipArchive<Cursor<&[u8]>>> {
        zip::ZipArchive::new(Cursor::new(self.data.as_slice()))
            .map_err(|e| ForgeError::CorruptArchive(format!("failed to open ZIP archive: {e}")))
    }
}

impl BundleExtractor for ZipExtractor {
    fn entries(&self) -> Result<Vec<ArchiveEntry>> {
        let mut archive = self.archive()?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let file = archive.by_index_raw(i).map_err(entry_error)?;
            entries.push(ArchiveEntry {
                path: file.name().to_string(),
                size: file.size(),
                mode: file.unix_mode(),
                kind: kind_of(&file),
            });
        }

        Ok(entries)
    }

    /// Non-directory entry names in archive order.
    fn list_paths(&self) -> Result<Vec<String>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.kind != EntryKind::Directory)
            .map(|e| e.path)
            .collect())
    }

    fn extract_to(&self, root: &SandboxRoot) -> Result<ExtractionReport> {
        let mut archive = self.archive()?;
        let mut writer = SandboxedWriter::new(root, &self.config);

        for i in 0..archive.len() {
            let mut file = archive.by_index(i).map_err(entry_error)?;
            let name = file.name().to_string();

            match kind_of(&file) {
                EntryKind::File => {
                    let size = file.size();
                    let mode = file.unix_mode();
                    writer.write_file(&name, &mut file, size, mode)?;
                }
                EntryKind::Directory => writer.write_dir(&name)?,
                kind => writer.skip(&name, kind),
            }
        }

        let report = writer.finish();
        info!(
            format = "zip",
            files = report.files_extracted,
            bytes = report.bytes_written,
            root = %root.as_path().display(),
            "extracted bundle"
        );
        Ok(report)
    }

    fn format_name(&self) -> &'static str {
        "zip"
    }
}

fn kind_of<R: Read + Seek>(file: &zip::read::ZipFile<'_, R>) -> EntryKind {
    if file.is_dir() {
        EntryKind::Directory
    } else if file.unix_mode().is_some_and(|m| m & S_IFMT == S_IFLNK) {
        EntryKind::Symlink
    } else {
        EntryKind::File
    }
}

fn entry_error(e: zip::result::ZipError) -> ForgeError {
    ForgeError::CorruptArchive(format!("failed to read ZIP entry: {e}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_utils::ZipTestBuilder;
    use crate::test_utils::create_test_zip;
    use std::fs;
    use tempfile::TempDir;

    fn extractor(data: Vec<u8>) -> ZipExtractor {
        ZipExtractor::new(data, ExtractionConfig::default())
    }

    fn sandbox() -> (TempDir, SandboxRoot) {
        let temp = TempDir::new().expect("failed to create temp dir");
        let root = SandboxRoot::new(temp.path()).expect("root should be valid");
        (temp, root)
    }

    #[test]
    fn test_list_paths_in_archive_order() {
        let data = create_test_zip(vec![
            ("file.py", b""),
            ("subdir/file.py", b""),
            ("subdir/deeper/file.py", b""),
        ]);
        assert_eq!(
            extractor(data).list_paths().unwrap(),
            vec!["file.py", "subdir/file.py", "subdir/deeper/file.py"]
        );
    }

    #[test]
    fn test_list_paths_skips_directories() {
        let data = ZipTestBuilder::new()
            .add_directory("pkg/")
            .add_file("pkg/mod.py", b"")
            .build();
        assert_eq!(extractor(data).list_paths().unwrap(), vec!["pkg/mod.py"]);
    }

    #[test]
    fn test_extract_writes_content() {
        let (temp, root) = sandbox();
        let data = create_test_zip(vec![
            ("forgescript_alias.py", b"register_alias('whoami', cb)"),
            ("lib/util.py", b"X = 1"),
        ]);

        let report = extractor(data).extract_to(&root).unwrap();

        assert_eq!(
            fs::read(temp.path().join("forgescript_alias.py")).unwrap(),
            b"register_alias('whoami', cb)"
        );
        assert_eq!(fs::read(temp.path().join("lib/util.py")).unwrap(), b"X = 1");
        assert_eq!(report.files_extracted, 2);
        assert_eq!(report.directories_created, 1);
    }

    #[test]
    fn test_extract_deflated_entry() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let (temp, root) = sandbox();
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        zip.start_file("big.py", options).unwrap();
        zip.write_all(&[b'#'; 10_000]).unwrap();
        let data = zip.finish().unwrap().into_inner();

        extractor(data).extract_to(&root).unwrap();
        assert_eq!(fs::read(temp.path().join("big.py")).unwrap().len(), 10_000);
    }

    #[test]
    #[cfg(unix)]
    fn test_extract_preserves_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (temp, root) = sandbox();
        let data = ZipTestBuilder::new()
            .add_file_with_mode("tool.py", b"", 0o755)
            .build();

        extractor(data).extract_to(&root).unwrap();
        let mode = fs::metadata(temp.path().join("tool.py"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_extract_rejects_traversal() {
        let (temp, root) = sandbox();
        let data = create_test_zip(vec![("../escape.py", b"boom")]);

        let err = extractor(data).extract_to(&root).unwrap_err();
        assert!(matches!(
            &err,
            ForgeError::PathTraversal { entry } if entry == "../escape.py"
        ));
        assert!(!temp.path().parent().unwrap().join("escape.py").exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_entry_skipped() {
        let (temp, root) = sandbox();
        let data = ZipTestBuilder::new()
            .add_symlink("link.py", "/etc/passwd")
            .add_file("real.py", b"x")
            .build();

        let report = extractor(data).extract_to(&root).unwrap();
        assert_eq!(report.entries_skipped, 1);
        assert!(fs::symlink_metadata(temp.path().join("link.py")).is_err());
    }

    #[test]
    fn test_corrupt_zip() {
        let err = extractor(b"PK\x03\x04garbage".to_vec()).list_paths().unwrap_err();
        assert!(matches!(err, ForgeError::CorruptArchive(_)));
    }

    #[test]
    fn test_empty_zip_lists_nothing() {
        let data = create_test_zip(vec![]);
        assert!(extractor(data).list_paths().unwrap().is_empty());
    }
}
