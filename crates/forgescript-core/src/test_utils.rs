//! Test utilities for bundle creation and executor tests.
//!
//! Provides in-memory tar/zip builders, compression helpers, and
//! [`RecordingHost`], a scripted [`InterpreterHost`] that records every
//! primitive it is asked to perform.
//!
//! # Panics
//!
//! Builder functions panic on I/O errors; they are meant for tests only.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashSet;
use std::fs;
use std::io::Cursor;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crate::ForgeError;
use crate::Result;
use crate::host::CallbackOutcome;
use crate::host::CallbackRequest;
use crate::host::InterpreterHost;
use crate::host::ScriptOutcome;
use crate::host::ScriptRequest;

/// Creates an in-memory TAR archive from `(path, content)` pairs.
///
/// Files are created with mode 0o644.
///
/// # Examples
///
/// ```
/// use forgescript_core::test_utils::create_test_tar;
///
/// let tar_data = create_test_tar(vec![("main.py", b"print(1)"), ("lib/util.py", b"X = 1")]);
/// ```
#[must_use]
pub fn create_test_tar(entries: Vec<(&str, &[u8])>) -> Vec<u8> {
    let mut builder = TarTestBuilder::new();
    for (path, data) in entries {
        builder = builder.add_file(path, data);
    }
    builder.build()
}

/// Creates an in-memory ZIP archive from `(path, content)` pairs.
///
/// Files are stored uncompressed with mode 0o644.
#[must_use]
pub fn create_test_zip(entries: Vec<(&str, &[u8])>) -> Vec<u8> {
    let mut builder = ZipTestBuilder::new();
    for (path, data) in entries {
        builder = builder.add_file(path, data);
    }
    builder.build()
}

/// Creates a single-entry TAR whose name is written verbatim into the header.
///
/// `tar::Builder` refuses names containing `..`; this bypasses that check so
/// traversal handling can be tested.
#[must_use]
pub fn tar_with_raw_name(name: &str, data: &[u8]) -> Vec<u8> {
    tar_with_raw_entries(vec![(name, data)])
}

/// Creates a TAR whose entry names are written verbatim into the headers.
///
/// A name ending in `/` becomes a directory entry. `tar::Builder` strips a
/// leading `./`; this keeps it, the way `tar -C dir .` writes names.
#[must_use]
pub fn tar_with_raw_entries(entries: Vec<(&str, &[u8])>) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());

    for (name, data) in entries {
        let mut header = tar::Header::new_old();
        let bytes = name.as_bytes();
        header.as_old_mut().name[..bytes.len()].copy_from_slice(bytes);
        header.set_size(data.len() as u64);
        if name.ends_with('/') {
            header.set_mode(0o755);
            header.set_entry_type(tar::EntryType::Directory);
        } else {
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
        }
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }

    builder.into_inner().unwrap()
}

/// Gzip-compresses `data`.
#[must_use]
pub fn gzip_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Bzip2-compresses `data`.
#[must_use]
pub fn bzip2_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Xz-compresses `data`.
#[cfg(feature = "xz")]
#[must_use]
pub fn xz_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Zstd-compresses `data`.
#[cfg(feature = "zstd")]
#[must_use]
pub fn zstd_compress(data: &[u8]) -> Vec<u8> {
    zstd::stream::encode_all(data, 3).unwrap()
}

/// Builder for TAR test archives with files, directories and links.
///
/// # Examples
///
/// ```
/// use forgescript_core::test_utils::TarTestBuilder;
///
/// let tar_data = TarTestBuilder::new()
///     .add_file("main.py", b"content")
///     .add_directory("lib/")
///     .add_symlink("link", "main.py")
///     .build();
/// ```
pub struct TarTestBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl TarTestBuilder {
    /// Creates a new TAR test builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    /// Adds a regular file with mode 0o644.
    #[must_use]
    pub fn add_file(self, path: &str, data: &[u8]) -> Self {
        self.add_file_with_mode(path, data, 0o644)
    }

    /// Adds a regular file with a custom mode.
    #[must_use]
    pub fn add_file_with_mode(mut self, path: &str, data: &[u8], mode: u32) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        self.builder.append_data(&mut header, path, data).unwrap();
        self
    }

    /// Adds a directory entry.
    #[must_use]
    pub fn add_directory(mut self, path: &str) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Directory);
        header.set_cksum();
        self.builder
            .append_data(&mut header, path, std::io::empty())
            .unwrap();
        self
    }

    /// Adds a symlink entry.
    #[must_use]
    pub fn add_symlink(self, path: &str, target: &str) -> Self {
        self.add_link(tar::EntryType::Symlink, path, target)
    }

    /// Adds a hardlink entry.
    #[must_use]
    pub fn add_hardlink(self, path: &str, target: &str) -> Self {
        self.add_link(tar::EntryType::Link, path, target)
    }

    fn add_link(mut self, kind: tar::EntryType, path: &str, target: &str) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o777);
        header.set_entry_type(kind);
        header.set_link_name(target).unwrap();
        header.set_cksum();
        self.builder
            .append_data(&mut header, path, std::io::empty())
            .unwrap();
        self
    }

    /// Finishes the archive and returns its bytes.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.builder.into_inner().unwrap()
    }
}

impl Default for TarTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for ZIP test archives.
pub struct ZipTestBuilder {
    zip: zip::ZipWriter<Cursor<Vec<u8>>>,
}

impl ZipTestBuilder {
    /// Creates a new ZIP test builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            zip: zip::ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Adds a stored file with mode 0o644.
    #[must_use]
    pub fn add_file(self, path: &str, data: &[u8]) -> Self {
        self.add_file_with_mode(path, data, 0o644)
    }

    /// Adds a stored file with a custom mode.
    #[must_use]
    pub fn add_file_with_mode(mut self, path: &str, data: &[u8], mode: u32) -> Self {
        use zip::write::SimpleFileOptions;

        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(mode);

        self.zip.start_file(path, options).unwrap();
        self.zip.write_all(data).unwrap();
        self
    }

    /// Adds a directory entry.
    #[must_use]
    pub fn add_directory(mut self, path: &str) -> Self {
        use zip::write::SimpleFileOptions;

        let options = SimpleFileOptions::default().unix_permissions(0o755);
        self.zip.add_directory(path, options).unwrap();
        self
    }

    /// Adds a symlink entry (a stored file whose mode carries `S_IFLNK`).
    #[must_use]
    pub fn add_symlink(mut self, path: &str, target: &str) -> Self {
        use zip::write::SimpleFileOptions;

        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o777);

        self.zip.add_symlink(path, target, options).unwrap();
        self
    }

    /// Finishes the archive and returns its bytes.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.zip.finish().unwrap().into_inner()
    }
}

impl Default for ZipTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Main interpreter state of [`RecordingHost`].
#[derive(Debug)]
pub struct RecordingMain {
    next_id: u64,
}

/// Sub-context of [`RecordingHost`].
#[derive(Debug)]
pub struct RecordingSub {
    /// Unique context id.
    pub id: u64,
    used: bool,
}

#[derive(Debug, Default)]
struct RecordingState {
    mains_created: AtomicUsize,
    mains_destroyed: AtomicUsize,
    subs_created: AtomicUsize,
    subs_destroyed: AtomicUsize,
    affinity_entries: AtomicUsize,
    fail_destroy: AtomicBool,
    fail_create_main: AtomicBool,
    delay_ms: AtomicU64,
    live: Mutex<HashSet<u64>>,
    executed: Mutex<Vec<u64>>,
    lifecycle_threads: Mutex<Vec<String>>,
}

/// Scripted interpreter host for executor tests.
///
/// Instead of running code it scans the script text:
/// - every `register_alias("name"` (single or double quotes) registers `name`
/// - a line starting with `raise ` fails with the rest of that line
///
/// Callbacks succeed for names the script registers and return
/// `{"name": "<alias>", "args": <task args>, "display_params": <command line>}`.
///
/// Clones share their recorded state.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    state: Arc<RecordingState>,
}

impl RecordingHost {
    /// Creates a host with empty records.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `destroy_sub` call fail.
    #[must_use]
    pub fn failing_destroy(self) -> Self {
        self.state.fail_destroy.store(true, Ordering::SeqCst);
        self
    }

    /// Makes `create_main` fail.
    #[must_use]
    pub fn failing_main(self) -> Self {
        self.state.fail_create_main.store(true, Ordering::SeqCst);
        self
    }

    /// Sleeps for `delay` inside every script and callback run.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.state.delay_ms.store(millis, Ordering::SeqCst);
        self
    }

    /// Number of sub-contexts created.
    pub fn subs_created(&self) -> usize {
        self.state.subs_created.load(Ordering::SeqCst)
    }

    /// Number of successful `destroy_sub` calls.
    pub fn subs_destroyed(&self) -> usize {
        self.state.subs_destroyed.load(Ordering::SeqCst)
    }

    /// Number of main interpreters created.
    pub fn mains_created(&self) -> usize {
        self.state.mains_created.load(Ordering::SeqCst)
    }

    /// Number of main interpreters destroyed.
    pub fn mains_destroyed(&self) -> usize {
        self.state.mains_destroyed.load(Ordering::SeqCst)
    }

    /// Number of `with_affinity` entries.
    pub fn affinity_entries(&self) -> usize {
        self.state.affinity_entries.load(Ordering::SeqCst)
    }

    /// Context ids in execution order.
    pub fn executed(&self) -> Vec<u64> {
        self.state.executed.lock().unwrap().clone()
    }

    /// Names of the threads that created or destroyed anything.
    pub fn lifecycle_threads(&self) -> Vec<String> {
        self.state.lifecycle_threads.lock().unwrap().clone()
    }

    /// Returns `true` if no engine primitive was ever invoked.
    pub fn untouched(&self) -> bool {
        self.subs_created() == 0 && self.affinity_entries() == 0
    }

    fn record_thread(&self) {
        let name = thread::current().name().unwrap_or("<unnamed>").to_string();
        self.state.lifecycle_threads.lock().unwrap().push(name);
    }

    fn enter(&self, sub: &mut RecordingSub) {
        assert!(!sub.used, "sub-context {} reused", sub.id);
        assert!(
            self.state.live.lock().unwrap().contains(&sub.id),
            "sub-context {} is not live",
            sub.id
        );
        sub.used = true;
        self.state.executed.lock().unwrap().push(sub.id);

        let delay = self.state.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
    }
}

/// Extracts alias names from `register_alias("name"` calls in `source`.
#[must_use]
pub fn scan_registrations(source: &str) -> Vec<String> {
    const CALL: &str = "register_alias(";

    let mut names = Vec::new();
    let mut rest = source;
    while let Some(idx) = rest.find(CALL) {
        rest = &rest[idx + CALL.len()..];
        let trimmed = rest.trim_start();
        let Some(quote) = trimmed.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        if let Some(end) = trimmed[1..].find(quote) {
            names.push(trimmed[1..=end].to_string());
        }
    }
    names
}

fn scan_raise(source: &str) -> Option<String> {
    source
        .lines()
        .find_map(|line| line.trim_start().strip_prefix("raise "))
        .map(|msg| msg.trim().to_string())
}

impl InterpreterHost for RecordingHost {
    type Main = RecordingMain;
    type Sub = RecordingSub;

    fn create_main(&self) -> Result<RecordingMain> {
        if self.state.fail_create_main.load(Ordering::SeqCst) {
            return Err(ForgeError::Host("main interpreter unavailable".into()));
        }
        self.record_thread();
        self.state.mains_created.fetch_add(1, Ordering::SeqCst);
        Ok(RecordingMain { next_id: 1 })
    }

    fn destroy_main(&self, _main: RecordingMain) -> Result<()> {
        self.record_thread();
        self.state.mains_destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create_sub(&self, main: &mut RecordingMain) -> Result<RecordingSub> {
        self.record_thread();
        let id = main.next_id;
        main.next_id += 1;
        self.state.live.lock().unwrap().insert(id);
        self.state.subs_created.fetch_add(1, Ordering::SeqCst);
        Ok(RecordingSub { id, used: false })
    }

    fn destroy_sub(&self, _main: &mut RecordingMain, sub: RecordingSub) -> Result<()> {
        self.record_thread();
        let removed = self.state.live.lock().unwrap().remove(&sub.id);
        assert!(removed, "sub-context {} destroyed twice", sub.id);

        if self.state.fail_destroy.load(Ordering::SeqCst) {
            return Err(ForgeError::Host(format!(
                "could not end sub-interpreter {}",
                sub.id
            )));
        }
        self.state.subs_destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn with_affinity<R>(&self, f: impl FnOnce() -> R) -> R {
        self.state.affinity_entries.fetch_add(1, Ordering::SeqCst);
        f()
    }

    fn run_script(&self, sub: &mut RecordingSub, request: &ScriptRequest) -> ScriptOutcome {
        self.enter(sub);
        let source = match fs::read_to_string(&request.path) {
            Ok(source) => source,
            Err(e) => return ScriptOutcome::failed(e.to_string()),
        };

        match scan_raise(&source) {
            Some(message) => ScriptOutcome::failed(message),
            None => ScriptOutcome::ok(scan_registrations(&source)),
        }
    }

    fn run_callback(&self, sub: &mut RecordingSub, request: &CallbackRequest) -> CallbackOutcome {
        self.enter(sub);
        let source = match fs::read_to_string(&request.path) {
            Ok(source) => source,
            Err(e) => return CallbackOutcome::failed(e.to_string()),
        };

        if let Some(message) = scan_raise(&source) {
            return CallbackOutcome::failed(message);
        }
        if !scan_registrations(&source).contains(&request.alias_name) {
            return CallbackOutcome::failed(
                "could not find script registered alias callback function",
            );
        }

        let task: serde_json::Value = match serde_json::from_str(&request.task_json) {
            Ok(task) => task,
            Err(e) => return CallbackOutcome::failed(e.to_string()),
        };
        let result = serde_json::json!({
            "name": request.alias_name,
            "args": task.get("args").cloned().unwrap_or_default(),
            "display_params": task.get("command_line").cloned().unwrap_or_default(),
        });
        CallbackOutcome::ok(result.to_string())
    }
}
