//! Bundle extraction and embedded-interpreter execution for operator scripts.
//!
//! `forgescript-core` takes an opaque uploaded archive (a "bundle"), detects
//! its format from content, unwraps any compression envelopes, and extracts
//! it into a sandboxed directory without permitting path escape. Scripts from
//! the bundle then run inside an embedded interpreter through a single
//! [`Executor`] loop that owns the process-wide interpreter and hands out
//! isolated sub-contexts to concurrent callers.
//!
//! The interpreter itself is abstracted by [`InterpreterHost`]; the Python
//! implementation lives in the `forgescript-python` crate.
//!
//! # Examples
//!
//! ```no_run
//! use forgescript_core::ExtractionConfig;
//! use forgescript_core::extract_bundle;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("bundle.tar.gz")?;
//! let config = ExtractionConfig::default();
//! let paths = extract_bundle(&bytes, "/run/user/1000/forgescript/42", &config)?;
//! println!("Extracted {} files", paths.len());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod bundle;
pub mod command;
pub mod config;
pub mod copy;
pub mod error;
pub mod executor;
pub mod formats;
pub mod host;
pub mod loader;
pub mod paths;
pub mod payload;
pub mod report;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export main API types
pub use api::extract_bundle;
pub use api::extract_bundle_with_report;
pub use api::list_bundle;
pub use bundle::BundleHandle;
pub use bundle::Extractor;
pub use bundle::resolve_extractor;
pub use command::CommandDefinition;
pub use config::ExecutorConfig;
pub use config::ExtractionConfig;
pub use error::ForgeError;
pub use error::QuotaResource;
pub use error::Result;
pub use executor::Executor;
pub use executor::ExecutorHandle;
pub use executor::ExecutorStats;
pub use executor::SubContext;
pub use formats::BundleExtractor;
pub use formats::Format;
pub use host::CommandSink;
pub use host::FileSink;
pub use host::InterpreterHost;
pub use host::MemorySink;
pub use loader::BundleLoader;
pub use loader::LoadReport;
pub use loader::LoadTask;
pub use paths::RuntimePaths;
pub use payload::AliasCommand;
pub use payload::AliasTask;
pub use report::ExtractionReport;

// Re-export types module for easier access
pub use types::ArchiveEntry;
pub use types::EntryKind;
pub use types::SafePath;
pub use types::SandboxRoot;
