//! CPython interpreter host for forgescript.
//!
//! [`PythonHost`] implements [`InterpreterHost`](forgescript_core::InterpreterHost)
//! on top of the embedded CPython runtime. Bundle scripts see a `forgescript`
//! module with the alias registration API:
//!
//! ```python
//! import forgescript
//!
//! def whoami(task):
//!     bof = forgescript.register_file(f"bin/whoami.{task.callback.architecture}.o")
//!     return forgescript.AliasedCommand("execute_coff", args={"bof_file": bof})
//!
//! forgescript.register_alias("whoami", whoami, description="Print the current user")
//! ```
//!
//! Command definitions and uploaded files leave the interpreter through the
//! [`CommandSink`](forgescript_core::CommandSink) and
//! [`FileSink`](forgescript_core::FileSink) the host was built with.

mod error;
mod host;
mod importer;
mod module;
mod state;
mod types;

pub use error::ForgeScriptError;
pub use error::SecurityViolationError;
pub use host::MISSING_CALLBACK;
pub use host::PythonHost;
pub use host::PythonMain;
pub use host::PythonSub;
