//! Interface to an embedded interpreter.
//!
//! [`InterpreterHost`] exposes the primitives the [`Executor`](crate::Executor)
//! needs: one main interpreter per loop, isolated sub-contexts derived from it,
//! a thread-affinity lock, and two entry points (run a script, run a
//! registered alias callback). Engine errors cross this boundary as strings.
//!
//! Outbound effects of a script (new command definitions and uploaded files)
//! go through [`CommandSink`] and [`FileSink`].

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::Result;

/// Inputs for running a bundle script in a fresh sub-context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRequest {
    /// Absolute path of the script inside the extracted bundle.
    pub path: PathBuf,
    /// Callback the aliases are registered for.
    pub callback_id: i64,
    /// Task that requested the load.
    pub task_id: i64,
    /// Operator name, used as the default alias author.
    pub operator: String,
}

/// Inputs for invoking a registered alias callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    /// Script that registered the alias.
    pub path: PathBuf,
    /// Task that invoked the alias.
    pub task_id: i64,
    /// Alias whose callback is invoked.
    pub alias_name: String,
    /// Serialized [`AliasTask`](crate::AliasTask).
    pub task_json: String,
}

/// Result of a script run as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// Alias names in registration order, duplicates kept.
    pub registered: Vec<String>,
    /// Engine error message, if the script raised.
    pub error: Option<String>,
}

impl ScriptOutcome {
    /// Successful outcome with the given registrations.
    #[must_use]
    pub fn ok(registered: Vec<String>) -> Self {
        Self {
            registered,
            error: None,
        }
    }

    /// Failed outcome carrying the engine message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            registered: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Result of an alias callback run as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackOutcome {
    /// JSON text of the returned command.
    pub result: String,
    /// Engine error message, if the callback raised.
    pub error: Option<String>,
}

impl CallbackOutcome {
    /// Successful outcome with the given JSON result.
    #[must_use]
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            error: None,
        }
    }

    /// Failed outcome carrying the engine message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            result: String::new(),
            error: Some(message.into()),
        }
    }
}

/// An embedded interpreter driven by the executor loop.
///
/// `create_main`, `destroy_main`, `create_sub` and `destroy_sub` are only ever
/// called on the loop thread. `run_script` and `run_callback` are called on
/// caller threads, inside [`with_affinity`](Self::with_affinity), with a
/// sub-context that no other thread is using.
pub trait InterpreterHost: Send + Sync + 'static {
    /// Process-wide interpreter state owned by the loop.
    type Main;

    /// Isolated execution context handed to one caller at a time.
    type Sub: Send;

    /// Creates the main interpreter.
    fn create_main(&self) -> Result<Self::Main>;

    /// Tears down the main interpreter after the loop drained.
    fn destroy_main(&self, main: Self::Main) -> Result<()>;

    /// Derives a fresh sub-context from the main interpreter.
    fn create_sub(&self, main: &mut Self::Main) -> Result<Self::Sub>;

    /// Destroys a sub-context.
    fn destroy_sub(&self, main: &mut Self::Main, sub: Self::Sub) -> Result<()>;

    /// Runs `f` while holding the engine's thread-affinity lock.
    fn with_affinity<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }

    /// Executes a script and collects its alias registrations.
    fn run_script(&self, sub: &mut Self::Sub, request: &ScriptRequest) -> ScriptOutcome;

    /// Executes a script, then invokes the callback it registered for
    /// `request.alias_name`.
    fn run_callback(&self, sub: &mut Self::Sub, request: &CallbackRequest) -> CallbackOutcome;
}

/// Receives command definitions produced by `register_alias`.
pub trait CommandSink: Send + Sync {
    /// Publishes one command definition (JSON) for `callback_id`.
    fn create_command(
        &self,
        script_path: &str,
        callback_id: i64,
        task_id: i64,
        command_json: &str,
    ) -> Result<()>;
}

/// Receives files uploaded by `register_file`.
pub trait FileSink: Send + Sync {
    /// Stores `data` and returns an identifier the script can hand back to the
    /// operator framework.
    fn register_file(
        &self,
        task_id: i64,
        file_name: &str,
        data: &[u8],
        delete_after_fetch: bool,
    ) -> Result<String>;
}

/// A command definition captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    /// Script that registered the command.
    pub script_path: String,
    /// Callback the command targets.
    pub callback_id: i64,
    /// Task that registered it.
    pub task_id: i64,
    /// JSON definition.
    pub command_json: String,
}

/// A file captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFile {
    /// Identifier returned to the script.
    pub id: String,
    /// Base file name.
    pub file_name: String,
    /// File contents.
    pub data: Vec<u8>,
    /// Whether the file is transient (registered during an alias callback).
    pub delete_after_fetch: bool,
}

/// In-memory [`CommandSink`] and [`FileSink`] for standalone runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    commands: Mutex<Vec<RecordedCommand>>,
    files: Mutex<Vec<RecordedFile>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every command recorded so far.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns every file recorded so far.
    pub fn files(&self) -> Vec<RecordedFile> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandSink for MemorySink {
    fn create_command(
        &self,
        script_path: &str,
        callback_id: i64,
        task_id: i64,
        command_json: &str,
    ) -> Result<()> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCommand {
                script_path: script_path.to_string(),
                callback_id,
                task_id,
                command_json: command_json.to_string(),
            });
        Ok(())
    }
}

impl FileSink for MemorySink {
    fn register_file(
        &self,
        task_id: i64,
        file_name: &str,
        data: &[u8],
        delete_after_fetch: bool,
    ) -> Result<String> {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        let id = format!("local-{task_id}-{}", files.len() + 1);
        files.push(RecordedFile {
            id: id.clone(),
            file_name: file_name.to_string(),
            data: data.to_vec(),
            delete_after_fetch,
        });
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let ok = ScriptOutcome::ok(vec!["whoami".into()]);
        assert!(ok.error.is_none());
        assert_eq!(ok.registered, vec!["whoami"]);

        let failed = CallbackOutcome::failed("boom");
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.result.is_empty());
    }

    #[test]
    fn test_memory_sink_records_commands() {
        let sink = MemorySink::new();
        sink.create_command("/tmp/a.py", 3, 7, r#"{"name":"whoami"}"#)
            .unwrap();

        let commands = sink.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].callback_id, 3);
        assert_eq!(commands[0].command_json, r#"{"name":"whoami"}"#);
    }

    #[test]
    fn test_memory_sink_file_ids_are_unique() {
        let sink = MemorySink::new();
        let a = sink.register_file(1, "a.o", b"a", false).unwrap();
        let b = sink.register_file(1, "b.o", b"b", true).unwrap();

        assert_ne!(a, b);
        let files = sink.files();
        assert_eq!(files[1].file_name, "b.o");
        assert!(files[1].delete_after_fetch);
    }
}
