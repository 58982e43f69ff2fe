//! Single-threaded owner of the embedded interpreter.
//!
//! The [`Executor`] loop is the only place the main interpreter lives. Every
//! state-changing interaction with it (creating and destroying sub-contexts)
//! is a boxed closure sent over one FIFO queue and run on the loop thread.
//! Callers hold an [`ExecutorHandle`]; each request borrows a fresh
//! [`SubContext`], runs the script on the caller's own thread under the host's
//! affinity lock, and drops the context, which queues its destruction without
//! waiting for it.
//!
//! ```text
//! caller A ──create──▶ ┌──────────────┐
//! caller B ──create──▶ │  job queue   │──▶ loop thread (owns Main)
//! ctx drop ──destroy─▶ └──────────────┘
//! ```

mod context;
mod stats;

use std::fs;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::SendError;
use crossbeam_channel::Sender;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

pub use context::SubContext;
pub use stats::ExecutorStats;

use context::thread_name;
use stats::StatsCounters;

use crate::ExecutorConfig;
use crate::ForgeError;
use crate::Result;
use crate::host::CallbackRequest;
use crate::host::InterpreterHost;
use crate::host::ScriptRequest;
use crate::payload::AliasCommand;
use crate::payload::AliasTask;

/// Work item run on the loop thread with exclusive access to the main
/// interpreter.
pub(crate) type Job<H> = Box<dyn FnOnce(&H, &mut <H as InterpreterHost>::Main) + Send>;

/// The interpreter loop.
///
/// Created together with its first [`ExecutorHandle`] by [`Executor::new`].
/// The loop runs until every handle (and every outstanding [`SubContext`]) is
/// dropped, then drains the queue and destroys the main interpreter.
pub struct Executor<H: InterpreterHost> {
    host: Arc<H>,
    config: ExecutorConfig,
    receiver: Receiver<Job<H>>,
}

impl<H: InterpreterHost> Executor<H> {
    /// Creates a loop and a handle connected to it.
    ///
    /// Requests sent before the loop starts are queued.
    pub fn new(host: H, config: ExecutorConfig) -> (Self, ExecutorHandle<H>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let host = Arc::new(host);

        let handle = ExecutorHandle {
            host: Arc::clone(&host),
            sender,
            config: Arc::new(config.clone()),
            stats: Arc::new(StatsCounters::default()),
            next_id: Arc::new(AtomicU64::new(0)),
        };

        (
            Self {
                host,
                config,
                receiver,
            },
            handle,
        )
    }

    /// Creates a loop on a dedicated thread named after
    /// `ExecutorConfig::thread_name`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the thread cannot be spawned.
    pub fn start(
        host: H,
        config: ExecutorConfig,
    ) -> Result<(ExecutorHandle<H>, JoinHandle<Result<()>>)> {
        let (executor, handle) = Self::new(host, config);
        let join = executor.spawn()?;
        Ok((handle, join))
    }

    /// Runs the loop on a new named thread.
    pub fn spawn(self) -> Result<JoinHandle<Result<()>>> {
        let name = self.config.thread_name.clone();
        thread::Builder::new()
            .name(name)
            .spawn(move || self.run())
            .map_err(ForgeError::Io)
    }

    /// Runs the loop on the current thread.
    ///
    /// Creates the main interpreter, serves jobs in FIFO order until all
    /// senders are gone, then destroys the main interpreter.
    ///
    /// # Errors
    ///
    /// Returns the host error if the main interpreter cannot be created or
    /// destroyed. Pending and future requests then fail with
    /// `ExecutorUnavailable`.
    pub fn run(self) -> Result<()> {
        let Self { host, receiver, .. } = self;

        let mut main = host.create_main().inspect_err(|e| {
            error!(error = %e, "could not create main interpreter");
        })?;
        info!(thread = thread_name().as_str(), "interpreter loop started");

        for job in &receiver {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| job(&host, &mut main)));
            if outcome.is_err() {
                error!("interpreter loop job panicked");
            }
        }

        info!("interpreter loop stopped; destroying main interpreter");
        host.destroy_main(main)
    }
}

/// Cloneable client of an [`Executor`] loop.
pub struct ExecutorHandle<H: InterpreterHost> {
    host: Arc<H>,
    sender: Sender<Job<H>>,
    config: Arc<ExecutorConfig>,
    stats: Arc<StatsCounters>,
    next_id: Arc<AtomicU64>,
}

impl<H: InterpreterHost> Clone for ExecutorHandle<H> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            sender: self.sender.clone(),
            config: Arc::clone(&self.config),
            stats: Arc::clone(&self.stats),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<H: InterpreterHost> ExecutorHandle<H> {
    /// Runs a bundle script in a fresh sub-context and returns the alias
    /// names it registered, in order.
    ///
    /// # Errors
    ///
    /// - `NotFound` / `IsDirectory` before any engine interaction
    /// - `ScriptError` with the engine message if the script raised
    /// - `Timeout` if an execution timeout is configured and expires
    /// - `ExecutorUnavailable` if the loop is gone
    pub fn run_script(
        &self,
        path: impl AsRef<Path>,
        callback_id: i64,
        task_id: i64,
        operator: &str,
    ) -> Result<Vec<String>> {
        let path = validate_script_path(path.as_ref())?;
        let ctx = self.create_context()?;
        let context = ctx.id();

        debug!(context, script = %path.display(), task_id, "running script");
        let request = ScriptRequest {
            path,
            callback_id,
            task_id,
            operator: operator.to_string(),
        };
        let outcome = self.execute(ctx, move |host, sub| host.run_script(sub, &request))?;

        if let Some(message) = outcome.error {
            error!(context, task_id, error = %message, "script raised");
            return Err(ForgeError::ScriptError(message));
        }

        Ok(outcome.registered)
    }

    /// Re-runs the script that registered `alias_name` and invokes its
    /// callback with `task_json`, returning the callback's JSON result.
    ///
    /// # Errors
    ///
    /// Same as [`run_script`](Self::run_script), with engine failures
    /// reported as `CallbackError`.
    pub fn run_alias_callback(
        &self,
        path: impl AsRef<Path>,
        task_id: i64,
        alias_name: &str,
        task_json: &str,
    ) -> Result<String> {
        let path = validate_script_path(path.as_ref())?;
        let ctx = self.create_context()?;
        let context = ctx.id();

        debug!(context, alias = alias_name, task_id, "running alias callback");
        let request = CallbackRequest {
            path,
            task_id,
            alias_name: alias_name.to_string(),
            task_json: task_json.to_string(),
        };
        let outcome = self.execute(ctx, move |host, sub| host.run_callback(sub, &request))?;

        if let Some(message) = outcome.error {
            error!(context, alias = alias_name, error = %message, "alias callback raised");
            return Err(ForgeError::CallbackError(message));
        }

        Ok(outcome.result)
    }

    /// Serializes `task`, runs the alias callback, and decodes its result.
    pub fn run_alias_task(
        &self,
        path: impl AsRef<Path>,
        task_id: i64,
        alias_name: &str,
        task: &AliasTask,
    ) -> Result<AliasCommand> {
        let task_json = task.to_json()?;
        let result = self.run_alias_callback(path, task_id, alias_name, &task_json)?;
        debug!(command_json = %result, "received alias command");
        AliasCommand::from_json(&result)
    }

    /// Requests a new sub-context from the loop and waits for it.
    ///
    /// # Errors
    ///
    /// Returns the host error, or `ExecutorUnavailable` if the loop is gone.
    pub fn create_context(&self) -> Result<SubContext<H>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let stats = Arc::clone(&self.stats);
        let (tx, rx) = crossbeam_channel::bounded::<Result<H::Sub>>(1);

        let job: Job<H> = Box::new(move |host, main| match host.create_sub(main) {
            Ok(sub) => {
                stats.created();
                debug!(
                    thread = thread_name().as_str(),
                    context = id,
                    "created sub-context"
                );
                // The requester vanished; tear the context down right here.
                if let Err(SendError(Ok(sub))) = tx.send(Ok(sub)) {
                    stats.scheduled();
                    let result = host.destroy_sub(main, sub);
                    if let Err(e) = &result {
                        warn!(context = id, error = %e, "sub-context teardown failed");
                    }
                    stats.destroyed(result.is_ok());
                }
            }
            Err(e) => {
                warn!(context = id, error = %e, "could not create sub-context");
                let _ = tx.send(Err(e));
            }
        });

        self.sender
            .send(job)
            .map_err(|_| ForgeError::ExecutorUnavailable)?;
        let sub = rx.recv().map_err(|_| ForgeError::ExecutorUnavailable)??;

        Ok(SubContext::new(
            id,
            sub,
            self.sender.clone(),
            Arc::clone(&self.stats),
        ))
    }

    /// Waits until every job queued before this call has run.
    ///
    /// Useful to observe teardown of contexts dropped earlier.
    pub fn flush(&self) -> Result<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.sender
            .send(Box::new(move |_, _| {
                let _ = tx.send(());
            }))
            .map_err(|_| ForgeError::ExecutorUnavailable)?;
        rx.recv().map_err(|_| ForgeError::ExecutorUnavailable)
    }

    /// Returns sub-context lifecycle counters.
    #[must_use]
    pub fn stats(&self) -> ExecutorStats {
        self.stats.snapshot()
    }

    /// Returns the host this loop drives.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Runs `f` against the context's sub-interpreter under the affinity
    /// lock, honoring the execution timeout.
    fn execute<T, F>(&self, mut ctx: SubContext<H>, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&H, &mut H::Sub) -> T + Send + 'static,
    {
        let Some(timeout) = self.config.execution_timeout else {
            let host = &*self.host;
            return Ok(host.with_affinity(|| f(host, ctx.get_mut())));
        };

        let context = ctx.id();
        let host = Arc::clone(&self.host);
        let (tx, rx) = crossbeam_channel::bounded(1);

        thread::Builder::new()
            .name(format!("{}-ctx-{context}", self.config.thread_name))
            .spawn(move || {
                let mut ctx = ctx;
                let out = host.with_affinity(|| f(&host, ctx.get_mut()));
                let _ = tx.send(out);
            })
            .map_err(ForgeError::Io)?;

        match rx.recv_timeout(timeout) {
            Ok(out) => Ok(out),
            Err(RecvTimeoutError::Timeout) => {
                warn!(context, ?timeout, "execution timed out; context released on completion");
                Err(ForgeError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(ForgeError::Host(format!(
                "execution thread for context {context} exited without a result"
            ))),
        }
    }
}

/// Rejects missing paths and directories before the engine is involved.
fn validate_script_path(path: &Path) -> Result<PathBuf> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Err(ForgeError::IsDirectory(path.to_path_buf())),
        Ok(_) => Ok(std::path::absolute(path)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(ForgeError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(ForgeError::Io(e)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingHost;
    use std::collections::HashSet;
    use std::time::Duration;
    use std::time::Instant;
    use tempfile::TempDir;

    const ALIAS_SCRIPT: &str = r#"
import forgescript

def whoami(task):
    return forgescript.AliasedCommand("execute_coff")

forgescript.register_alias("whoami", whoami)
forgescript.register_alias("ls", whoami)
forgescript.register_alias("whoami", whoami)
"#;

    fn start(host: RecordingHost, config: ExecutorConfig) -> ExecutorHandle<RecordingHost> {
        let (handle, _join) = Executor::start(host, config).expect("executor should start");
        handle
    }

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_run_script_returns_registrations_in_order() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "forgescript_alias.py", ALIAS_SCRIPT);
        let handle = start(RecordingHost::new(), ExecutorConfig::default());

        let aliases = handle.run_script(&script, 1, 2, "operator").unwrap();
        assert_eq!(aliases, vec!["whoami", "ls", "whoami"]);

        handle.flush().unwrap();
        let stats = handle.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.destroyed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_directory_is_rejected_before_engine() {
        let temp = TempDir::new().unwrap();
        let host = RecordingHost::new();
        let handle = start(host.clone(), ExecutorConfig::default());

        let err = handle.run_script(temp.path(), 1, 1, "op").unwrap_err();
        assert!(matches!(err, ForgeError::IsDirectory(_)));

        let err = handle
            .run_alias_callback(temp.path(), 1, "whoami", "{}")
            .unwrap_err();
        assert!(matches!(err, ForgeError::IsDirectory(_)));

        handle.flush().unwrap();
        assert!(host.untouched());
    }

    #[test]
    fn test_missing_script_is_not_found() {
        let temp = TempDir::new().unwrap();
        let host = RecordingHost::new();
        let handle = start(host.clone(), ExecutorConfig::default());

        let err = handle
            .run_script(temp.path().join("missing.py"), 1, 1, "op")
            .unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(_)));
        assert!(host.untouched());
    }

    #[test]
    fn test_script_error_is_passed_through() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "bad.py", "raise NameError: name 'x' is not defined\n");
        let handle = start(RecordingHost::new(), ExecutorConfig::default());

        let err = handle.run_script(&script, 1, 1, "op").unwrap_err();
        assert_eq!(err.to_string(), "NameError: name 'x' is not defined");
        assert!(matches!(err, ForgeError::ScriptError(_)));

        handle.flush().unwrap();
        assert_eq!(handle.stats().destroyed, 1);
    }

    #[test]
    fn test_concurrent_scripts_get_distinct_contexts() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "forgescript_alias.py", ALIAS_SCRIPT);
        let host = RecordingHost::new().with_delay(Duration::from_millis(20));
        let handle = start(host.clone(), ExecutorConfig::default());

        let workers: Vec<_> = (0..8)
            .map(|task_id| {
                let handle = handle.clone();
                let script = script.clone();
                thread::spawn(move || handle.run_script(&script, 1, task_id, "op"))
            })
            .collect();

        for worker in workers {
            assert_eq!(worker.join().unwrap().unwrap().len(), 3);
        }

        let executed = host.executed();
        assert_eq!(executed.len(), 8);
        assert_eq!(executed.iter().collect::<HashSet<_>>().len(), 8);

        handle.flush().unwrap();
        assert_eq!(host.subs_destroyed(), 8);
        assert_eq!(handle.stats().live(), 0);
    }

    #[test]
    fn test_lifecycle_runs_on_loop_thread() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "a.py", ALIAS_SCRIPT);
        let host = RecordingHost::new();
        let config = ExecutorConfig {
            thread_name: "loop-under-test".into(),
            ..Default::default()
        };
        let handle = start(host.clone(), config);

        handle.run_script(&script, 1, 1, "op").unwrap();
        handle.flush().unwrap();

        let threads = host.lifecycle_threads();
        assert!(!threads.is_empty());
        assert!(threads.iter().all(|t| t == "loop-under-test"));
        assert_eq!(host.affinity_entries(), 1);
    }

    #[test]
    fn test_destroy_failure_does_not_fail_request() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "a.py", ALIAS_SCRIPT);
        let handle = start(RecordingHost::new().failing_destroy(), ExecutorConfig::default());

        assert!(handle.run_script(&script, 1, 1, "op").is_ok());
        assert!(handle.run_script(&script, 1, 2, "op").is_ok());

        handle.flush().unwrap();
        let stats = handle.stats();
        assert_eq!(stats.destroy_failures, 2);
        assert_eq!(stats.destroyed, 0);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_dropped_context_is_destroyed() {
        let host = RecordingHost::new();
        let handle = start(host.clone(), ExecutorConfig::default());

        let result: Result<()> = (|| {
            let _ctx = handle.create_context()?;
            Err(ForgeError::Host("caller failed mid-request".into()))
        })();
        assert!(result.is_err());

        handle.flush().unwrap();
        assert_eq!(host.subs_created(), 1);
        assert_eq!(host.subs_destroyed(), 1);
    }

    #[test]
    fn test_timeout_releases_context_later() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "slow.py", ALIAS_SCRIPT);
        let host = RecordingHost::new().with_delay(Duration::from_millis(300));
        let config = ExecutorConfig::default().with_timeout(Duration::from_millis(50));
        let handle = start(host.clone(), config);

        let err = handle.run_script(&script, 1, 1, "op").unwrap_err();
        assert!(matches!(err, ForgeError::Timeout(d) if d == Duration::from_millis(50)));

        wait_for(|| handle.stats().destroyed == 1);
        assert_eq!(host.subs_destroyed(), 1);
        assert_eq!(handle.stats().pending, 0);
    }

    #[test]
    fn test_timeout_not_hit() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "a.py", ALIAS_SCRIPT);
        let config = ExecutorConfig::default().with_timeout(Duration::from_secs(10));
        let handle = start(RecordingHost::new(), config);

        assert_eq!(handle.run_script(&script, 1, 1, "op").unwrap().len(), 3);
    }

    #[test]
    fn test_alias_callback_result() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "a.py", ALIAS_SCRIPT);
        let handle = start(RecordingHost::new(), ExecutorConfig::default());

        let json = handle
            .run_alias_callback(&script, 5, "ls", r#"{"args":{"path":"/"},"command_line":"/"}"#)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["name"], "ls");
        assert_eq!(value["args"]["path"], "/");
    }

    #[test]
    fn test_alias_callback_missing() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "a.py", ALIAS_SCRIPT);
        let handle = start(RecordingHost::new(), ExecutorConfig::default());

        let err = handle
            .run_alias_callback(&script, 5, "nope", "{}")
            .unwrap_err();
        assert!(matches!(err, ForgeError::CallbackError(_)));
        assert_eq!(
            err.to_string(),
            "could not find script registered alias callback function"
        );
    }

    #[test]
    fn test_run_alias_task_decodes_command() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "a.py", ALIAS_SCRIPT);
        let handle = start(RecordingHost::new(), ExecutorConfig::default());

        let mut task = AliasTask {
            command_line: "-v".into(),
            ..Default::default()
        };
        task.args.insert("verbose".into(), serde_json::Value::Bool(true));

        let command = handle.run_alias_task(&script, 9, "whoami", &task).unwrap();
        assert_eq!(command.name, "whoami");
        assert_eq!(command.display_params, "-v");
        assert_eq!(command.args["verbose"], true);
    }

    #[test]
    fn test_loop_stops_when_handles_drop() {
        let host = RecordingHost::new();
        let (handle, join) = Executor::start(host.clone(), ExecutorConfig::default()).unwrap();

        let ctx = handle.create_context().unwrap();
        drop(handle);
        // The outstanding context keeps the loop alive until it is released.
        drop(ctx);

        join.join().unwrap().unwrap();
        assert_eq!(host.mains_created(), 1);
        assert_eq!(host.mains_destroyed(), 1);
        assert_eq!(host.subs_destroyed(), 1);
    }

    #[test]
    fn test_unavailable_when_main_fails() {
        let temp = TempDir::new().unwrap();
        let script = write_script(&temp, "a.py", ALIAS_SCRIPT);
        let (handle, join) =
            Executor::start(RecordingHost::new().failing_main(), ExecutorConfig::default())
                .unwrap();

        assert!(matches!(join.join().unwrap(), Err(ForgeError::Host(_))));
        let err = handle.run_script(&script, 1, 1, "op").unwrap_err();
        assert!(matches!(err, ForgeError::ExecutorUnavailable));
    }

    #[test]
    fn test_run_on_current_thread() {
        let host = RecordingHost::new();
        let (executor, handle) = Executor::new(host.clone(), ExecutorConfig::default());

        let client = thread::spawn(move || {
            handle.create_context().map(|ctx| ctx.id())
        });
        executor.run().unwrap();

        assert_eq!(client.join().unwrap().unwrap(), 1);
        assert_eq!(host.mains_destroyed(), 1);
    }
}
