//! Per-run state reachable from `forgescript` module functions.
//!
//! A run is installed on the executing thread for the duration of one
//! `run_script` or `run_callback` call. Module functions look it up through
//! [`current`]; outside a run they raise `RuntimeError`.

use std::cell::RefCell;
use std::path::Path;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use forgescript_core::CommandSink;
use forgescript_core::FileSink;
use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;

thread_local! {
    static ACTIVE: RefCell<Option<Rc<RunState>>> = const { RefCell::new(None) };
}

/// What the current run does with `register_alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunMode {
    /// Loading a bundle: every alias becomes a command definition.
    Script {
        callback_id: i64,
        task_id: i64,
        operator: String,
    },
    /// Invoking an alias: only the callback for `alias_name` is captured.
    Callback { task_id: i64, alias_name: String },
}

impl RunMode {
    pub(crate) const fn task_id(&self) -> i64 {
        match self {
            Self::Script { task_id, .. } | Self::Callback { task_id, .. } => *task_id,
        }
    }

    /// Files registered while invoking an alias are fetched once.
    pub(crate) const fn delete_after_fetch(&self) -> bool {
        matches!(self, Self::Callback { .. })
    }
}

/// State of one script or callback run.
pub(crate) struct RunState {
    pub(crate) mode: RunMode,
    pub(crate) script_path: PathBuf,
    pub(crate) commands: Arc<dyn CommandSink>,
    pub(crate) files: Arc<dyn FileSink>,
    registered: RefCell<Vec<String>>,
    callback: RefCell<Option<Py<PyAny>>>,
}

impl RunState {
    pub(crate) fn new(
        mode: RunMode,
        script_path: &Path,
        commands: Arc<dyn CommandSink>,
        files: Arc<dyn FileSink>,
    ) -> Rc<Self> {
        Rc::new(Self {
            mode,
            script_path: script_path.to_path_buf(),
            commands,
            files,
            registered: RefCell::new(Vec::new()),
            callback: RefCell::new(None),
        })
    }

    /// Directory relative `register_file` paths resolve against.
    pub(crate) fn script_dir(&self) -> &Path {
        self.script_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub(crate) fn record_alias(&self, name: &str) {
        self.registered.borrow_mut().push(name.to_string());
    }

    /// Keeps `callback` if it is the first one registered under the alias
    /// being invoked.
    pub(crate) fn offer_callback(&self, name: &str, callback: &Bound<'_, PyAny>) {
        let RunMode::Callback { alias_name, .. } = &self.mode else {
            return;
        };
        let mut slot = self.callback.borrow_mut();
        if slot.is_none() && alias_name == name {
            *slot = Some(callback.clone().unbind());
        }
    }

    pub(crate) fn take_registered(&self) -> Vec<String> {
        self.registered.take()
    }

    pub(crate) fn take_callback(&self) -> Option<Py<PyAny>> {
        self.callback.take()
    }
}

/// Installs a [`RunState`] on this thread until dropped.
pub(crate) struct ActiveRun {
    previous: Option<Rc<RunState>>,
}

impl ActiveRun {
    pub(crate) fn enter(state: Rc<RunState>) -> Self {
        let previous = ACTIVE.with(|active| active.replace(Some(state)));
        Self { previous }
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE.with(|active| *active.borrow_mut() = previous);
    }
}

/// Returns the run installed on this thread.
pub(crate) fn current() -> PyResult<Rc<RunState>> {
    ACTIVE
        .with(|active| active.borrow().clone())
        .ok_or_else(|| PyRuntimeError::new_err("forgescript functions are only available while a bundle script runs"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use forgescript_core::MemorySink;

    fn state(mode: RunMode) -> Rc<RunState> {
        let sink = Arc::new(MemorySink::new());
        RunState::new(mode, Path::new("/tmp/bundle/alias.py"), sink.clone(), sink)
    }

    #[test]
    fn test_no_run_outside_guard() {
        assert!(current().is_err());
    }

    #[test]
    fn test_guard_restores_previous() {
        let outer = state(RunMode::Script {
            callback_id: 1,
            task_id: 2,
            operator: "alice".into(),
        });
        let inner = state(RunMode::Callback {
            task_id: 3,
            alias_name: "whoami".into(),
        });

        let _outer = ActiveRun::enter(outer);
        {
            let _inner = ActiveRun::enter(inner);
            assert_eq!(current().unwrap().mode.task_id(), 3);
        }
        assert_eq!(current().unwrap().mode.task_id(), 2);
    }

    #[test]
    fn test_mode_flags() {
        let script = state(RunMode::Script {
            callback_id: 1,
            task_id: 2,
            operator: String::new(),
        });
        assert!(!script.mode.delete_after_fetch());
        assert_eq!(script.script_dir(), Path::new("/tmp/bundle"));

        let callback = state(RunMode::Callback {
            task_id: 3,
            alias_name: "x".into(),
        });
        assert!(callback.mode.delete_after_fetch());
    }

    #[test]
    fn test_first_matching_callback_wins() {
        Python::initialize();
        Python::attach(|py| {
            let run = state(RunMode::Callback {
                task_id: 1,
                alias_name: "whoami".into(),
            });
            let first = py.eval(c"lambda task: 1", None, None).unwrap();
            let second = py.eval(c"lambda task: 2", None, None).unwrap();
            let other = py.eval(c"lambda task: 3", None, None).unwrap();

            run.offer_callback("other", &other);
            run.offer_callback("whoami", &first);
            run.offer_callback("whoami", &second);

            let kept = run.take_callback().unwrap();
            let value: i64 = kept.bind(py).call1((0,)).unwrap().extract().unwrap();
            assert_eq!(value, 1);
        });
    }
}
