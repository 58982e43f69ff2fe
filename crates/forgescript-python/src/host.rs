//! [`InterpreterHost`] backed by the process's CPython interpreter.
//!
//! CPython is initialized once per process and never finalized. A sub-context
//! is a private namespace: each script or callback run executes in a fresh
//! globals dictionary with its own import table, so bundle modules never
//! enter `sys.modules` and one task cannot see another task's modules.
//! Destroying the sub-context clears both. The affinity lock is the GIL.

use std::path::Path;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use forgescript_core::AliasTask;
use forgescript_core::CommandSink;
use forgescript_core::FileSink;
use forgescript_core::ForgeError;
use forgescript_core::InterpreterHost;
use forgescript_core::Result;
use forgescript_core::host::CallbackOutcome;
use forgescript_core::host::CallbackRequest;
use forgescript_core::host::ScriptOutcome;
use forgescript_core::host::ScriptRequest;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use tracing::debug;
use tracing::info;

use crate::error::convert_error;
use crate::error::format_exception;
use crate::importer::importer_class;
use crate::module;
use crate::state::ActiveRun;
use crate::state::RunMode;
use crate::state::RunState;
use crate::types::PyAliasedCommand;
use crate::types::PyTask;

/// Error reported when a callback run finds no callback for the alias.
pub const MISSING_CALLBACK: &str = "could not find script registered alias callback function";

/// Run name used for alias callback runs.
const CALLBACK_RUN_NAME: &str = "<run_path>";

static MAIN_ACTIVE: AtomicBool = AtomicBool::new(false);

/// CPython interpreter host.
///
/// Only one executor per process may drive it: a second `create_main` while
/// the first main interpreter is alive fails with `Host`.
#[derive(Clone)]
pub struct PythonHost {
    commands: Arc<dyn CommandSink>,
    files: Arc<dyn FileSink>,
}

impl PythonHost {
    /// Creates a host publishing to the given sinks.
    pub fn new(commands: Arc<dyn CommandSink>, files: Arc<dyn FileSink>) -> Self {
        Self { commands, files }
    }

    /// Creates a host whose commands and files go to the same sink.
    pub fn with_sink<S>(sink: Arc<S>) -> Self
    where
        S: CommandSink + FileSink + 'static,
    {
        Self {
            commands: sink.clone(),
            files: sink,
        }
    }

    fn run_state(&self, mode: RunMode, path: &Path) -> Rc<RunState> {
        RunState::new(
            mode,
            path,
            Arc::clone(&self.commands),
            Arc::clone(&self.files),
        )
    }
}

impl std::fmt::Debug for PythonHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PythonHost").finish_non_exhaustive()
    }
}

/// Main interpreter state: the registered `forgescript` module.
#[derive(Debug)]
pub struct PythonMain {
    module: Py<PyModule>,
    importer_class: Py<PyAny>,
}

/// Private namespace for one run.
#[derive(Debug)]
pub struct PythonSub {
    globals: Py<PyDict>,
    importer_class: Py<PyAny>,
    importer: Option<(PathBuf, Py<PyAny>)>,
}

impl PythonSub {
    fn new(
        py: Python<'_>,
        module: &Bound<'_, PyModule>,
        importer_class: Py<PyAny>,
    ) -> PyResult<Self> {
        let globals = PyDict::new(py);
        globals.set_item("__builtins__", py.import("builtins")?)?;
        globals.set_item("forgescript", module)?;
        Ok(Self {
            globals: globals.unbind(),
            importer_class,
            importer: None,
        })
    }

    /// Import table for scripts under `dir`, created on first use.
    fn importer<'py>(&mut self, py: Python<'py>, dir: &Path) -> PyResult<Bound<'py, PyAny>> {
        if let Some((root, importer)) = &self.importer {
            if root == dir {
                return Ok(importer.bind(py).clone());
            }
        }

        let importer = self
            .importer_class
            .bind(py)
            .call1((dir.to_string_lossy().into_owned(),))?;
        let previous = self
            .importer
            .replace((dir.to_path_buf(), importer.clone().unbind()));
        if let Some((_, previous)) = previous {
            previous.bind(py).call_method0("close")?;
        }
        Ok(importer)
    }
}

impl InterpreterHost for PythonHost {
    type Main = PythonMain;
    type Sub = PythonSub;

    fn create_main(&self) -> Result<PythonMain> {
        if MAIN_ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(ForgeError::Host(
                "a Python main interpreter is already active in this process".to_string(),
            ));
        }

        Python::initialize();
        let created = Python::attach(|py| {
            let module = PyModule::new(py, "forgescript")?;
            module::forgescript(&module)?;
            py.import("sys")?
                .getattr("modules")?
                .set_item("forgescript", &module)?;
            Ok::<_, PyErr>(PythonMain {
                module: module.unbind(),
                importer_class: importer_class(py)?,
            })
        });

        match created {
            Ok(main) => {
                info!(python = %python_version(), "python main interpreter ready");
                Ok(main)
            }
            Err(e) => {
                MAIN_ACTIVE.store(false, Ordering::SeqCst);
                Err(Python::attach(|py| host_error(py, &e)))
            }
        }
    }

    fn destroy_main(&self, main: PythonMain) -> Result<()> {
        let result = Python::attach(|py| {
            let modules = py.import("sys")?.getattr("modules")?;
            if modules.contains("forgescript")? {
                modules.del_item("forgescript")?;
            }
            drop(main);
            Ok::<_, PyErr>(())
        });
        MAIN_ACTIVE.store(false, Ordering::SeqCst);
        result.map_err(|e| Python::attach(|py| host_error(py, &e)))
    }

    fn create_sub(&self, main: &mut PythonMain) -> Result<PythonSub> {
        Python::attach(|py| {
            PythonSub::new(py, main.module.bind(py), main.importer_class.clone_ref(py))
        })
        .map_err(|e: PyErr| Python::attach(|py| host_error(py, &e)))
    }

    fn destroy_sub(&self, _main: &mut PythonMain, sub: PythonSub) -> Result<()> {
        Python::attach(|py| {
            sub.globals.bind(py).clear();
            if let Some((root, importer)) = &sub.importer {
                debug!(root = %root.display(), "dropping bundle modules");
                importer.bind(py).call_method0("close")?;
            }
            Ok(())
        })
        .map_err(|e: PyErr| Python::attach(|py| host_error(py, &e)))
    }

    fn with_affinity<R>(&self, f: impl FnOnce() -> R) -> R {
        Python::attach(|_py| f())
    }

    fn run_script(&self, sub: &mut PythonSub, request: &ScriptRequest) -> ScriptOutcome {
        let state = self.run_state(
            RunMode::Script {
                callback_id: request.callback_id,
                task_id: request.task_id,
                operator: request.operator.clone(),
            },
            &request.path,
        );
        let _active = ActiveRun::enter(Rc::clone(&state));

        Python::attach(|py| match exec_script(py, sub, &request.path, "__main__") {
            Ok(()) => ScriptOutcome::ok(state.take_registered()),
            Err(e) => ScriptOutcome::failed(format_exception(py, &e)),
        })
    }

    fn run_callback(&self, sub: &mut PythonSub, request: &CallbackRequest) -> CallbackOutcome {
        let state = self.run_state(
            RunMode::Callback {
                task_id: request.task_id,
                alias_name: request.alias_name.clone(),
            },
            &request.path,
        );
        let _active = ActiveRun::enter(Rc::clone(&state));

        Python::attach(|py| match invoke_callback(py, sub, request, &state) {
            Ok(Some(result)) => CallbackOutcome::ok(result),
            Ok(None) => CallbackOutcome::failed(MISSING_CALLBACK),
            Err(e) => CallbackOutcome::failed(format_exception(py, &e)),
        })
    }
}

/// Runs the script at `path` in the sub-context's namespace.
///
/// Imports resolve against the script directory through the sub-context's
/// own import table.
fn exec_script(py: Python<'_>, sub: &mut PythonSub, path: &Path, run_name: &str) -> PyResult<()> {
    let source = std::fs::read_to_string(path)?;
    let path_str = path.to_string_lossy();
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let importer = sub.importer(py, &dir)?;
    let globals = sub.globals.bind(py);
    globals.set_item("__builtins__", importer.getattr("builtins")?)?;
    globals.set_item("__name__", run_name)?;
    globals.set_item("__file__", path_str.as_ref())?;

    let builtins = py.import("builtins")?;
    let code = builtins
        .getattr("compile")?
        .call1((source, path_str.as_ref(), "exec"))?;
    builtins.getattr("exec")?.call1((code, globals))?;
    Ok(())
}

/// Runs the script, then calls the callback it registered for the alias.
///
/// Returns `None` when the script registered no matching callback.
fn invoke_callback(
    py: Python<'_>,
    sub: &mut PythonSub,
    request: &CallbackRequest,
    state: &RunState,
) -> PyResult<Option<String>> {
    let task = AliasTask::from_json(&request.task_json).map_err(convert_error)?;

    exec_script(py, sub, &request.path, CALLBACK_RUN_NAME)?;

    let Some(callback) = state.take_callback() else {
        return Ok(None);
    };

    let task = Py::new(py, PyTask::from_task(py, task)?)?;
    let response = callback.bind(py).call1((task,))?;
    debug!(alias = %request.alias_name, response = %response, "alias callback returned");

    let command = response.extract::<PyRef<'_, PyAliasedCommand>>()?;
    command.to_json(py).map(Some)
}

fn host_error(py: Python<'_>, err: &PyErr) -> ForgeError {
    ForgeError::Host(format_exception(py, err))
}

fn python_version() -> String {
    Python::attach(|py| py.version().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn new_sub(py: Python<'_>) -> PythonSub {
        let module = PyModule::new(py, "forgescript").unwrap();
        PythonSub::new(py, &module, importer_class(py).unwrap()).unwrap()
    }

    fn sys_path(py: Python<'_>) -> Vec<String> {
        py.import("sys")
            .unwrap()
            .getattr("path")
            .unwrap()
            .extract()
            .unwrap()
    }

    #[test]
    fn test_exec_script_sets_run_name_and_file() {
        Python::initialize();
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("names.py");
        std::fs::write(&script, "seen = (__name__, __file__)\n").unwrap();

        Python::attach(|py| {
            let mut sub = new_sub(py);
            exec_script(py, &mut sub, &script, "__main__").unwrap();

            let seen: (String, String) = sub
                .globals
                .bind(py)
                .get_item("seen")
                .unwrap()
                .unwrap()
                .extract()
                .unwrap();
            assert_eq!(seen.0, "__main__");
            assert_eq!(seen.1, script.to_string_lossy());
        });
    }

    #[test]
    fn test_exec_script_leaves_sys_path_alone() {
        Python::initialize();
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("path_helper_mod.py"), "VALUE = 1\n").unwrap();
        let ok = temp.path().join("ok.py");
        std::fs::write(&ok, "import path_helper_mod\n").unwrap();
        let boom = temp.path().join("boom.py");
        std::fs::write(&boom, "raise RuntimeError('boom')\n").unwrap();

        Python::attach(|py| {
            let before = sys_path(py);
            let mut sub = new_sub(py);
            exec_script(py, &mut sub, &ok, "__main__").unwrap();
            assert!(exec_script(py, &mut sub, &boom, "__main__").is_err());
            assert_eq!(sys_path(py), before);
        });
    }

    #[test]
    fn test_bundle_modules_never_reach_sys_modules() {
        Python::initialize();
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("bundle_helper_mod.py"), "VALUE = 1\n").unwrap();
        std::fs::write(temp.path().join("main.py"), "import bundle_helper_mod\nimport json\n").unwrap();

        Python::attach(|py| {
            let mut sub = new_sub(py);
            exec_script(py, &mut sub, &temp.path().join("main.py"), "__main__").unwrap();

            let modules = py.import("sys").unwrap().getattr("modules").unwrap();
            assert!(!modules.contains("bundle_helper_mod").unwrap());
            assert!(modules.contains("json").unwrap());

            let (_, importer) = sub.importer.as_ref().unwrap();
            let private = importer.bind(py).getattr("modules").unwrap();
            assert!(private.contains("bundle_helper_mod").unwrap());
        });
    }

    #[test]
    fn test_sub_contexts_resolve_their_own_helpers() {
        Python::initialize();
        let first = tempfile::TempDir::new().unwrap();
        let second = tempfile::TempDir::new().unwrap();
        std::fs::write(first.path().join("samename.py"), "NAME = 'first'\n").unwrap();
        std::fs::write(second.path().join("samename.py"), "NAME = 'second'\n").unwrap();
        for dir in [first.path(), second.path()] {
            std::fs::write(dir.join("main.py"), "import samename\nname = samename.NAME\n").unwrap();
        }

        Python::attach(|py| {
            let mut a = new_sub(py);
            let mut b = new_sub(py);
            exec_script(py, &mut a, &first.path().join("main.py"), "__main__").unwrap();
            exec_script(py, &mut b, &second.path().join("main.py"), "__main__").unwrap();

            let name = |sub: &PythonSub| -> String {
                sub.globals
                    .bind(py)
                    .get_item("name")
                    .unwrap()
                    .unwrap()
                    .extract()
                    .unwrap()
            };
            assert_eq!(name(&a), "first");
            assert_eq!(name(&b), "second");
        });
    }
}
