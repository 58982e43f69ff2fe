//! The `forgescript` module imported by bundle scripts.

use std::path::Path;

use forgescript_core::CommandDefinition;
use pyo3::exceptions::PyTypeError;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use tracing::debug;

use crate::error::convert_error;
use crate::error::definition_error;
use crate::error::register_exceptions;
use crate::state;
use crate::state::RunMode;
use crate::types::PyAliasAttributes;
use crate::types::PyAliasParameter;
use crate::types::PyAliasParameterType;
use crate::types::PyAliasedCommand;
use crate::types::PyCallback;
use crate::types::PyTask;

/// Maximum path length in bytes accepted by `register_file`.
const MAX_PATH_LENGTH: usize = 4096;

/// Registers a new alias command.
///
/// While a bundle loads, this publishes a command definition for the
/// callback the bundle was loaded on. While an alias is invoked, it captures
/// `callback` if `name` is the alias being invoked.
///
/// # Raises
///
/// * `ValueError` - Empty name, or a default value that does not match its
///   parameter type
/// * `TypeError` - `callback` is not callable
#[pyfunction]
#[pyo3(signature = (
    name,
    callback,
    *,
    parameters=Vec::new(),
    description=String::new(),
    help_string=String::new(),
    version=1,
    author=String::new(),
    attributes=None,
))]
#[allow(clippy::too_many_arguments, clippy::needless_pass_by_value)]
fn register_alias(
    name: &str,
    callback: &Bound<'_, PyAny>,
    parameters: Vec<PyAliasParameter>,
    description: String,
    help_string: String,
    version: u32,
    author: String,
    attributes: Option<PyAliasAttributes>,
) -> PyResult<()> {
    if name.is_empty() {
        return Err(PyValueError::new_err("name is an empty string"));
    }
    if !callback.is_callable() {
        return Err(PyTypeError::new_err(format!(
            "callback for alias '{name}' is not callable"
        )));
    }

    let run = state::current()?;
    match &run.mode {
        RunMode::Script {
            callback_id,
            task_id,
            operator,
        } => {
            let mut definition = CommandDefinition::new(name)
                .and_then(|d| {
                    d.with_parameters(parameters.into_iter().map(PyAliasParameter::into_spec).collect())
                })
                .map_err(definition_error)?
                .with_author(&author, operator);
            definition.description = description;
            definition.help_string = help_string;
            definition.version = version;
            definition.attributes = attributes.map(Into::into);

            let json = definition.to_json().map_err(convert_error)?;
            run.commands
                .create_command(
                    &run.script_path.to_string_lossy(),
                    *callback_id,
                    *task_id,
                    &json,
                )
                .map_err(convert_error)?;
            debug!(alias = name, callback_id, "registered alias command");
        }
        RunMode::Callback { .. } => run.offer_callback(name, callback),
    }

    run.record_alias(name);
    Ok(())
}

/// Uploads a file from the bundle and returns its identifier.
///
/// Relative paths resolve against the directory of the running script.
///
/// # Raises
///
/// * `ValueError` - Null bytes in the path, or path too long
/// * `OSError` - The file cannot be read
#[pyfunction]
fn register_file(py: Python<'_>, path: &Bound<'_, PyAny>) -> PyResult<String> {
    let run = state::current()?;
    let path = path_to_string(py, path)?;
    let path = Path::new(&path);
    let full_path = if path.is_relative() {
        run.script_dir().join(path)
    } else {
        path.to_path_buf()
    };

    let data = std::fs::read(&full_path)?;
    let file_name = full_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let id = run
        .files
        .register_file(
            run.mode.task_id(),
            &file_name,
            &data,
            run.mode.delete_after_fetch(),
        )
        .map_err(convert_error)?;
    debug!(file = %full_path.display(), size = data.len(), "registered file");
    Ok(id)
}

/// Converts a Python path object to a String.
///
/// Accepts both strings and `pathlib.Path` objects by calling `os.fspath()`.
fn path_to_string(py: Python<'_>, path: &Bound<'_, PyAny>) -> PyResult<String> {
    let path_str = if let Ok(s) = path.extract::<String>() {
        s
    } else {
        py.import("os")?
            .getattr("fspath")?
            .call1((path,))?
            .extract()?
    };

    if path_str.contains('\0') {
        return Err(PyValueError::new_err("path contains null bytes"));
    }
    if path_str.len() > MAX_PATH_LENGTH {
        return Err(PyValueError::new_err(format!(
            "path exceeds maximum length of {MAX_PATH_LENGTH} bytes (got {} bytes)",
            path_str.len()
        )));
    }

    Ok(path_str)
}

/// Populates the `forgescript` module.
pub fn forgescript(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__doc__", "Alias registration API for forgescript bundles")?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    m.add_function(wrap_pyfunction!(register_alias, m)?)?;
    m.add_function(wrap_pyfunction!(register_file, m)?)?;

    m.add_class::<PyTask>()?;
    m.add_class::<PyCallback>()?;
    m.add_class::<PyAliasedCommand>()?;
    m.add_class::<PyAliasParameter>()?;
    m.add_class::<PyAliasParameterType>()?;
    m.add_class::<PyAliasAttributes>()?;

    register_exceptions(m)?;

    Ok(())
}
