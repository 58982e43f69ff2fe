//! Conversions between forgescript errors and Python exceptions.

use forgescript_core::ForgeError;
use pyo3::create_exception;
use pyo3::exceptions::PyException;
use pyo3::exceptions::PyFileNotFoundError;
use pyo3::exceptions::PyIsADirectoryError;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

// Base exception for failures raised by forgescript functions
create_exception!(forgescript, ForgeScriptError, PyException);

create_exception!(forgescript, SecurityViolationError, ForgeScriptError);

/// Converts a core error into the Python exception a script sees.
///
/// This function is a workaround for Rust's orphan rules, which prevent
/// implementing `From<ForgeError> for PyErr` directly.
pub fn convert_error(err: ForgeError) -> PyErr {
    match err {
        ForgeError::Io(e) => PyErr::from(e),
        ForgeError::NotFound(path) => {
            PyFileNotFoundError::new_err(format!("no such file: {}", path.display()))
        }
        ForgeError::IsDirectory(path) => {
            PyIsADirectoryError::new_err(format!("is a directory: {}", path.display()))
        }
        ForgeError::Host(msg) => ForgeScriptError::new_err(msg),
        e if e.is_security_violation() => SecurityViolationError::new_err(e.to_string()),
        e => ForgeScriptError::new_err(e.to_string()),
    }
}

/// Converts a command-definition error into `ValueError`.
pub fn definition_error(err: ForgeError) -> PyErr {
    match err {
        ForgeError::Host(msg) => PyValueError::new_err(msg),
        e => convert_error(e),
    }
}

/// Renders an exception the way the operator sees it: the formatted
/// traceback when one is available, `Type: message` otherwise.
pub fn format_exception(py: Python<'_>, err: &PyErr) -> String {
    let formatted = py
        .import("traceback")
        .and_then(|tb| tb.getattr("format_exception"))
        .and_then(|format| format.call1((err.get_type(py), err.value(py), err.traceback(py))))
        .and_then(|lines| lines.extract::<Vec<String>>());

    match formatted {
        Ok(lines) if !lines.is_empty() => lines.concat().trim_end().to_string(),
        _ => err.to_string(),
    }
}

/// Registers all exception types with the Python module.
pub fn register_exceptions(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("ForgeScriptError", m.py().get_type::<ForgeScriptError>())?;
    m.add(
        "SecurityViolationError",
        m.py().get_type::<SecurityViolationError>(),
    )?;
    Ok(())
}
