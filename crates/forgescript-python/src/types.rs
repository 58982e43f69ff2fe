//! Classes exposed to scripts through the `forgescript` module.

use forgescript_core::AliasTask;
use forgescript_core::command::CommandAttributes;
use forgescript_core::command::DefaultValue;
use forgescript_core::command::ParameterKind;
use forgescript_core::command::ParameterSpec;
use forgescript_core::payload::CallbackData;
use pyo3::exceptions::PyTypeError;
use pyo3::prelude::*;
use pyo3::types::PyBool;
use pyo3::types::PyDict;
use pyo3::types::PyFloat;
use pyo3::types::PyInt;
use pyo3::types::PyString;

/// Callback the alias was invoked on.
///
/// Read-only view of the callback record sent with the task.
#[pyclass(name = "Callback", module = "forgescript", frozen)]
#[derive(Clone, Debug)]
pub struct PyCallback {
    #[pyo3(get)]
    last_checkin: String,
    #[pyo3(get)]
    user: String,
    #[pyo3(get)]
    host: String,
    #[pyo3(get)]
    pid: i64,
    #[pyo3(get)]
    ip: String,
    #[pyo3(get)]
    ips: Vec<String>,
    #[pyo3(get)]
    external_ip: String,
    #[pyo3(get)]
    process_name: String,
    #[pyo3(get)]
    description: String,
    #[pyo3(get)]
    operator_username: String,
    #[pyo3(get)]
    active: bool,
    #[pyo3(get)]
    integrity_level: i64,
    #[pyo3(get)]
    locked: bool,
    #[pyo3(get)]
    operation_name: String,
    #[pyo3(get)]
    os: String,
    #[pyo3(get)]
    architecture: String,
    #[pyo3(get)]
    domain: String,
    #[pyo3(get)]
    extra_info: String,
    #[pyo3(get)]
    sleep_info: String,
}

impl From<CallbackData> for PyCallback {
    fn from(data: CallbackData) -> Self {
        Self {
            last_checkin: data.last_checkin,
            user: data.user,
            host: data.host,
            pid: data.pid,
            ip: data.ip,
            ips: data.ips,
            external_ip: data.external_ip,
            process_name: data.process_name,
            description: data.description,
            operator_username: data.operator_username,
            active: data.active,
            integrity_level: data.integrity_level,
            locked: data.locked,
            operation_name: data.operation_name,
            os: data.os,
            architecture: data.architecture,
            domain: data.domain,
            extra_info: data.extra_info,
            sleep_info: data.sleep_info,
        }
    }
}

/// Task handed to an alias callback.
#[pyclass(name = "Task", module = "forgescript", frozen)]
pub struct PyTask {
    callback: Py<PyCallback>,
    args: Py<PyDict>,
    #[pyo3(get)]
    command_line: String,
}

impl PyTask {
    /// Builds the Python view of `task`.
    ///
    /// Arguments go through `json.loads` so nested values keep their shape.
    pub(crate) fn from_task(py: Python<'_>, task: AliasTask) -> PyResult<Self> {
        let args_json = serde_json::to_string(&task.args)
            .map_err(|e| PyTypeError::new_err(e.to_string()))?;
        let args = py
            .import("json")?
            .getattr("loads")?
            .call1((args_json,))?
            .cast_into::<PyDict>()?;

        Ok(Self {
            callback: Py::new(py, PyCallback::from(task.callback))?,
            args: args.unbind(),
            command_line: task.command_line,
        })
    }
}

#[pymethods]
impl PyTask {
    /// Callback the alias was invoked on.
    #[getter]
    fn callback(&self, py: Python<'_>) -> Py<PyCallback> {
        self.callback.clone_ref(py)
    }

    /// Parsed task arguments.
    #[getter]
    fn args<'py>(&self, py: Python<'py>) -> Bound<'py, PyDict> {
        self.args.bind(py).clone()
    }
}

/// Command an alias callback dispatches to.
#[pyclass(name = "AliasedCommand", module = "forgescript")]
pub struct PyAliasedCommand {
    #[pyo3(get, set)]
    name: String,
    args: Py<PyDict>,
    #[pyo3(get, set)]
    display_params: String,
}

#[pymethods]
impl PyAliasedCommand {
    #[new]
    #[pyo3(signature = (name, *, args=None, display_params=String::new()))]
    fn new(
        py: Python<'_>,
        name: String,
        args: Option<Bound<'_, PyDict>>,
        display_params: String,
    ) -> Self {
        Self {
            name,
            args: args.unwrap_or_else(|| PyDict::new(py)).unbind(),
            display_params,
        }
    }

    /// Arguments for the dispatched command.
    #[getter]
    fn args<'py>(&self, py: Python<'py>) -> Bound<'py, PyDict> {
        self.args.bind(py).clone()
    }

    fn __repr__(&self) -> String {
        format!("AliasedCommand({:?})", self.name)
    }
}

impl PyAliasedCommand {
    /// Serializes `{name, args, display_params}` with compact separators.
    pub(crate) fn to_json(&self, py: Python<'_>) -> PyResult<String> {
        let payload = PyDict::new(py);
        payload.set_item("name", &self.name)?;
        payload.set_item("args", self.args.bind(py))?;
        payload.set_item("display_params", &self.display_params)?;

        let kwargs = PyDict::new(py);
        kwargs.set_item("separators", (",", ":"))?;
        py.import("json")?
            .getattr("dumps")?
            .call((payload,), Some(&kwargs))?
            .extract()
    }
}

/// Kind of an alias parameter.
#[pyclass(name = "AliasParameterType", module = "forgescript", eq, eq_int, frozen)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PyAliasParameterType {
    #[pyo3(name = "String")]
    Text,
    Boolean,
    Number,
    ChooseOne,
    Array,
}

impl From<PyAliasParameterType> for ParameterKind {
    fn from(kind: PyAliasParameterType) -> Self {
        match kind {
            PyAliasParameterType::Text => Self::String,
            PyAliasParameterType::Boolean => Self::Boolean,
            PyAliasParameterType::Number => Self::Number,
            PyAliasParameterType::ChooseOne => Self::ChooseOne,
            PyAliasParameterType::Array => Self::Array,
        }
    }
}

/// Parameter declaration for `register_alias`.
#[pyclass(name = "AliasParameter", module = "forgescript", frozen)]
#[derive(Clone, Debug)]
pub struct PyAliasParameter {
    #[pyo3(get)]
    name: String,
    #[pyo3(get)]
    display_name: String,
    #[pyo3(get)]
    cli_name: String,
    #[pyo3(get, name = "type")]
    kind: PyAliasParameterType,
    #[pyo3(get)]
    description: String,
    #[pyo3(get)]
    choices: Vec<String>,
    default_value: Option<DefaultValue>,
}

#[pymethods]
impl PyAliasParameter {
    #[new]
    #[pyo3(signature = (
        name,
        *,
        r#type,
        display_name=String::new(),
        cli_name=String::new(),
        description=String::new(),
        choices=Vec::new(),
        default_value=None,
    ))]
    fn new(
        name: String,
        r#type: PyAliasParameterType,
        display_name: String,
        cli_name: String,
        description: String,
        choices: Vec<String>,
        default_value: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<Self> {
        let default_value = default_value
            .filter(|value| !value.is_none())
            .map(default_from_py)
            .transpose()?;

        Ok(Self {
            name,
            display_name,
            cli_name,
            kind: r#type,
            description,
            choices,
            default_value,
        })
    }
}

impl PyAliasParameter {
    pub(crate) fn into_spec(self) -> ParameterSpec {
        ParameterSpec {
            name: self.name,
            display_name: self.display_name,
            cli_name: self.cli_name,
            kind: self.kind.into(),
            description: self.description,
            choices: self.choices,
            default_value: self.default_value,
        }
    }
}

/// Converts a Python default value; `bool` is checked before `int`.
fn default_from_py(value: &Bound<'_, PyAny>) -> PyResult<DefaultValue> {
    if value.is_instance_of::<PyBool>() {
        return Ok(DefaultValue::Bool(value.extract()?));
    }
    if value.is_instance_of::<PyInt>() {
        return Ok(DefaultValue::Int(value.extract()?));
    }
    if value.is_instance_of::<PyFloat>() {
        return Ok(DefaultValue::Float(value.extract()?));
    }
    if value.is_instance_of::<PyString>() {
        return Ok(DefaultValue::String(value.extract()?));
    }
    value
        .extract::<Vec<String>>()
        .map(DefaultValue::List)
        .map_err(|_| {
            PyTypeError::new_err("default_value must be str, bool, int, float or a list of str")
        })
}

/// Optional command attributes for `register_alias`.
#[pyclass(name = "AliasAttributes", module = "forgescript", frozen)]
#[derive(Clone, Debug, Default)]
pub struct PyAliasAttributes {
    #[pyo3(get)]
    supported_os: Vec<String>,
}

#[pymethods]
impl PyAliasAttributes {
    #[new]
    #[pyo3(signature = (*, supported_os=Vec::new()))]
    fn new(supported_os: Vec<String>) -> Self {
        Self { supported_os }
    }
}

impl From<PyAliasAttributes> for CommandAttributes {
    fn from(attributes: PyAliasAttributes) -> Self {
        Self {
            supported_os: attributes.supported_os,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_from_py_kinds() {
        Python::initialize();
        Python::attach(|py| {
            let value = |src: &str| {
                let code = std::ffi::CString::new(src).unwrap();
                py.eval(&code, None, None).unwrap()
            };

            assert_eq!(default_from_py(&value("True")).unwrap(), DefaultValue::Bool(true));
            assert_eq!(default_from_py(&value("0")).unwrap(), DefaultValue::Int(0));
            assert_eq!(default_from_py(&value("1.5")).unwrap(), DefaultValue::Float(1.5));
            assert_eq!(
                default_from_py(&value("'SUBTREE'")).unwrap(),
                DefaultValue::String("SUBTREE".into())
            );
            assert_eq!(
                default_from_py(&value("['a', 'b']")).unwrap(),
                DefaultValue::List(vec!["a".into(), "b".into()])
            );
            assert!(default_from_py(&value("{'a': 1}")).is_err());
        });
    }

    #[test]
    fn test_task_exposes_args_and_callback() {
        Python::initialize();
        Python::attach(|py| {
            let task = AliasTask::from_json(
                r#"{"callback":{"architecture":"x64"},"args":{"attributes":["cn"],"count":3},"command_line":"-count 3"}"#,
            )
            .unwrap();
            let task = Py::new(py, PyTask::from_task(py, task).unwrap()).unwrap();
            let task = task.bind(py);

            let arch: String = task
                .getattr("callback")
                .unwrap()
                .getattr("architecture")
                .unwrap()
                .extract()
                .unwrap();
            assert_eq!(arch, "x64");

            let count: i64 = task
                .getattr("args")
                .unwrap()
                .get_item("count")
                .unwrap()
                .extract()
                .unwrap();
            assert_eq!(count, 3);
        });
    }

    #[test]
    fn test_aliased_command_json() {
        Python::initialize();
        Python::attach(|py| {
            let args = PyDict::new(py);
            args.set_item("bof_file", "abc").unwrap();
            let command = PyAliasedCommand::new(py, "execute_coff".into(), Some(args), String::new());

            assert_eq!(
                command.to_json(py).unwrap(),
                r#"{"name":"execute_coff","args":{"bof_file":"abc"},"display_params":""}"#
            );
        });
    }
}
