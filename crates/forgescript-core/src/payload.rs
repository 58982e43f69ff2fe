//! Wire schema exchanged with alias callbacks.
//!
//! An [`AliasTask`] is serialized to JSON and handed to the script's callback;
//! the callback returns JSON that decodes as an [`AliasCommand`].

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::Result;

/// Task data passed to an alias callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AliasTask {
    /// Callback the alias was invoked on.
    #[serde(default)]
    pub callback: CallbackData,
    /// Parsed task arguments keyed by parameter name.
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Raw command line typed by the operator.
    #[serde(default)]
    pub command_line: String,
}

impl AliasTask {
    /// Serializes the task for the callback boundary.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a task from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Inserts an array argument, collapsing `[""]` to `[]`.
    pub fn insert_array_arg(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.args
            .insert(name.into(), Value::from(normalize_array_arg(values)));
    }
}

/// Callback fields visible to scripts. Absent fields decode to defaults and
/// unknown fields are kept in `extra`.
///
/// Field names match the operator framework's callback record.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackData {
    pub id: i64,
    pub display_id: i64,
    pub agent_callback_id: String,
    pub last_checkin: String,
    pub user: String,
    pub host: String,
    pub pid: i64,
    pub ip: String,
    pub ips: Vec<String>,
    pub external_ip: String,
    pub process_name: String,
    pub description: String,
    pub operator_username: String,
    pub active: bool,
    pub integrity_level: i64,
    pub locked: bool,
    pub operation_name: String,
    pub os: String,
    pub architecture: String,
    pub domain: String,
    pub extra_info: String,
    pub sleep_info: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Command returned by an alias callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AliasCommand {
    /// Name of the command to re-dispatch to.
    pub name: String,
    /// Arguments for that command.
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Display string shown to the operator.
    #[serde(default)]
    pub display_params: String,
}

/// Parameter type inferred from an argument value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ParameterType {
    /// JSON string.
    String,
    /// JSON boolean.
    Boolean,
    /// JSON number.
    Number,
    /// Array of strings.
    Array,
    /// Array of arrays of strings.
    TypedArray,
}

impl AliasCommand {
    /// Decodes a callback result.
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if `json` is not a valid command.
    ///
    /// # Examples
    ///
    /// ```
    /// use forgescript_core::AliasCommand;
    ///
    /// let cmd = AliasCommand::from_json(r#"{"name":"execute_coff","args":{"bof_file":"abc"}}"#)
    ///     .unwrap();
    /// assert_eq!(cmd.name, "execute_coff");
    /// assert!(cmd.display_params.is_empty());
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the command.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Classifies every argument, keeping unclassifiable ones out.
    ///
    /// Order follows the argument map.
    #[must_use]
    pub fn parameter_types(&self) -> Vec<(String, ParameterType)> {
        self.args
            .iter()
            .filter_map(|(name, value)| classify(value).map(|t| (name.clone(), t)))
            .collect()
    }
}

/// Infers the parameter type of one argument value.
#[must_use]
pub fn classify(value: &Value) -> Option<ParameterType> {
    match value {
        Value::String(_) => Some(ParameterType::String),
        Value::Bool(_) => Some(ParameterType::Boolean),
        Value::Number(_) => Some(ParameterType::Number),
        Value::Array(items) if items.iter().all(Value::is_string) => Some(ParameterType::Array),
        Value::Array(items)
            if items
                .iter()
                .all(|item| item.as_array().is_some_and(|inner| inner.iter().all(Value::is_string))) =>
        {
            Some(ParameterType::TypedArray)
        }
        _ => None,
    }
}

/// Collapses an array argument consisting of one empty string to `[]`.
#[must_use]
pub fn normalize_array_arg(values: Vec<String>) -> Vec<String> {
    if values.len() == 1 && values[0].is_empty() {
        Vec::new()
    } else {
        values
    }
}
