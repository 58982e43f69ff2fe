//! Command definitions published by `register_alias`.
//!
//! A definition is the JSON document handed to a
//! [`CommandSink`](crate::CommandSink) when a script registers an alias. It
//! describes the new command to the operator framework: its help text, author,
//! and parameters.

use serde::Deserialize;
use serde::Serialize;

use crate::ForgeError;
use crate::Result;

/// Parameter kinds a script can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Free text.
    String,
    /// Boolean flag.
    Boolean,
    /// Integer or float.
    Number,
    /// One value out of `choices`.
    ChooseOne,
    /// List of strings.
    Array,
}

impl ParameterKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Boolean => "Boolean",
            Self::Number => "Number",
            Self::ChooseOne => "ChooseOne",
            Self::Array => "Array",
        }
    }
}

/// Default value of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Int(i64),
    /// Float default.
    Float(f64),
    /// Text default.
    String(String),
    /// List default.
    List(Vec<String>),
}

impl DefaultValue {
    fn fits(&self, kind: ParameterKind) -> bool {
        matches!(
            (kind, self),
            (ParameterKind::String | ParameterKind::ChooseOne, Self::String(_))
                | (ParameterKind::Boolean, Self::Bool(_))
                | (ParameterKind::Number, Self::Int(_) | Self::Float(_))
                | (ParameterKind::Array, Self::List(_))
        )
    }
}

/// Parameter as declared by a script.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    /// Parameter name, used as the argument key.
    pub name: String,
    /// Label shown in the operator UI.
    pub display_name: String,
    /// Command-line flag name.
    pub cli_name: String,
    /// Value kind.
    pub kind: ParameterKind,
    /// Help text.
    pub description: String,
    /// Allowed values for `ChooseOne`.
    pub choices: Vec<String>,
    /// Default value, if any.
    pub default_value: Option<DefaultValue>,
}

/// Placement of a parameter inside a parameter group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterGroup {
    /// Group name; every alias parameter lives in `Default`.
    pub group_name: String,
    /// 1-based position in the UI.
    pub ui_position: usize,
    /// Whether the operator must supply a value.
    pub required: bool,
}

/// Parameter entry of a [`CommandDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandParameter {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub display_name: String,
    #[allow(missing_docs)]
    pub cli_name: String,
    /// Wire name of the parameter kind.
    pub parameter_type: ParameterKind,
    #[allow(missing_docs)]
    pub description: String,
    #[allow(missing_docs)]
    pub choices: Vec<String>,
    /// Always exactly one group.
    pub parameter_group_info: Vec<ParameterGroup>,
    /// Omitted when the script gave no default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<DefaultValue>,
}

impl CommandParameter {
    /// Builds the entry for the parameter at `index` (0-based).
    ///
    /// A `String` parameter whose default is the empty string is optional;
    /// every other parameter is required.
    ///
    /// # Errors
    ///
    /// Returns `Host` if the default value does not match the kind.
    pub fn from_spec(index: usize, spec: ParameterSpec) -> Result<Self> {
        if let Some(default) = &spec.default_value {
            if !default.fits(spec.kind) {
                return Err(ForgeError::Host(format!(
                    "invalid default value for {} parameter '{}'",
                    spec.kind.as_str(),
                    spec.name
                )));
            }
        }

        let optional = spec.kind == ParameterKind::String
            && matches!(&spec.default_value, Some(DefaultValue::String(s)) if s.is_empty());

        Ok(Self {
            name: spec.name,
            display_name: spec.display_name,
            cli_name: spec.cli_name,
            parameter_type: spec.kind,
            description: spec.description,
            choices: spec.choices,
            parameter_group_info: vec![ParameterGroup {
                group_name: "Default".to_string(),
                ui_position: index + 1,
                required: !optional,
            }],
            default_value: spec.default_value,
        })
    }
}

/// Optional command attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAttributes {
    /// Operating systems the command supports.
    pub supported_os: Vec<String>,
}

/// Command definition sent to the operator framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDefinition {
    #[allow(missing_docs)]
    pub name: String,
    /// Always `false` for aliases.
    pub needs_admin_permissions: bool,
    #[allow(missing_docs)]
    pub help_string: String,
    #[allow(missing_docs)]
    pub description: String,
    #[allow(missing_docs)]
    pub version: u32,
    /// Field name as spelled by the operator framework.
    #[serde(rename = "suported_ui_features")]
    pub supported_ui_features: Vec<String>,
    #[allow(missing_docs)]
    pub author: String,
    /// MITRE ATT&CK mappings; aliases declare none.
    pub attack: Vec<String>,
    /// Always `false`: aliases dispatch to a real command.
    pub script_only: bool,
    #[allow(missing_docs)]
    pub parameters: Vec<CommandParameter>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<CommandAttributes>,
}

impl CommandDefinition {
    /// Starts a definition with empty help, version 1, and no parameters.
    ///
    /// # Errors
    ///
    /// Returns `Host` if `name` is empty.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ForgeError::Host("name is an empty string".to_string()));
        }

        Ok(Self {
            name,
            needs_admin_permissions: false,
            help_string: String::new(),
            description: String::new(),
            version: 1,
            supported_ui_features: Vec::new(),
            author: String::new(),
            attack: Vec::new(),
            script_only: false,
            parameters: Vec::new(),
            attributes: None,
        })
    }

    /// Sets the author, falling back to `operator` when `author` is empty.
    #[must_use]
    pub fn with_author(mut self, author: &str, operator: &str) -> Self {
        self.author = if author.is_empty() { operator } else { author }.to_string();
        self
    }

    /// Replaces the parameters, numbering them in order.
    ///
    /// # Errors
    ///
    /// Fails on the first parameter whose default does not match its kind.
    pub fn with_parameters(mut self, specs: Vec<ParameterSpec>) -> Result<Self> {
        self.parameters = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| CommandParameter::from_spec(index, spec))
            .collect::<Result<_>>()?;
        Ok(self)
    }

    /// Serializes the definition.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::Value;
    use serde_json::json;

    fn spec(name: &str, kind: ParameterKind, default_value: Option<DefaultValue>) -> ParameterSpec {
        ParameterSpec {
            name: name.into(),
            display_name: String::new(),
            cli_name: String::new(),
            kind,
            description: String::new(),
            choices: Vec::new(),
            default_value,
        }
    }

    #[test]
    fn test_definition_shape() {
        let mut def = CommandDefinition::new("sa-whoami")
            .unwrap()
            .with_author("TrustedSec", "alice");
        def.description = "Runs whoami".into();

        let value: Value = serde_json::from_str(&def.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "sa-whoami",
                "needs_admin_permissions": false,
                "help_string": "",
                "description": "Runs whoami",
                "version": 1,
                "suported_ui_features": [],
                "author": "TrustedSec",
                "attack": [],
                "script_only": false,
                "parameters": [],
            })
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(CommandDefinition::new("").is_err());
    }

    #[test]
    fn test_author_falls_back_to_operator() {
        let def = CommandDefinition::new("x").unwrap().with_author("", "alice");
        assert_eq!(def.author, "alice");
    }

    #[test]
    fn test_parameter_positions_and_required() {
        let def = CommandDefinition::new("sa-ldapsearch")
            .unwrap()
            .with_parameters(vec![
                spec("query", ParameterKind::String, None),
                spec("hostname", ParameterKind::String, Some(DefaultValue::String(String::new()))),
                spec("count", ParameterKind::Number, Some(DefaultValue::Int(0))),
                spec("attributes", ParameterKind::Array, Some(DefaultValue::List(Vec::new()))),
            ])
            .unwrap();

        let value: Value = serde_json::from_str(&def.to_json().unwrap()).unwrap();
        let params = value["parameters"].as_array().unwrap();

        assert_eq!(params[0]["parameter_type"], "String");
        assert!(params[0].get("default_value").is_none());
        assert_eq!(params[0]["parameter_group_info"][0]["ui_position"], 1);
        assert_eq!(params[0]["parameter_group_info"][0]["required"], true);

        assert_eq!(params[1]["parameter_group_info"][0]["required"], false);
        assert_eq!(params[1]["default_value"], "");

        assert_eq!(params[2]["default_value"], 0);
        assert_eq!(params[2]["parameter_group_info"][0]["group_name"], "Default");
        assert_eq!(params[3]["default_value"], json!([]));
        assert_eq!(params[3]["parameter_group_info"][0]["ui_position"], 4);
    }

    #[test]
    fn test_mismatched_default_rejected() {
        let err = CommandDefinition::new("x")
            .unwrap()
            .with_parameters(vec![spec(
                "ldaps",
                ParameterKind::Boolean,
                Some(DefaultValue::String("yes".into())),
            )])
            .unwrap_err();
        assert!(err.to_string().contains("invalid default value for Boolean parameter 'ldaps'"));
    }

    #[test]
    fn test_attributes_serialized_when_present() {
        let mut def = CommandDefinition::new("x").unwrap();
        def.attributes = Some(CommandAttributes {
            supported_os: vec!["Windows".into()],
        });

        let value: Value = serde_json::from_str(&def.to_json().unwrap()).unwrap();
        assert_eq!(value["attributes"]["supported_os"], json!(["Windows"]));
    }
}
