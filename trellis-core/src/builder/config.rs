//! The declarative config tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::tree::ControlKind;

/// A named reference to a registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorRef {
    pub name: String,

    /// Handed to the registry entry unchanged.
    #[serde(default)]
    pub params: Value,
}

impl ExecutorRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Value::Null,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// One node of a form description.
///
/// ```json
/// {
///   "type": "group",
///   "fields": [
///     { "type": "heading", "hints": [{ "name": "static", "params": { "key": "visible" } }] },
///     { "type": "text", "name": "email", "validators": [{ "name": "required" }] },
///     { "type": "list", "name": "tags", "array": true, "fields": [{ "type": "text", "name": "label" }] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Free-form type tag, passed through to registry entries.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ControlConfig>,

    /// Marks a list of `fields` groups.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub array: bool,

    /// Default value. Composites seed their children from it by key or index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<ExecutorRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<ExecutorRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messagers: Vec<ExecutorRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disablers: Vec<ExecutorRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<ExecutorRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<ExecutorRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<ExecutorRef>,
}

impl ControlConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Which kind of control this node becomes.
    ///
    /// An `array` marker wins, then `fields` (or a `"group"` type) make a
    /// group, then a `name` makes a field. Anything else is an item.
    pub fn classify(&self) -> ControlKind {
        if self.array {
            ControlKind::Array
        } else if !self.fields.is_empty() || self.kind == "group" {
            ControlKind::Group
        } else if self.name.is_some() {
            ControlKind::Field
        } else {
            ControlKind::Item
        }
    }

    /// The group every element of an array is built from.
    pub(crate) fn element(&self) -> ControlConfig {
        ControlConfig {
            kind: "group".to_string(),
            fields: self.fields.clone(),
            ..ControlConfig::default()
        }
    }
}
