//! Facet value types and the combined control snapshot.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Derived boolean flags keyed by hint name.
pub type Hints = IndexMap<String, bool>;

/// Derived arbitrary values keyed by name.
pub type Extras = serde_json::Map<String, Value>;

/// Keyed human-readable messages. Used for both errors and informational
/// messages.
pub type Messages = IndexMap<String, Message>;

/// A single message with optional parameters for interpolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
    #[serde(flatten)]
    pub params: serde_json::Map<String, Value>,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            params: serde_json::Map::new(),
        }
    }

    /// Attach a parameter, e.g. the minimum length a validator expected.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// A one-entry message map.
    pub fn keyed(key: impl Into<String>, message: impl Into<String>) -> Messages {
        let mut messages = Messages::new();
        messages.insert(key.into(), Self::new(message));
        messages
    }
}

/// Everything a consumer needs to render a control, in one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlState {
    pub value: Value,
    pub errors: Option<Messages>,
    pub disabled: bool,
    pub valid: bool,
    pub pending: bool,
    pub dirty: bool,
    pub touched: bool,
    pub hints: Hints,
    pub extras: Extras,
    pub messages: Option<Messages>,
}

impl ControlState {
    pub(crate) fn initial(value: Value) -> Self {
        Self {
            value,
            errors: None,
            disabled: false,
            valid: true,
            pending: false,
            dirty: false,
            touched: false,
            hints: Hints::new(),
            extras: Extras::new(),
            messages: None,
        }
    }

    /// Look up a hint, treating a missing key as false.
    pub fn hint(&self, key: &str) -> bool {
        self.hints.get(key).copied().unwrap_or(false)
    }
}
