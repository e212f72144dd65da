//! Error types shared across the crate.

use thiserror::Error;

use crate::tree::{ControlId, ControlKind};

/// Errors raised by control operations, executor pipelines and the builder.
///
/// Validation failures are *not* errors: they are the expected output of
/// validators and live in a control's `errors` map.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    /// The control was disposed and no longer accepts mutations.
    #[error("control {0} has been disposed")]
    Disposed(ControlId),

    /// The operation does not apply to this kind of control.
    #[error("`{op}` is not supported on {kind} controls")]
    Unsupported {
        op: &'static str,
        kind: ControlKind,
    },

    /// A composite control received a value of the wrong shape.
    #[error("expected {expected} value, got {found}")]
    InvalidValue {
        expected: &'static str,
        found: String,
    },

    /// A structural array edit addressed a missing slot.
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// An executor returned a future or stream outside of a tokio runtime.
    #[error("no async runtime available to drive `{0}` executors")]
    NoRuntime(&'static str),

    /// An executor failed, either synchronously or through its stream.
    #[error("executor failed: {0}")]
    Executor(String),

    /// The declarative config tree could not be turned into controls.
    #[error("invalid form config: {0}")]
    Config(String),
}

impl FormError {
    /// Build an executor fault from any displayable cause.
    pub fn executor(cause: impl std::fmt::Display) -> Self {
        Self::Executor(cause.to_string())
    }

    pub(crate) fn invalid_value(expected: &'static str, found: &serde_json::Value) -> Self {
        let found = match found {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        Self::InvalidValue {
            expected,
            found: found.to_string(),
        }
    }
}

impl From<serde_json::Error> for FormError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Crate-wide result alias.
pub type Result<T, E = FormError> = std::result::Result<T, E>;
