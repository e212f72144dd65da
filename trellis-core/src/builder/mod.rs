//! Config Builder
//!
//! Builds control trees from a declarative description. A
//! [`ControlConfig`] tree names its executors; a [`Registry`] maps those
//! names to factories; [`FormBuilder`] walks the tree and wires the two
//! together.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use trellis_core::builder::{ControlConfig, FormBuilder, Registry};
//! use trellis_core::{executor, Control, Message};
//!
//! let registry = Registry::new().with_validator("required", |_, _, _| {
//!     Some(executor::from_fn(|control: &Control| {
//!         control.value().is_null().then(|| Message::keyed("required", "required"))
//!     }))
//! });
//!
//! let config = ControlConfig::from_json(r#"{
//!     "type": "group",
//!     "fields": [{ "type": "text", "name": "email", "validators": [{ "name": "required" }] }]
//! }"#).unwrap();
//!
//! let form = FormBuilder::new(&registry).build(&config).unwrap();
//! assert!(!form.valid());
//!
//! form.get("email").unwrap().set_value(json!("a@b.c")).unwrap();
//! assert!(form.valid());
//! ```
//!
//! Names missing from the registry are skipped with a warning.

mod config;
mod registry;
mod visitor;

pub use config::{ControlConfig, ExecutorRef};
pub use registry::{Factory, Registry};
pub use visitor::FormBuilder;
