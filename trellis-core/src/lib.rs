//! Trellis Core
//!
//! This crate provides the engine of the Trellis form framework: a reactive
//! tree of form controls that keeps values, validation and derived state
//! consistent as values change and asynchronous computations resolve.
//! It implements:
//!
//! - Observable state holders (signals) and executor pipelines
//! - The control tree: items, fields, groups and arrays
//! - A keyed debounce/batching pipeline for remote option search
//! - A builder that turns declarative config trees into controls
//!
//! Trellis does no rendering. UI layers read control state and subscribe to
//! its streams.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: signals, latest-value combination and executor pipelines
//! - `tree`: the arena holding parent/child edges
//! - `executor`: the executor contract and its reducers
//! - `control`: the control handles and the update protocol
//! - `search`: the search/resolve pipeline
//! - `builder`: config, registry and the tree builder
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use trellis_core::{executor, Control, ControlOptions, GroupControl, Message};
//!
//! let required = executor::from_fn(|control: &Control| {
//!     (control.value() == "").then(|| Message::keyed("required", "required"))
//! });
//! let name = Control::field_with(json!("Ann"), ControlOptions::new().validator(required)).unwrap();
//! let form = GroupControl::new([("name", name.clone())]);
//!
//! name.set_value(json!("")).unwrap();
//! assert!(!form.valid());
//! assert_eq!(form.value(), json!({"name": ""}));
//! ```

pub mod builder;
pub mod control;
pub mod error;
pub mod executor;
pub mod reactive;
pub mod search;
pub mod tree;

pub use builder::{ControlConfig, FormBuilder, Registry};
pub use control::{
    ArrayControl, ArrayFactory, Control, ControlOptions, ControlState, Extras, GroupControl, Hints,
    Message, Messages,
};
pub use error::{FormError, Result};
pub use executor::{Executor, Output};
pub use search::{SearchConfig, SearchPipeline, SearchRequest, SearchResolver, SearchResult};
pub use tree::{ControlId, ControlKind};
