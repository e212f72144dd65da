//! Reactive Primitives
//!
//! This module implements the reactive building blocks the control tree is
//! made of: signals, subscribers, and executor pipelines.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for the current value of one facet of a control
//! (its value, its errors, its hints, ...). Reading is synchronous; writes
//! notify callbacks immediately and wake stream consumers, which always see
//! the current value first.
//!
//! ## Pipelines
//!
//! A Pipeline runs one list of executors for one control. Executors may
//! answer with a plain value, a future or a stream; the pipeline combines
//! them by latest value and publishes the combined result. Installing a new
//! executor list restarts the pipeline, cancelling whatever was in flight.
//!
//! # Implementation Notes
//!
//! Scheduling is cooperative. Whatever can be computed synchronously is
//! computed before the triggering call returns; only genuinely pending work
//! is handed to the ambient tokio runtime.

mod combine;
mod pipeline;
mod signal;
mod subscriber;

pub use combine::combine_latest;
pub use pipeline::{Completion, Pipeline};
pub use signal::Signal;
pub use subscriber::{Subscriber, SubscriberId};
