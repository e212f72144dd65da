//! Executors
//!
//! An executor is a function of a control that computes one derived facet:
//! a validator's errors, a hinter's flag, a disabler's verdict, and so on.
//! Every family shares one shape:
//!
//! ```text
//! (control) -> value | future(value) | stream(value)
//! ```
//!
//! [`Output`] captures the three answers, and [`Output::into_stream`]
//! normalises all of them into a stream so pipelines can treat every
//! executor alike.
//!
//! # Example
//!
//! ```rust
//! use trellis_core::executor::{self, Validator};
//! use trellis_core::Message;
//!
//! let required: Validator = executor::from_fn(|control| {
//!     if control.value() == "" {
//!         Some(Message::keyed("required", "required"))
//!     } else {
//!         None
//!     }
//! });
//! ```

mod reduce;

pub use reduce::{any_true, merge_extras, merge_messages, reduce_hints};

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;

use crate::control::{Control, Extras, Messages};
use crate::error::Result;

/// What an executor answers with.
pub enum Output<T> {
    /// A synchronous value.
    Value(T),

    /// A single value that arrives later.
    Future(BoxFuture<'static, Result<T>>),

    /// Any number of values over time.
    Stream(BoxStream<'static, Result<T>>),
}

impl<T> Output<T>
where
    T: Send + 'static,
{
    /// Wrap a synchronous value.
    pub fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// Wrap a future.
    pub fn future<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self::Future(fut.boxed())
    }

    /// Wrap a stream.
    pub fn stream<S>(values: S) -> Self
    where
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        Self::Stream(values.boxed())
    }

    /// Normalise into a stream.
    pub fn into_stream(self) -> BoxStream<'static, Result<T>> {
        match self {
            Self::Value(value) => stream::once(future::ready(Ok(value))).boxed(),
            Self::Future(fut) => stream::once(fut).boxed(),
            Self::Stream(values) => values,
        }
    }

    /// Wait for the first value. `None` if a stream ends without one.
    pub async fn first(self) -> Option<Result<T>> {
        match self {
            Self::Value(value) => Some(Ok(value)),
            Self::Future(fut) => Some(fut.await),
            Self::Stream(mut values) => values.next().await,
        }
    }
}

impl<T> std::fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shape = match self {
            Self::Value(_) => "Value",
            Self::Future(_) => "Future",
            Self::Stream(_) => "Stream",
        };
        f.debug_tuple("Output").field(&shape).finish()
    }
}

/// A function of a control producing values of type `T`.
///
/// Executors are stateless from the engine's point of view and are invoked
/// with the owning control as sole argument. Returning `Err` is an executor
/// fault, not a validation result.
pub trait Executor<T>: Send + Sync {
    /// Evaluate against the owning control.
    fn evaluate(&self, control: &Control) -> Result<Output<T>>;
}

impl<T, F> Executor<T> for F
where
    F: Fn(&Control) -> Result<Output<T>> + Send + Sync,
{
    fn evaluate(&self, control: &Control) -> Result<Output<T>> {
        self(control)
    }
}

/// A shared executor.
pub type SharedExecutor<T> = Arc<dyn Executor<T>>;

/// A named boolean flag, e.g. `("visible", true)`.
pub type Hint = (String, bool);

/// Produces one hint.
pub type Hinter = SharedExecutor<Hint>;

/// Produces a partial extras map.
pub type Extraer = SharedExecutor<Extras>;

/// Produces informational messages, or `None`.
pub type Messager = SharedExecutor<Option<Messages>>;

/// Produces validation errors, or `None` when valid.
pub type Validator = SharedExecutor<Option<Messages>>;

/// Runs a side effect. Its output is ignored.
pub type Trigger = SharedExecutor<()>;

/// Produces whether the control should be disabled.
pub type Disabler = SharedExecutor<bool>;

/// Executor answering synchronously.
pub fn from_fn<T, F>(f: F) -> SharedExecutor<T>
where
    T: Send + 'static,
    F: Fn(&Control) -> T + Send + Sync + 'static,
{
    Arc::new(move |control: &Control| -> Result<Output<T>> {
        Ok(Output::Value(f(control)))
    })
}

/// Executor answering with a future.
pub fn from_future<T, F, Fut>(f: F) -> SharedExecutor<T>
where
    T: Send + 'static,
    F: Fn(&Control) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(move |control: &Control| -> Result<Output<T>> {
        Ok(Output::future(f(control)))
    })
}

/// Executor answering with a stream of values.
pub fn from_stream<T, F, S>(f: F) -> SharedExecutor<T>
where
    T: Send + 'static,
    F: Fn(&Control) -> S + Send + Sync + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    Arc::new(move |control: &Control| -> Result<Output<T>> {
        Ok(Output::stream(f(control).map(Ok)))
    })
}

/// Executor that recomputes from the control's value every time it changes.
pub fn watch_value<T, F>(f: F) -> SharedExecutor<T>
where
    T: Send + 'static,
    F: Fn(&Value) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    from_stream(move |control: &Control| {
        let f = Arc::clone(&f);
        control.value_stream().map(move |value| f(&value))
    })
}

/// Evaluate every executor and normalise the outputs into streams.
///
/// Stops at the first synchronous fault.
pub(crate) fn evaluate_all<T>(
    executors: &[SharedExecutor<T>],
    control: &Control,
) -> Result<Vec<BoxStream<'static, Result<T>>>>
where
    T: Send + 'static,
{
    executors
        .iter()
        .map(|executor| executor.evaluate(control).map(Output::into_stream))
        .collect()
}
