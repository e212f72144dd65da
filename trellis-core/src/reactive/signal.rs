//! Signal Implementation
//!
//! A Signal is the state-holding primitive every control is built from. It
//! holds the current value, replays it to new consumers, and pushes every
//! later value to them.
//!
//! # How Signals Work
//!
//! 1. `set` stores the value, runs the synchronous subscriber callbacks, and
//!    wakes every stream consumer.
//!
//! 2. Stream consumers (`watch` / `stream`) always observe the current value
//!    first, then each later value. Intermediate values may be skipped if a
//!    consumer is slow; the latest value is never lost.
//!
//! 3. `complete` terminates all streams. The signal keeps answering `get`.
//!
//! # Thread Safety
//!
//! The value sits behind a `parking_lot::RwLock`, and callbacks are cloned
//! out of their list before they run, so a callback may freely read or write
//! the signal that invoked it.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use super::subscriber::{Subscriber, SubscriberId};

/// Counter for generating unique signal IDs.
static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique signal ID.
fn next_signal_id() -> u64 {
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A reactive current-value holder.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
///
/// // Equal values are not re-published
/// assert!(!count.set_if_changed(5));
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Unique identifier for this signal.
    id: u64,

    /// The current value.
    value: Arc<RwLock<T>>,

    /// Feeds stream consumers. `None` once the signal is completed.
    sender: Arc<Mutex<Option<watch::Sender<T>>>>,

    /// Synchronous callbacks, in registration order.
    subscribers: Arc<RwLock<Vec<Subscriber<T>>>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        let (sender, _) = watch::channel(value.clone());
        Self {
            id: next_signal_id(),
            value: Arc::new(RwLock::new(value)),
            sender: Arc::new(Mutex::new(Some(sender))),
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        *self.value.write() = value.clone();

        if let Some(sender) = self.sender.lock().as_ref() {
            sender.send_replace(value.clone());
        }

        self.notify_subscribers(&value);
    }

    /// Update the value using a function.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Register a notification callback.
    ///
    /// The callback runs synchronously inside every later `set`. It does not
    /// receive the current value; use [`stream`](Self::stream) for replay.
    pub fn subscribe<F>(&self, notify: F) -> SubscriberId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let subscriber = Subscriber::new(notify);
        let id = subscriber.id();
        self.subscribers.write().push(subscriber);
        id
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.subscribers
            .write()
            .retain(|subscriber| subscriber.id() != subscriber_id);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Receiver that observes the current value and every later one.
    ///
    /// The receiver reports the channel as closed once the signal completes.
    pub fn watch(&self) -> watch::Receiver<T> {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = watch::channel(self.get());
                drop(sender);
                receiver
            }
        }
    }

    /// Stream of values, starting with the current one.
    pub fn stream(&self) -> BoxStream<'static, T> {
        let receiver = self.watch();
        stream::unfold((receiver, true), |(mut receiver, first)| async move {
            if !first && receiver.changed().await.is_err() {
                return None;
            }
            let value = receiver.borrow_and_update().clone();
            Some((value, (receiver, false)))
        })
        .boxed()
    }

    /// Terminate all streams and drop every subscriber.
    ///
    /// Idempotent. The stored value stays readable.
    pub fn complete(&self) {
        self.sender.lock().take();
        self.subscribers.write().clear();
    }

    /// Check whether [`complete`](Self::complete) has been called.
    pub fn is_completed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Notify all subscribers that the value has changed.
    fn notify_subscribers(&self, value: &T) {
        let subscribers = self.subscribers.read().clone();
        for subscriber in subscribers.iter() {
            subscriber.notify(value);
        }
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Set the value only if it differs from the current one.
    ///
    /// Returns whether the value was published.
    pub fn set_if_changed(&self, value: T) -> bool {
        if *self.value.read() == value {
            return false;
        }
        self.set(value);
        true
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            sender: Arc::clone(&self.sender),
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.get())
            .field("subscriber_count", &self.subscriber_count())
            .field("completed", &self.is_completed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
