//! Pipeline Implementation
//!
//! A Pipeline drives one list of executors for one control: it combines the
//! executors' streams, hands every combined emission to a callback, and is
//! restarted from scratch whenever the executor list changes.
//!
//! # How Pipelines Work
//!
//! 1. `start` stops the previous run and bumps the generation counter.
//!
//! 2. The combined stream is polled synchronously for as long as it is
//!    immediately ready. Plain-value executors therefore settle inside the
//!    method that started the pipeline.
//!
//! 3. If the stream is still pending, the rest of it runs as a task on the
//!    ambient tokio runtime.
//!
//! 4. Every emission is checked against the generation it was started with.
//!    Emissions from a superseded run are dropped, so a result from an old
//!    executor list is never published after a new list is installed.
//!
//! # Completion
//!
//! Hint, extra, message and disabler pipelines keep running for as long as
//! their executors emit. Validator and trigger pipelines finish after the
//! first combined emission.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::stream::{BoxStream, StreamExt};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::combine::combine_latest;
use crate::error::{FormError, Result};

/// When a pipeline run is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Keep publishing until the executors' streams end.
    Continuous,

    /// Publish the first combined emission, then stop.
    FirstEmission,
}

/// A restartable executor pipeline.
pub struct Pipeline {
    /// Name used in logs and `NoRuntime` errors.
    name: &'static str,

    /// Incremented by every `start` and `stop`.
    generation: Arc<AtomicU64>,

    /// The spawned remainder of the current run, if any.
    task: Arc<Mutex<Option<JoinHandle<()>>>>,

    /// Whether the pipeline has been disposed.
    disposed: Arc<AtomicBool>,

    /// Number of emissions delivered across all runs.
    emissions: Arc<AtomicUsize>,
}

impl Pipeline {
    /// Create an idle pipeline.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: Arc::new(AtomicU64::new(0)),
            task: Arc::new(Mutex::new(None)),
            disposed: Arc::new(AtomicBool::new(false)),
            emissions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the pipeline's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Start a new run over the given executor streams.
    ///
    /// `on_emit` receives each combined emission. `on_fault` receives the
    /// first executor error, after which the run ends. A fault raised before
    /// this method returns is also returned as `Err`.
    pub fn start<T, E, F>(
        &self,
        streams: Vec<BoxStream<'static, Result<T>>>,
        completion: Completion,
        on_emit: E,
        on_fault: F,
    ) -> Result<()>
    where
        T: Clone + Send + 'static,
        E: Fn(Vec<T>) + Send + Sync + 'static,
        F: Fn(FormError) + Send + Sync + 'static,
    {
        self.stop();
        if self.is_disposed() {
            return Ok(());
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let mut combined = combine_latest(streams);

        loop {
            if !self.is_current(generation) {
                return Ok(());
            }
            match combined.next().now_or_never() {
                Some(Some(Ok(values))) => {
                    self.emissions.fetch_add(1, Ordering::SeqCst);
                    tracing::trace!(pipeline = self.name, "synchronous emission");
                    on_emit(values);
                    if completion == Completion::FirstEmission {
                        return Ok(());
                    }
                }
                Some(Some(Err(err))) => {
                    on_fault(err.clone());
                    return Err(err);
                }
                Some(None) => return Ok(()),
                None => break,
            }
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                let err = FormError::NoRuntime(self.name);
                on_fault(err.clone());
                return Err(err);
            }
        };

        let generation_counter = Arc::clone(&self.generation);
        let emissions = Arc::clone(&self.emissions);
        let name = self.name;
        let task = runtime.spawn(async move {
            while let Some(item) = combined.next().await {
                if generation_counter.load(Ordering::SeqCst) != generation {
                    break;
                }
                match item {
                    Ok(values) => {
                        emissions.fetch_add(1, Ordering::SeqCst);
                        tracing::trace!(pipeline = name, "asynchronous emission");
                        on_emit(values);
                        if completion == Completion::FirstEmission {
                            break;
                        }
                    }
                    Err(err) => {
                        on_fault(err);
                        break;
                    }
                }
            }
        });

        let mut slot = self.task.lock();
        if self.is_current(generation) {
            *slot = Some(task);
        } else {
            task.abort();
        }
        Ok(())
    }

    /// Cancel the current run.
    ///
    /// Pending emissions of the cancelled run are never delivered.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// Stop the pipeline for good. Later `start` calls do nothing.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.stop();
    }

    /// Check if the pipeline has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Check whether a spawned run is still in flight.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Get the number of emissions delivered so far.
    pub fn emission_count(&self) -> usize {
        self.emissions.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("emission_count", &self.emission_count())
            .field("running", &self.is_running())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future;
    use futures_util::stream;
    use parking_lot::Mutex as PlMutex;
    use tokio::sync::oneshot;

    fn ready<T: Send + 'static>(value: T) -> BoxStream<'static, Result<T>> {
        stream::once(future::ready(Ok(value))).boxed()
    }

    fn recorder<T: Send + 'static>() -> (Arc<PlMutex<Vec<Vec<T>>>>, impl Fn(Vec<T>) + Send + Sync) {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |values| sink.lock().push(values))
    }

    #[test]
    fn synchronous_executors_settle_inside_start() {
        let pipeline = Pipeline::new("hints");
        let (seen, on_emit) = recorder();

        pipeline
            .start(vec![ready(1), ready(2)], Completion::Continuous, on_emit, |_| {})
            .unwrap();

        assert_eq!(*seen.lock(), vec![vec![1, 2]]);
        assert_eq!(pipeline.emission_count(), 1);
        assert!(!pipeline.is_running());
    }

    #[test]
    fn first_emission_completion_ignores_later_values() {
        let pipeline = Pipeline::new("validators");
        let (seen, on_emit) = recorder();
        let many = stream::iter(vec![Ok(1), Ok(2), Ok(3)]).boxed();

        pipeline
            .start(vec![many], Completion::FirstEmission, on_emit, |_| {})
            .unwrap();

        assert_eq!(*seen.lock(), vec![vec![1]]);
    }

    #[test]
    fn pending_executor_without_runtime_fails() {
        let pipeline = Pipeline::new("validators");
        let faults = Arc::new(PlMutex::new(Vec::new()));
        let sink = faults.clone();
        let pending = stream::pending::<Result<i32>>().boxed();

        let result = pipeline.start(vec![pending], Completion::FirstEmission, |_| {}, move |err| {
            sink.lock().push(err)
        });

        assert_eq!(result, Err(FormError::NoRuntime("validators")));
        assert_eq!(*faults.lock(), vec![FormError::NoRuntime("validators")]);
    }

    #[test]
    fn synchronous_fault_is_returned() {
        let pipeline = Pipeline::new("hints");
        let failing = stream::once(future::ready(Err::<i32, _>(FormError::executor("bad"))))
            .boxed();
        let result = pipeline.start(vec![failing], Completion::Continuous, |_| {}, |_| {});
        assert_eq!(result, Err(FormError::executor("bad")));
    }

    #[tokio::test]
    async fn restart_discards_stale_results() {
        let pipeline = Pipeline::new("validators");
        let (seen, on_emit) = recorder::<&'static str>();
        let (stale_tx, stale_rx) = oneshot::channel::<&'static str>();
        let stale = stream::once(async move { Ok(stale_rx.await.unwrap_or("dropped")) }).boxed();

        pipeline
            .start(vec![stale], Completion::FirstEmission, on_emit, |_| {})
            .unwrap();
        assert!(pipeline.is_running());

        let (fresh_seen, fresh_emit) = recorder::<&'static str>();
        pipeline
            .start(vec![ready("fresh")], Completion::FirstEmission, fresh_emit, |_| {})
            .unwrap();

        let _ = stale_tx.send("stale");
        tokio::task::yield_now().await;

        assert!(seen.lock().is_empty());
        assert_eq!(*fresh_seen.lock(), vec![vec!["fresh"]]);
    }

    #[tokio::test]
    async fn asynchronous_emission_is_delivered() {
        let pipeline = Pipeline::new("extras");
        let (seen, on_emit) = recorder::<u8>();
        let (tx, rx) = oneshot::channel::<u8>();
        let later = stream::once(async move { Ok(rx.await.unwrap_or(0)) }).boxed();

        pipeline
            .start(vec![ready(1), later], Completion::Continuous, on_emit, |_| {})
            .unwrap();
        assert!(seen.lock().is_empty());

        tx.send(2).unwrap();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        assert_eq!(*seen.lock(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn disposed_pipeline_does_not_start() {
        let pipeline = Pipeline::new("triggers");
        let (seen, on_emit) = recorder::<u8>();
        pipeline.dispose();
        assert!(pipeline.is_disposed());

        pipeline
            .start(vec![ready(1)], Completion::FirstEmission, on_emit, |_| {})
            .unwrap();
        assert!(seen.lock().is_empty());
    }
}
