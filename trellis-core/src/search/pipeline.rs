//! Per-key debounce and batching of search requests.
//!
//! Every key owns a small scheduler entry holding at most one pending
//! search and one pending resolve batch:
//!
//! - A search request replaces the pending search of its key and restarts
//!   the debounce timer. Only a request that survives the full debounce
//!   window reaches the resolver.
//! - A resolve request opens a batch if none is pending, otherwise its values
//!   are merged into the open batch. The batch is flushed once when its
//!   window closes.
//!
//! Keys never share timers, so interleaved keys are debounced independently.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures_util::stream::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::config::SearchConfig;
use super::request::{Query, ResolveQuery, SearchQuery, SearchRequest, SearchResult};
use crate::error::{FormError, Result};

/// A search awaiting its debounce timer.
struct Debounced {
    ticket: u64,
    request: SearchRequest,
    timer: JoinHandle<()>,
}

/// Resolve requests collected during one window.
struct Batch {
    request: SearchRequest,
    values: Vec<Value>,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct KeyGroup {
    search: Option<Debounced>,
    resolve: Option<Batch>,
}

impl KeyGroup {
    fn is_idle(&self) -> bool {
        self.search.is_none() && self.resolve.is_none()
    }

    fn abort(&mut self) {
        if let Some(search) = self.search.take() {
            search.timer.abort();
        }
        if let Some(batch) = self.resolve.take() {
            batch.timer.abort();
        }
    }
}

struct Shared {
    config: SearchConfig,
    groups: DashMap<String, KeyGroup>,
    sender: Mutex<Option<mpsc::UnboundedSender<SearchResult>>>,
    feeders: Mutex<Vec<JoinHandle<()>>>,
    tickets: AtomicU64,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    fn submit(self: &Arc<Self>, runtime: &Handle, request: SearchRequest) {
        if self.is_closed() {
            tracing::debug!(key = %request.key, "search pipeline closed, dropping request");
            return;
        }
        let values = match &request.query {
            Query::Search(_) => None,
            Query::Resolve(values) => Some(values.clone()),
        };
        match values {
            None => self.debounce(runtime, request),
            Some(values) => self.buffer(runtime, request, values),
        }
    }

    fn debounce(self: &Arc<Self>, runtime: &Handle, request: SearchRequest) {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let key = request.key.clone();

        let mut group = self.groups.entry(key.clone()).or_default();
        let shared = Arc::clone(self);
        let delay = self.config.debounce;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire_search(&key, ticket).await;
        });

        let next = Debounced {
            ticket,
            request,
            timer,
        };
        if let Some(previous) = group.search.replace(next) {
            previous.timer.abort();
            tracing::trace!(key = %group.key(), ticket = previous.ticket, "search superseded");
        }
    }

    fn buffer(self: &Arc<Self>, runtime: &Handle, request: SearchRequest, values: Vec<Value>) {
        let mut group = self.groups.entry(request.key.clone()).or_default();
        if let Some(batch) = group.resolve.as_mut() {
            merge_unique(&mut batch.values, values);
            batch.request = request;
            return;
        }

        let shared = Arc::clone(self);
        let key = request.key.clone();
        let window = self.config.resolve_window;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(window).await;
            shared.flush_resolve(&key).await;
        });

        let mut merged = Vec::with_capacity(values.len());
        merge_unique(&mut merged, values);
        group.resolve = Some(Batch {
            request,
            values: merged,
            timer,
        });
    }

    async fn fire_search(&self, key: &str, ticket: u64) {
        let request = {
            let Some(mut group) = self.groups.get_mut(key) else {
                return;
            };
            if group.search.as_ref().map(|pending| pending.ticket) != Some(ticket) {
                return;
            }
            group.search.take().map(|pending| pending.request)
        };
        self.remove_if_idle(key);
        let Some(request) = request else {
            return;
        };

        tracing::debug!(key, "running debounced search");
        let result = run_search(&request).await;
        self.publish(SearchResult::from_request(request, result));
    }

    async fn flush_resolve(&self, key: &str) {
        let batch = {
            let Some(mut group) = self.groups.get_mut(key) else {
                return;
            };
            group.resolve.take()
        };
        self.remove_if_idle(key);
        let Some(Batch {
            mut request,
            values,
            ..
        }) = batch
        else {
            return;
        };

        tracing::debug!(key, count = values.len(), "flushing resolve batch");
        request.query = Query::Resolve(values.clone());
        let result = run_resolve(&request, values).await;
        self.publish(SearchResult::from_request(request, result));
    }

    fn remove_if_idle(&self, key: &str) {
        self.groups.remove_if(key, |_, group| group.is_idle());
    }

    fn publish(&self, result: SearchResult) {
        if let Some(sender) = self.sender.lock().as_ref() {
            if sender.send(result).is_err() {
                tracing::trace!("search results receiver dropped");
            }
        }
    }

    fn shutdown(&self) {
        if self.sender.lock().take().is_none() {
            return;
        }
        for feeder in self.feeders.lock().drain(..) {
            feeder.abort();
        }
        self.groups.retain(|_, group| {
            group.abort();
            false
        });
        tracing::debug!("search pipeline shut down");
    }
}

async fn run_search(request: &SearchRequest) -> Result<Vec<Value>> {
    let text = match &request.query {
        Query::Search(text) => text.clone(),
        Query::Resolve(_) => String::new(),
    };
    let query = SearchQuery {
        text,
        params: request.params.clone(),
        control: request.control.clone(),
    };
    let output = request.resolver.search(&query)?;
    output.first().await.unwrap_or_else(|| Ok(Vec::new()))
}

async fn run_resolve(request: &SearchRequest, values: Vec<Value>) -> Result<Vec<Value>> {
    let query = ResolveQuery {
        values,
        params: request.params.clone(),
        control: request.control.clone(),
    };
    let output = request.resolver.resolve(&query)?;
    output.first().await.unwrap_or_else(|| Ok(Vec::new()))
}

/// Append values not already present, keeping arrival order.
fn merge_unique(into: &mut Vec<Value>, values: Vec<Value>) {
    for value in values {
        if !into.contains(&value) {
            into.push(value);
        }
    }
}

/// Groups, debounces and batches search requests by key.
///
/// Shut down explicitly with [`shutdown`](Self::shutdown) or by dropping the
/// pipeline; pending timers are cancelled either way.
pub struct SearchPipeline {
    shared: Arc<Shared>,
}

/// The result side of a [`SearchPipeline`].
///
/// Ends as soon as the pipeline shuts down. Results of searches still in
/// flight at that point are discarded.
pub struct SearchResults {
    receiver: mpsc::UnboundedReceiver<SearchResult>,
}

impl SearchPipeline {
    pub fn new(config: SearchConfig) -> (Self, SearchResults) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            groups: DashMap::new(),
            sender: Mutex::new(Some(sender)),
            feeders: Mutex::new(Vec::new()),
            tickets: AtomicU64::new(0),
        });
        (Self { shared }, SearchResults { receiver })
    }

    pub fn config(&self) -> SearchConfig {
        self.shared.config
    }

    /// Schedule one request. Needs an ambient tokio runtime for its timer.
    pub fn submit(&self, request: SearchRequest) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| FormError::NoRuntime("search"))?;
        self.shared.submit(&runtime, request);
        Ok(())
    }

    /// Feed every request of `requests` into the pipeline.
    pub fn connect<S>(&self, requests: S) -> Result<()>
    where
        S: Stream<Item = SearchRequest> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| FormError::NoRuntime("search"))?;
        let shared = Arc::clone(&self.shared);
        let handle = runtime.clone();
        let mut requests = requests.boxed();
        let feeder = runtime.spawn(async move {
            while let Some(request) = requests.next().await {
                shared.submit(&handle, request);
            }
        });
        self.shared.feeders.lock().push(feeder);
        Ok(())
    }

    /// Keys with a search or resolve waiting on its timer, sorted.
    pub fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .shared
            .groups
            .iter()
            .filter(|entry| !entry.is_idle())
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Cancel every pending timer and close the result stream.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.is_closed()
    }
}

impl Drop for SearchPipeline {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl std::fmt::Debug for SearchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchPipeline")
            .field("config", &self.shared.config)
            .field("pending_keys", &self.pending_keys())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl SearchResults {
    /// Wait for the next result.
    pub async fn recv(&mut self) -> Option<SearchResult> {
        self.receiver.recv().await
    }

    /// Take a result if one is ready.
    pub fn try_recv(&mut self) -> Option<SearchResult> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for SearchResults {
    type Item = SearchResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<SearchResult>> {
        self.receiver.poll_recv(cx)
    }
}
