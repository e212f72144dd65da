//! Requests, results and the resolver contract.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::control::Control;
use crate::error::{FormError, Result};
use crate::executor::Output;

/// A free-text option search.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub params: Value,
    pub control: Control,
}

/// A lookup of the options matching known values.
#[derive(Debug, Clone)]
pub struct ResolveQuery {
    pub values: Vec<Value>,
    pub params: Value,
    pub control: Control,
}

/// Looks up options for a control, typically from a remote service.
///
/// Both methods answer like an executor; the first emission is the result.
pub trait SearchResolver: Send + Sync {
    fn search(&self, query: &SearchQuery) -> Result<Output<Vec<Value>>>;

    fn resolve(&self, query: &ResolveQuery) -> Result<Output<Vec<Value>>>;
}

/// What a request asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Search by text. Debounced per key.
    Search(String),

    /// Resolve known values. Buffered and merged per key.
    Resolve(Vec<Value>),
}

/// One request entering the search pipeline.
#[derive(Clone)]
pub struct SearchRequest {
    /// Requests sharing a key are debounced or merged together.
    pub key: String,
    pub query: Query,
    pub control: Control,
    pub params: Value,
    pub resolver: Arc<dyn SearchResolver>,
}

impl SearchRequest {
    pub fn new(
        key: impl Into<String>,
        query: Query,
        control: Control,
        resolver: Arc<dyn SearchResolver>,
    ) -> Self {
        Self {
            key: key.into(),
            query,
            control,
            params: Value::Null,
            resolver,
        }
    }

    /// A request using the resolver attached to `control`.
    pub fn for_control(key: impl Into<String>, query: Query, control: &Control) -> Result<Self> {
        let resolver = control.search_resolver().ok_or_else(|| {
            FormError::Config(format!("control {} has no search resolver", control.id()))
        })?;
        Ok(Self::new(key, query, control.clone(), resolver))
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

impl fmt::Debug for SearchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchRequest")
            .field("key", &self.key)
            .field("query", &self.query)
            .field("control", &self.control.id())
            .field("params", &self.params)
            .finish()
    }
}

/// The outcome of one coalesced request group.
///
/// Carries the fields of the request that was executed. For a resolve batch
/// that is the latest request, with `query` holding the merged values.
#[derive(Clone)]
pub struct SearchResult {
    pub key: String,
    pub query: Query,
    pub control: Control,
    pub params: Value,
    pub resolver: Arc<dyn SearchResolver>,
    pub result: Result<Vec<Value>>,
}

impl SearchResult {
    pub(crate) fn from_request(request: SearchRequest, result: Result<Vec<Value>>) -> Self {
        Self {
            key: request.key,
            query: request.query,
            control: request.control,
            params: request.params,
            resolver: request.resolver,
            result,
        }
    }
}

impl fmt::Debug for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchResult")
            .field("key", &self.key)
            .field("query", &self.query)
            .field("control", &self.control.id())
            .field("params", &self.params)
            .field("result", &self.result)
            .finish()
    }
}
