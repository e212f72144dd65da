//! Search and Resolve
//!
//! Controls that offer options from a remote source (autocompletes,
//! lookups) share one [`SearchPipeline`]. Requests carry an opaque key; the
//! pipeline debounces searches and merges resolves per key, then hands each
//! coalesced group to its [`SearchResolver`] and emits one [`SearchResult`].
//!
//! # Example
//!
//! ```rust,no_run
//! use trellis_core::search::{SearchConfig, SearchPipeline};
//!
//! # async fn demo() {
//! let (pipeline, mut results) = SearchPipeline::new(SearchConfig::default());
//! // pipeline.submit(request)?;
//! while let Some(result) = results.recv().await {
//!     println!("{}: {:?}", result.key, result.result);
//! }
//! # drop(pipeline);
//! # }
//! ```

mod config;
mod pipeline;
mod request;

pub use config::SearchConfig;
pub use pipeline::{SearchPipeline, SearchResults};
pub use request::{Query, ResolveQuery, SearchQuery, SearchRequest, SearchResolver, SearchResult};
