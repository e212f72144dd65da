//! Search pipeline timing.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;

const DEFAULT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_RESOLVE_WINDOW_MS: u64 = 100;

/// Timing of the search pipeline.
///
/// Serialized with millisecond fields:
///
/// ```json
/// { "debounce_ms": 300, "resolve_window_ms": 50 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Quiet period a search request must survive before it runs.
    #[serde(rename = "debounce_ms", with = "millis", default = "default_debounce")]
    pub debounce: Duration,

    /// Window over which resolve requests for one key are merged.
    #[serde(
        rename = "resolve_window_ms",
        with = "millis",
        default = "default_resolve_window"
    )]
    pub resolve_window: Duration,
}

impl SearchConfig {
    pub fn new(debounce: Duration, resolve_window: Duration) -> Self {
        Self {
            debounce,
            resolve_window,
        }
    }

    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            resolve_window: default_resolve_window(),
        }
    }
}

fn default_debounce() -> Duration {
    Duration::from_millis(DEFAULT_DEBOUNCE_MS)
}

fn default_resolve_window() -> Duration {
    Duration::from_millis(DEFAULT_RESOLVE_WINDOW_MS)
}

mod millis {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
