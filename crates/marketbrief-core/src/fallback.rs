//! Provider fallback orchestration with preference promotion.
//!
//! The single entry point accessors use instead of calling a provider
//! directly: try the preferred source, then the rest in canonical order,
//! validate each payload, and promote the first non-preferred source that
//! delivers. Exhaustion is a normal, reportable outcome, never an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::client::{FetchClient, FetchFn};
use crate::registry::{SourceId, SourceRegistry};

/// Payload that can be judged empty for fallback validation. An empty
/// tabular result is treated like a failed fetch: the caller needs rows,
/// and the next source may still have them.
pub trait Tabular {
    fn row_count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
}

impl<T> Tabular for Vec<T> {
    fn row_count(&self) -> usize {
        self.len()
    }
}

impl Tabular for Value {
    fn row_count(&self) -> usize {
        match self {
            Value::Array(rows) => rows.len(),
            Value::Object(fields) => fields.len(),
            Value::Null => 0,
            _ => 1,
        }
    }
}

/// Availability report for a single source, for the diagnostics surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceProbe {
    pub source: SourceId,
    pub available: bool,
    pub rows: usize,
    pub error: Option<String>,
}

/// Payload cached together with the source that produced it, so cache hits
/// can report provenance just like live fetches.
#[derive(Serialize, Deserialize)]
struct CachedFetch<T> {
    source: SourceId,
    payload: T,
}

/// Orchestrates fetches across data sources.
pub struct FallbackRouter {
    registry: Arc<SourceRegistry>,
    client: FetchClient,
}

impl FallbackRouter {
    pub fn new(registry: Arc<SourceRegistry>, client: FetchClient) -> Self {
        Self { registry, client }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Try each source in priority order until one yields a non-empty
    /// payload.
    ///
    /// Priority is the persisted preference first, then the canonical
    /// [`SourceId::ALL`] order, restricted to sources present in
    /// `fetch_funcs`. The first valid result wins and later sources are not
    /// attempted. When a non-preferred source wins and the preferred source
    /// was actually attempted for this query, the winner is promoted as the
    /// new preference. Returns `None` when every source fails; both halves
    /// of the result are always present together.
    pub async fn fetch_with_fallback<T: Tabular>(
        &self,
        fetch_funcs: &HashMap<SourceId, FetchFn<T>>,
        description: &str,
    ) -> Option<(T, SourceId)> {
        if fetch_funcs.is_empty() {
            return None;
        }

        let preferred = self.registry.preference();
        let preferred_attempted = fetch_funcs.contains_key(&preferred);

        for source in priority_chain(preferred, fetch_funcs) {
            let Some(fetch) = fetch_funcs.get(&source) else {
                continue;
            };
            debug!(source = %source, description, "attempting fetch");

            match self.client.call_with_retry(fetch).await {
                Some(payload) if !payload.is_empty() => {
                    if source != preferred && preferred_attempted {
                        info!(
                            from = %preferred,
                            to = %source,
                            description,
                            "preferred source failed, promoting fallback source"
                        );
                        self.registry.set_preference(source);
                    }
                    return Some((payload, source));
                }
                Some(_) => {
                    warn!(source = %source, description, "source returned an empty payload");
                }
                None => {
                    warn!(source = %source, description, "source fetch failed");
                }
            }
        }

        warn!(description, preferred = %preferred, "all sources exhausted, no data");
        None
    }

    /// Read-through variant: serve from the cache when possible, otherwise
    /// fall back across sources and cache the winning payload under `key`.
    ///
    /// A `ttl` of `None` uses the cache's prefix-based default for the key.
    pub async fn fetch_cached<T>(
        &self,
        cache: &CacheStore,
        key: &str,
        ttl: Option<Duration>,
        fetch_funcs: &HashMap<SourceId, FetchFn<T>>,
        description: &str,
    ) -> Option<(T, SourceId)>
    where
        T: Tabular + Serialize + DeserializeOwned,
    {
        if let Some(value) = cache.get(key).await {
            match serde_json::from_value::<CachedFetch<T>>(value) {
                Ok(hit) => {
                    debug!(key, source = %hit.source, "served from cache");
                    return Some((hit.payload, hit.source));
                }
                // malformed entries are cache misses
                Err(err) => debug!(key, error = %err, "discarding malformed cache entry"),
            }
        }

        let (payload, source) = self.fetch_with_fallback(fetch_funcs, description).await?;
        let cached = CachedFetch { source, payload };
        match serde_json::to_value(&cached) {
            Ok(value) => cache.set(key, value, ttl).await,
            Err(err) => warn!(key, error = %err, "payload not serializable, skipping cache"),
        }
        Some((cached.payload, cached.source))
    }

    /// Probe a single source's availability without touching the preference.
    pub async fn probe<T: Tabular>(&self, source: SourceId, fetch: &FetchFn<T>) -> SourceProbe {
        match self.client.call_with_retry(fetch).await {
            Some(payload) if !payload.is_empty() => SourceProbe {
                source,
                available: true,
                rows: payload.row_count(),
                error: None,
            },
            Some(_) => SourceProbe {
                source,
                available: false,
                rows: 0,
                error: Some("source returned an empty payload".into()),
            },
            None => SourceProbe {
                source,
                available: false,
                rows: 0,
                error: Some("fetch failed after retries".into()),
            },
        }
    }
}

/// Preferred source first, then the canonical order, restricted to the
/// sources this query actually has closures for.
fn priority_chain<T>(preferred: SourceId, funcs: &HashMap<SourceId, FetchFn<T>>) -> Vec<SourceId> {
    let mut chain = Vec::with_capacity(SourceId::ALL.len());
    if funcs.contains_key(&preferred) {
        chain.push(preferred);
    }
    for source in SourceId::ALL {
        if source != preferred && funcs.contains_key(&source) {
            chain.push(source);
        }
    }
    chain
}
