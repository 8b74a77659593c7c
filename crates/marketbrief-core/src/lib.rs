//! # Marketbrief Core
//!
//! Data-access resilience layer for the marketbrief dashboard backend.
//!
//! ## Overview
//!
//! Every market-data accessor in the surrounding service goes through this
//! crate instead of calling a provider directly:
//!
//! - **Cache store** with per-key TTLs, lazy sweeps, and a hard size bound
//! - **Fallback router** that tries sources in priority order and promotes
//!   whichever one is actually working
//! - **Rate-limited retry client** that spaces remote calls process-wide
//!   and retries transient failures with capped backoff
//! - **Trading calendar** that lengthens cache lifetimes outside sessions
//! - **Source registry** persisting the preferred provider across restarts
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | TTL cache with lazy and size-bound eviction |
//! | [`calendar`] | A-share trading-session calendar |
//! | [`client`] | Rate-limited retry client and fan-out helper |
//! | [`error`] | Fetch and preference error types |
//! | [`fallback`] | Source fallback orchestration and promotion |
//! | [`registry`] | Source identifiers and persisted preference |
//! | [`retry`] | Backoff schedule and transient-error classifier |
//! | [`throttle`] | Process-wide minimum request spacing |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use marketbrief_core::{
//!     FallbackRouter, FetchClient, FetchFn, JsonFileStore, SourceId, SourceRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(SourceRegistry::new(Arc::new(JsonFileStore::new(
//!         "data_source_config.json",
//!     ))));
//!     let router = FallbackRouter::new(registry, FetchClient::default());
//!
//!     let mut funcs: HashMap<SourceId, FetchFn<serde_json::Value>> = HashMap::new();
//!     funcs.insert(SourceId::Sina, Box::new(|| Box::pin(fetch_fund_flow_sina())));
//!     funcs.insert(SourceId::Eastmoney, Box::new(|| Box::pin(fetch_fund_flow_em())));
//!
//!     if let Some((rows, source)) = router.fetch_with_fallback(&funcs, "fund flow").await {
//!         println!("{} rows from {source}", rows.as_array().map_or(0, |a| a.len()));
//!     }
//! }
//! ```
//!
//! ## Failure semantics
//!
//! Failures are recovered locally at every layer: the client retries
//! transient errors, the router falls back across sources, and only full
//! exhaustion surfaces — always as `None`, never as a panic or an error
//! crossing the crate boundary.

pub mod cache;
pub mod calendar;
pub mod client;
pub mod error;
pub mod fallback;
pub mod registry;
pub mod retry;
pub mod throttle;

// Re-export commonly used types at crate root for convenience

pub use cache::{CacheConfig, CacheStats, CacheStore};
pub use calendar::{TradingCalendar, TradingHours};
pub use client::{FetchClient, FetchFn, FetchFuture};
pub use error::{FetchError, PreferenceError};
pub use fallback::{FallbackRouter, SourceProbe, Tabular};
pub use registry::{JsonFileStore, MemoryStore, PreferenceStore, SourceId, SourceRegistry};
pub use retry::{Backoff, RetryPolicy, TransientClassifier};
pub use throttle::RateGate;
