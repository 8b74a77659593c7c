//! Time-aware TTL cache for market-data payloads.
//!
//! Entries expire lazily: reads delete expired entries they touch, and every
//! Nth write sweeps the whole store. A hard capacity bound evicts the oldest
//! entry by creation time, so the store never grows without bound even
//! without a background timer. Outside trading hours a whitelisted set of
//! key prefixes gets a TTL floor, because the underlying data cannot change
//! until the next session anyway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::calendar::TradingHours;

/// TTL resolution and eviction policy for a [`CacheStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL used when no prefix entry matches.
    pub default_ttl: Duration,
    /// Per-prefix default TTLs; the longest matching prefix wins.
    pub prefix_ttls: Vec<(String, Duration)>,
    /// Prefixes whose TTL is floored outside trading hours.
    pub non_trading_prefixes: Vec<String>,
    /// Minimum effective TTL for whitelisted prefixes while the market is closed.
    pub non_trading_floor: Duration,
    /// Every Nth `set` sweeps all expired entries. Zero disables the sweep.
    pub sweep_interval: u32,
    /// Hard bound on the number of entries.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            prefix_ttls: vec![
                ("index_overview".into(), Duration::from_secs(900)),
                ("market_radar".into(), Duration::from_secs(900)),
                ("fund_flow".into(), Duration::from_secs(1800)),
                ("hot_concepts".into(), Duration::from_secs(1800)),
                ("stock_diagnosis".into(), Duration::from_secs(60)),
                ("stock_list".into(), Duration::from_secs(3600)),
            ],
            non_trading_prefixes: vec![
                "index_overview".into(),
                "market_radar".into(),
                "fund_flow".into(),
                "hot_concepts".into(),
            ],
            non_trading_floor: Duration::from_secs(3600),
            sweep_interval: 10,
            capacity: 256,
        }
    }
}

/// Diagnostic snapshot returned by [`CacheStore::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub expired: usize,
    pub active: usize,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    set_count: u64,
}

impl CacheInner {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| entry.expires_at > now);
        before - self.map.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.created_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            debug!(key = %key, "cache at capacity, evicting oldest entry");
            self.map.remove(&key);
        }
    }
}

/// Thread-safe key/value cache with per-entry expiry.
///
/// Constructed explicitly with its policy and a calendar; independent
/// instances share nothing, so tests never fight over process globals.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
    config: CacheConfig,
    calendar: Arc<dyn TradingHours>,
}

impl CacheStore {
    pub fn new(config: CacheConfig, calendar: Arc<dyn TradingHours>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner::default())),
            config,
            calendar,
        }
    }

    /// Get a cached value if it exists and has not expired.
    ///
    /// Reading an expired entry deletes it as a side effect.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.write().await;
        match inner.map.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => {
                debug!(key, "cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                inner.map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert a value, resolving the TTL when none is given.
    ///
    /// TTL resolution: explicit `ttl`, else the longest matching prefix in
    /// the config table, else the default. Whitelisted prefixes are floored
    /// to `non_trading_floor` while the market is closed.
    pub async fn set(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let key = key.into();
        let ttl = self.effective_ttl(&key, ttl);
        let now = Instant::now();

        let mut inner = self.inner.write().await;
        inner.set_count += 1;
        if self.config.sweep_interval > 0
            && inner.set_count % u64::from(self.config.sweep_interval) == 0
        {
            let removed = inner.sweep(now);
            if removed > 0 {
                debug!(removed, "lazy sweep removed expired cache entries");
            }
        }
        if inner.map.len() >= self.config.capacity && !inner.map.contains_key(&key) {
            inner.evict_oldest();
        }

        debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set");
        inner.map.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Delete all entries, or only those whose key starts with `prefix`.
    /// Returns the number of entries removed.
    pub async fn clear(&self, prefix: Option<&str>) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.map.len();
        match prefix {
            Some(prefix) => inner.map.retain(|key, _| !key.starts_with(prefix)),
            None => inner.map.clear(),
        }
        before - inner.map.len()
    }

    /// Snapshot of the store without mutating it; expired entries are
    /// counted, not removed.
    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        let now = Instant::now();
        let total = inner.map.len();
        let expired = inner
            .map
            .values()
            .filter(|entry| entry.expires_at <= now)
            .count();
        let mut keys: Vec<String> = inner.map.keys().cloned().collect();
        keys.sort();

        CacheStats {
            total,
            expired,
            active: total - expired,
            keys,
        }
    }

    fn effective_ttl(&self, key: &str, requested: Option<Duration>) -> Duration {
        let ttl = requested.unwrap_or_else(|| self.resolve_default_ttl(key));

        let floored = self
            .config
            .non_trading_prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()));
        if floored && !self.calendar.is_trading_now() {
            return ttl.max(self.config.non_trading_floor);
        }
        ttl
    }

    fn resolve_default_ttl(&self, key: &str) -> Duration {
        self.config
            .prefix_ttls
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, ttl)| *ttl)
            .unwrap_or(self.config.default_ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedHours(bool);

    impl TradingHours for FixedHours {
        fn is_trading_now(&self) -> bool {
            self.0
        }
    }

    fn store_with(config: CacheConfig, trading: bool) -> CacheStore {
        CacheStore::new(config, Arc::new(FixedHours(trading)))
    }

    #[tokio::test]
    async fn get_returns_value_before_expiry_and_none_after() {
        let cache = store_with(CacheConfig::default(), true);

        cache
            .set("quote_600000", json!({"price": 7.2}), Some(Duration::from_millis(80)))
            .await;
        assert_eq!(
            cache.get("quote_600000").await,
            Some(json!({"price": 7.2}))
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get("quote_600000").await.is_none());

        // the expired read deleted the entry
        assert_eq!(cache.stats().await.total, 0);
    }

    #[tokio::test]
    async fn default_ttl_resolves_by_longest_prefix() {
        let config = CacheConfig {
            prefix_ttls: vec![
                ("fund".into(), Duration::from_secs(10)),
                ("fund_flow".into(), Duration::from_millis(50)),
            ],
            ..CacheConfig::default()
        };
        let cache = store_with(config, true);

        cache.set("fund_flow_rank", json!([1, 2, 3]), None).await;
        tokio::time::sleep(Duration::from_millis(90)).await;

        // the 50ms fund_flow TTL applied, not the 10s fund TTL
        assert!(cache.get("fund_flow_rank").await.is_none());
    }

    #[tokio::test]
    async fn non_trading_floor_extends_short_ttls() {
        let config = CacheConfig {
            non_trading_prefixes: vec!["fund_flow".into()],
            non_trading_floor: Duration::from_secs(3600),
            ..CacheConfig::default()
        };
        let cache = store_with(config, false);

        cache
            .set("fund_flow_rank", json!([1]), Some(Duration::from_millis(30)))
            .await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        // market closed: the floor kept the entry alive past the requested TTL
        assert!(cache.get("fund_flow_rank").await.is_some());

        // non-whitelisted keys keep the requested TTL
        cache
            .set("stock_list", json!([1]), Some(Duration::from_millis(30)))
            .await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("stock_list").await.is_none());
    }

    #[tokio::test]
    async fn nth_set_sweeps_expired_entries() {
        let config = CacheConfig {
            sweep_interval: 3,
            ..CacheConfig::default()
        };
        let cache = store_with(config, true);

        cache
            .set("a", json!(1), Some(Duration::from_millis(10)))
            .await;
        cache
            .set("b", json!(2), Some(Duration::from_millis(10)))
            .await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        // both entries are expired but still resident
        assert_eq!(cache.stats().await.expired, 2);

        // third set triggers the sweep
        cache.set("c", json!(3), Some(Duration::from_secs(60))).await;
        let stats = cache.stats().await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.keys, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_entry_by_creation() {
        let config = CacheConfig {
            capacity: 3,
            sweep_interval: 0,
            ..CacheConfig::default()
        };
        let cache = store_with(config, true);

        for key in ["first", "second", "third"] {
            cache.set(key, json!(key), Some(Duration::from_secs(60))).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cache
            .set("fourth", json!("fourth"), Some(Duration::from_secs(60)))
            .await;

        let stats = cache.stats().await;
        assert_eq!(stats.total, 3);
        assert!(!stats.keys.contains(&"first".to_string()));
        assert!(stats.keys.contains(&"fourth".to_string()));
    }

    #[tokio::test]
    async fn overwriting_at_capacity_does_not_evict() {
        let config = CacheConfig {
            capacity: 2,
            sweep_interval: 0,
            ..CacheConfig::default()
        };
        let cache = store_with(config, true);

        cache.set("a", json!(1), Some(Duration::from_secs(60))).await;
        cache.set("b", json!(2), Some(Duration::from_secs(60))).await;
        cache.set("a", json!(3), Some(Duration::from_secs(60))).await;

        let stats = cache.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(cache.get("a").await, Some(json!(3)));
        assert_eq!(cache.get("b").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn clear_with_prefix_removes_only_matching_keys() {
        let cache = store_with(CacheConfig::default(), true);

        cache.set("fund_flow_rank", json!(1), None).await;
        cache.set("fund_flow_north", json!(2), None).await;
        cache.set("index_overview", json!(3), None).await;

        assert_eq!(cache.clear(Some("fund_flow")).await, 2);
        assert_eq!(cache.stats().await.keys, vec!["index_overview".to_string()]);

        assert_eq!(cache.clear(None).await, 1);
        assert_eq!(cache.stats().await.total, 0);
    }
}
