//! Caching layer for analysis results
//!
//! Results are keyed by a fingerprint of (symbol, operation, params) and
//! expire on a per-operation TTL. Reads past the TTL always miss.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Operation kind, which fixes the entry TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Prediction,
    Sentiment,
    Anomaly,
    Pattern,
    TrainingMeta,
}

impl CacheKind {
    pub fn ttl(&self) -> Duration {
        match self {
            CacheKind::Prediction => Duration::from_secs(3600),
            CacheKind::Sentiment => Duration::from_secs(1800),
            CacheKind::Anomaly => Duration::from_secs(900),
            CacheKind::Pattern => Duration::from_secs(3600),
            CacheKind::TrainingMeta => Duration::from_secs(7200),
        }
    }

    fn op_name(&self) -> &'static str {
        match self {
            CacheKind::Prediction => "prediction",
            CacheKind::Sentiment => "sentiment",
            CacheKind::Anomaly => "anomaly",
            CacheKind::Pattern => "pattern",
            CacheKind::TrainingMeta => "training_meta",
        }
    }
}

/// Canonical cache key from (symbol, operation, params)
pub fn fingerprint(symbol: &str, kind: CacheKind, params: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(symbol.to_uppercase().as_bytes());
    hasher.update(b"|");
    hasher.update(kind.op_name().as_bytes());
    hasher.update(b"|");
    hasher.update(params.as_bytes());
    let digest = hasher.finalize();
    // First 16 bytes are plenty for a cache key
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

struct CachedEntry {
    value: serde_json::Value,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// TTL cache for analysis results
pub struct AnalysisCache {
    entries: DashMap<String, CachedEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a cached result; entries past their TTL are misses and evicted
    pub fn get<T: serde::de::DeserializeOwned>(
        &self,
        symbol: &str,
        kind: CacheKind,
        params: &str,
    ) -> Option<T> {
        let key = fingerprint(symbol, kind, params);
        if let Some(entry) = self.entries.get(&key) {
            if !entry.is_expired() {
                if let Ok(value) = serde_json::from_value(entry.value.clone()) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
            }
            drop(entry);
            self.entries.remove(&key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a result under the operation's standard TTL
    pub fn set<T: serde::Serialize>(&self, symbol: &str, kind: CacheKind, params: &str, value: &T) {
        self.set_with_ttl(symbol, kind, params, value, kind.ttl());
    }

    /// Store a result with an explicit TTL (set-with-expiry semantics)
    pub fn set_with_ttl<T: serde::Serialize>(
        &self,
        symbol: &str,
        kind: CacheKind,
        params: &str,
        value: &T,
        ttl: Duration,
    ) {
        let key = fingerprint(symbol, kind, params);
        if let Ok(json) = serde_json::to_value(value) {
            self.entries.insert(
                key,
                CachedEntry {
                    value: json,
                    cached_at: Instant::now(),
                    ttl,
                },
            );
        }
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_distinguishes_inputs() {
        let a = fingerprint("SOL", CacheKind::Sentiment, "days=30");
        let b = fingerprint("SOL", CacheKind::Anomaly, "days=30");
        let c = fingerprint("BTC", CacheKind::Sentiment, "days=30");
        let d = fingerprint("SOL", CacheKind::Sentiment, "days=60");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        // Symbol casing does not change the key
        assert_eq!(a, fingerprint("sol", CacheKind::Sentiment, "days=30"));
    }

    #[test]
    fn test_cache_round_trip() {
        let cache = AnalysisCache::new();
        cache.set("SOL", CacheKind::Sentiment, "days=30", &42u32);
        let value: Option<u32> = cache.get("SOL", CacheKind::Sentiment, "days=30");
        assert_eq!(value, Some(42));
        assert!(cache.hit_rate() > 0.0);
    }

    #[test]
    fn test_expired_entry_misses() {
        let cache = AnalysisCache::new();
        cache.set_with_ttl("SOL", CacheKind::Anomaly, "days=30", &7u32, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        let value: Option<u32> = cache.get("SOL", CacheKind::Anomaly, "days=30");
        assert_eq!(value, None);
        // Expired entry was evicted
        assert!(cache.is_empty());
    }

    #[test]
    fn test_per_kind_ttls() {
        assert_eq!(CacheKind::Prediction.ttl(), Duration::from_secs(3600));
        assert_eq!(CacheKind::Sentiment.ttl(), Duration::from_secs(1800));
        assert_eq!(CacheKind::Anomaly.ttl(), Duration::from_secs(900));
        assert_eq!(CacheKind::Pattern.ttl(), Duration::from_secs(3600));
        assert_eq!(CacheKind::TrainingMeta.ttl(), Duration::from_secs(7200));
    }
}
