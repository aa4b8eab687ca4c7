//! Keyed TTL cache used to memoize identity-provider lookups.
//!
//! Keys are stored under their SHA-256 hex digest, never the plaintext
//! input, so an inspected cache cannot leak bearer tokens. Entries
//! expire after a configurable lifetime: every store opportunistically
//! sweeps expired entries out of the backing map, and an expired entry
//! that has not been swept yet is treated as a miss on read (it is not
//! deleted by the read).
//!
//! # Known limitation
//!
//! There is no eviction policy beyond the TTL. The lifetime is a
//! staleness bound, not a memory bound; callers that cache unbounded
//! key sets must account for that.
//!
//! # Metrics
//!
//! - `rolegate_identity_cache_hits_total` - Incremented on cache hit
//! - `rolegate_identity_cache_misses_total` - Incremented on cache miss

use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a cache key.
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Configuration for the TTL cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a stored entry stays valid.
    pub lifetime: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Keyed cache with per-entry expiry.
///
/// Thread-safe; share it behind an `Arc` and inject it as an explicit
/// dependency so tests can substitute a fresh instance per run.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    config: CacheConfig,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Records a value under the hashed key, timestamped now, and
    /// sweeps all expired entries.
    pub fn store(&self, key: &str, value: V) {
        self.store_at(key, value, Instant::now());
    }

    /// Records a value with an explicit timestamp. Tests use this to
    /// simulate entries stored in the past.
    pub fn store_at(&self, key: &str, value: V, stored_at: Instant) {
        self.sweep();
        self.entries.insert(hash_key(key), CacheEntry { value, stored_at });
    }

    /// Returns the value only while `now - stored < lifetime`. An
    /// expired-but-unswept entry is a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let result = match self.entries.get(&hash_key(key)) {
            Some(entry) if entry.stored_at.elapsed() < self.config.lifetime => {
                Some(entry.value.clone())
            }
            _ => None,
        };
        if result.is_some() {
            metrics::counter!("rolegate_identity_cache_hits_total").increment(1);
        } else {
            metrics::counter!("rolegate_identity_cache_misses_total").increment(1);
        }
        result
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep(&self) {
        let lifetime = self.config.lifetime;
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() < lifetime);
    }
}

/// Registers cache metric descriptions. Optional; call once during
/// startup for better documentation in the metrics backend.
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "rolegate_identity_cache_hits_total",
        "Total number of identity cache hits"
    );
    metrics::describe_counter!(
        "rolegate_identity_cache_misses_total",
        "Total number of identity cache misses"
    );
}
