//! # Multi-Layer Cache
//!
//! L1 in-process LRU plus an L2 shared key/value cache, with read-through
//! and write-through semantics (§4.3). The L2 layer here is an in-process
//! stand-in behind the same trait a Redis-backed implementation would
//! satisfy — swapping it out does not change anything above this module.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// L1 in-process LRU capacity.
    pub l1_max_entries: usize,
    /// L1 TTL in seconds.
    pub l1_ttl_seconds: u64,
    /// L2 TTL in seconds.
    pub l2_ttl_seconds: u64,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_entries: 500,
            l1_ttl_seconds: 300,
            l2_ttl_seconds: 3600,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    created_at: Instant,
    ttl: Duration,
    hits: u64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// Per-process bounded LRU. Eviction removes the least recently used entry
/// when at capacity; every lookup hit moves the entry to most-recently-used.
struct LruCache {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<(std::collections::HashMap<String, CacheEntry>, VecDeque<String>)>,
}

impl LruCache {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: Mutex::new((std::collections::HashMap::new(), VecDeque::new())),
        }
    }

    fn touch(order: &mut VecDeque<String>, key: &str) {
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.to_string());
    }

    fn get(&self, key: &str) -> Option<String> {
        let mut guard = self.entries.lock().unwrap();
        let (map, order) = &mut *guard;
        let expired = match map.get(key) {
            Some(entry) => entry.is_expired(),
            None => return None,
        };
        if expired {
            map.remove(key);
            if let Some(pos) = order.iter().position(|k| k == key) {
                order.remove(pos);
            }
            return None;
        }
        Self::touch(order, key);
        let entry = map.get_mut(key).unwrap();
        entry.hits += 1;
        Some(entry.value.clone())
    }

    fn set(&self, key: &str, value: String) {
        let mut guard = self.entries.lock().unwrap();
        let (map, order) = &mut *guard;
        if !map.contains_key(key) && map.len() >= self.capacity {
            if let Some(lru_key) = order.pop_front() {
                map.remove(&lru_key);
            }
        }
        map.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl: self.ttl,
                hits: 0,
            },
        );
        Self::touch(order, key);
    }

    fn delete(&self, key: &str) {
        let mut guard = self.entries.lock().unwrap();
        let (map, order) = &mut *guard;
        map.remove(key);
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap().0.len()
    }
}

/// L2 shared key/value cache. An unreachable L2 degrades the
/// `MultiLayerCache` silently to L1-only; this in-process implementation is
/// always reachable, so that path only matters for a real backing store.
pub trait SharedCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String, ttl: Duration);
    fn delete(&self, key: &str);
}

struct L2Entry {
    value: String,
    created_at: Instant,
    ttl: Duration,
}

/// In-process stand-in for a shared external cache (e.g. Redis). Namespaces
/// keys the same way a real L2 would.
pub struct InProcessSharedCache {
    entries: DashMap<String, L2Entry>,
}

impl InProcessSharedCache {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }
}

impl Default for InProcessSharedCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedCache for InProcessSharedCache {
    fn get(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.created_at.elapsed() > entry.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            L2Entry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// L1 + L2 composition with read-through / write-through semantics, scoped
/// to one service's key namespace.
pub struct MultiLayerCache {
    service_name: String,
    l1: LruCache,
    l2: std::sync::Arc<dyn SharedCache>,
    l2_ttl: Duration,
    hit_counter: AtomicU64,
    miss_counter: AtomicU64,
}

impl MultiLayerCache {
    pub fn new(service_name: impl Into<String>, config: &CacheConfig, l2: std::sync::Arc<dyn SharedCache>) -> Self {
        Self {
            service_name: service_name.into(),
            l1: LruCache::new(config.l1_max_entries, Duration::from_secs(config.l1_ttl_seconds)),
            l2,
            l2_ttl: Duration::from_secs(config.l2_ttl_seconds),
            hit_counter: AtomicU64::new(0),
            miss_counter: AtomicU64::new(0),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.service_name, key)
    }

    /// L1 → L2 → miss. An L2 hit is promoted back into L1.
    pub fn get(&self, key: &str) -> Option<String> {
        let namespaced = self.namespaced(key);
        if let Some(value) = self.l1.get(&namespaced) {
            self.hit_counter.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }
        if let Some(value) = self.l2.get(&namespaced) {
            self.l1.set(&namespaced, value.clone());
            self.hit_counter.fetch_add(1, Ordering::Relaxed);
            debug!(service = %self.service_name, "L2 cache hit promoted to L1");
            return Some(value);
        }
        self.miss_counter.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn set(&self, key: &str, value: String) {
        let namespaced = self.namespaced(key);
        self.l1.set(&namespaced, value.clone());
        self.l2.set(&namespaced, value, self.l2_ttl);
    }

    pub fn delete(&self, key: &str) {
        let namespaced = self.namespaced(key);
        self.l1.delete(&namespaced);
        self.l2.delete(&namespaced);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hit_counter.load(Ordering::Relaxed);
        let misses = self.miss_counter.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            l1_entries: self.l1.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub l1_entries: usize,
}

/// Stable hash over a JSON-canonicalized (operation, query, limit, filters)
/// tuple — sorted keys so equivalent filter maps hash identically regardless
/// of insertion order.
pub fn cache_key(operation: &str, canonical_args: &serde_json::Value) -> String {
    let canonical = serde_json::to_string(&sort_keys(canonical_args)).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, serde_json::Value> = std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), sort_keys(v));
            }
            serde_json::to_value(sorted).unwrap()
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cache(l1_max: usize) -> MultiLayerCache {
        let config = CacheConfig {
            l1_max_entries: l1_max,
            l1_ttl_seconds: 300,
            l2_ttl_seconds: 3600,
            enabled: true,
        };
        MultiLayerCache::new("svc", &config, Arc::new(InProcessSharedCache::new()))
    }

    #[test]
    fn set_then_get_round_trips() {
        let c = cache(10);
        c.set("k", "v".to_string());
        assert_eq!(c.get("k"), Some("v".to_string()));
    }

    #[test]
    fn l1_eviction_drops_least_recently_used() {
        let c = cache(2);
        c.set("a", "1".to_string());
        c.set("b", "2".to_string());
        c.get("a"); // a is now most-recently-used
        c.set("c", "3".to_string()); // evicts b from L1, but b is promoted from L2 on next get
        assert_eq!(c.get("a"), Some("1".to_string()));
        assert_eq!(c.get("b"), Some("2".to_string())); // served from L2, promoted back to L1
        assert_eq!(c.get("c"), Some("3".to_string()));
    }

    #[test]
    fn delete_invalidates_both_layers() {
        let c = cache(10);
        c.set("k", "v".to_string());
        c.delete("k");
        assert_eq!(c.get("k"), None);
    }

    #[test]
    fn cache_key_is_stable_under_key_reordering() {
        let a = serde_json::json!({"query": "x", "limit": 10});
        let b = serde_json::json!({"limit": 10, "query": "x"});
        assert_eq!(cache_key("search", &a), cache_key("search", &b));
    }
}
