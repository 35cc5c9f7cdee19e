//! Shared cache primitive and the engine's cache set.
//!
//! Every cache is process-wide, keyed by typed tuples (never stringified
//! JSON), and admits the same eviction policy: expired entries are dropped
//! first, then survivors are ranked by `(priority asc, access_count asc,
//! insertion stamp asc)` and evicted until the cache holds at most
//! 0.8 × capacity entries.

use crate::boundaries::Boundary;
use crate::fingerprint::Fingerprint;
use crate::query::AtomKey;
use dashmap::DashMap;
use serde::Serialize;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// LRU cache
// ---------------------------------------------------------------------------

struct Entry<V> {
    value: V,
    priority: u8,
    access_count: AtomicU64,
    /// Millis since cache creation at last touch; drives TTL expiry.
    last_access: AtomicU64,
    /// Monotone insertion stamp; the age component of the eviction rank.
    stamp: u64,
}

/// A bounded concurrent cache with optional TTL.
///
/// Values are cloned out on hit, so they should be `Arc`s or other cheap
/// clones.
pub struct LruCache<K, V> {
    name: &'static str,
    capacity: usize,
    ttl: Option<Duration>,
    map: DashMap<K, Entry<V>>,
    epoch: Instant,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(name: &'static str, capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            ttl,
            map: DashMap::new(),
            epoch: Instant::now(),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn is_expired(&self, entry: &Entry<V>, now_ms: u64) -> bool {
        match self.ttl {
            Some(ttl) => {
                now_ms.saturating_sub(entry.last_access.load(Ordering::Relaxed))
                    > ttl.as_millis() as u64
            }
            None => false,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.now_ms();
        if let Some(entry) = self.map.get(key) {
            if self.is_expired(&entry, now) {
                drop(entry);
                self.map.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            entry.access_count.fetch_add(1, Ordering::Relaxed);
            entry.last_access.store(now, Ordering::Relaxed);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_with_priority(key, value, 0);
    }

    pub fn insert_with_priority(&self, key: K, value: V, priority: u8) {
        let now = self.now_ms();
        let stamp = self.clock.fetch_add(1, Ordering::Relaxed);
        self.map.insert(
            key,
            Entry {
                value,
                priority,
                access_count: AtomicU64::new(0),
                last_access: AtomicU64::new(now),
                stamp,
            },
        );
        if self.map.len() > self.capacity {
            self.evict();
        }
    }

    /// Drop expired entries, then rank and evict down to 0.8 × capacity.
    fn evict(&self) {
        let now = self.now_ms();
        let before = self.map.len();
        if self.ttl.is_some() {
            self.map.retain(|_, entry| !self.is_expired(entry, now));
        }
        let expired = before.saturating_sub(self.map.len());

        let target = self.capacity * 4 / 5;
        let mut ranked = 0usize;
        if self.map.len() > target {
            let mut entries: Vec<(K, (u8, u64, u64))> = self
                .map
                .iter()
                .map(|r| {
                    let e = r.value();
                    (r.key().clone(), (e.priority, e.access_count.load(Ordering::Relaxed), e.stamp))
                })
                .collect();
            entries.sort_by(|a, b| a.1.cmp(&b.1));
            for (key, _) in entries {
                if self.map.len() <= target {
                    break;
                }
                if self.map.remove(&key).is_some() {
                    ranked += 1;
                }
            }
        }

        let total = expired + ranked;
        if total > 0 {
            self.evictions.fetch_add(total as u64, Ordering::Relaxed);
            tracing::trace!(cache = self.name, expired, ranked, "cache eviction pass");
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            name: self.name,
            size: self.map.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counters for one cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub name: &'static str,
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

// ---------------------------------------------------------------------------
// Engine cache set
// ---------------------------------------------------------------------------

/// A cached atom verdict: the unit stored in the result cache by the fuzzy
/// matcher and the NEAR evaluator.
#[derive(Debug, Clone)]
pub struct CachedVerdict {
    pub matched: bool,
    pub score: f64,
    pub positions: Arc<Vec<usize>>,
    /// False when the producing search stopped at its first hit; a caller
    /// that needs every position must recompute instead of trusting this
    /// entry.
    pub positions_complete: bool,
}

const RESULT_CACHE_SIZE: usize = 2000;
const NORMALIZED_CACHE_SIZE: usize = 1000;
const REGEX_CACHE_SIZE: usize = 200;
const BOUNDARY_CACHE_SIZE: usize = 100;
const WORD_INDEX_CACHE_SIZE: usize = 2000;
const BOUNDARY_TTL: Duration = Duration::from_secs(600);

/// All caches owned by one engine handle.
pub struct CacheSet {
    /// `(fingerprint, atom key)` → verdict.
    pub(crate) results: LruCache<(Fingerprint, AtomKey), CachedVerdict>,
    /// Fingerprint of the original string → its case-folded form.
    pub(crate) normalized: LruCache<Fingerprint, Arc<str>>,
    /// `(pattern, flags)` → compiled regex.
    pub(crate) regexes: LruCache<(Box<str>, Box<str>), Arc<regex::Regex>>,
    /// Fingerprint → word boundaries.
    pub(crate) boundaries: LruCache<Fingerprint, Arc<Vec<Boundary>>>,
    /// `(fingerprint, byte offset)` → word index.
    pub(crate) word_index: LruCache<(Fingerprint, usize), i32>,
}

impl CacheSet {
    pub fn new() -> Self {
        Self {
            results: LruCache::new("results", RESULT_CACHE_SIZE, None),
            normalized: LruCache::new("normalized", NORMALIZED_CACHE_SIZE, None),
            regexes: LruCache::new("regexes", REGEX_CACHE_SIZE, None),
            boundaries: LruCache::new("boundaries", BOUNDARY_CACHE_SIZE, Some(BOUNDARY_TTL)),
            word_index: LruCache::new("word_index", WORD_INDEX_CACHE_SIZE, Some(BOUNDARY_TTL)),
        }
    }

    pub fn clear(&self) {
        self.results.clear();
        self.normalized.clear();
        self.regexes.clear();
        self.boundaries.clear();
        self.word_index.clear();
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        vec![
            self.results.stats(),
            self.normalized.stats(),
            self.regexes.stats(),
            self.boundaries.stats(),
            self.word_index.stats(),
        ]
    }

    /// Case-folded form of `s`, cached by the fingerprint of the original.
    pub(crate) fn normalized_form(&self, s: &str) -> Arc<str> {
        let fp = crate::fingerprint::fingerprint(s);
        if let Some(n) = self.normalized.get(&fp) {
            return n;
        }
        let folded: Arc<str> = s.to_lowercase().into();
        self.normalized.insert(fp, Arc::clone(&folded));
        folded
    }
}

impl Default for CacheSet {
    fn default() -> Self {
        Self::new()
    }
}
