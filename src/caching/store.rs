//! Bounded LRU + TTL cache store.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use super::stats::{CacheSnapshot, CacheStatistics};

/// One stored value plus the timestamps that drive expiry and diagnostics.
///
/// Owned exclusively by the cache; lookups hand out clones of the value,
/// never references into the store.
#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        let now = Instant::now();
        Self {
            value,
            inserted_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
        self.access_count += 1;
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

/// Thread-safe bounded key→value store with LRU eviction and TTL expiry.
///
/// Recency ordering is owned by the underlying [`LruCache`]; insertion
/// timestamps drive expiry. All mutating operations are serialized behind
/// one mutex, which is held only for map manipulation and never across an
/// await point or a value computation.
///
/// Two degenerate configurations disable caching entirely: `capacity == 0`
/// makes every `get` a miss and every `put` a no-op, and `ttl == 0` makes
/// every entry immediately expired. Both are useful for tests and opt-out.
pub struct AnalysisCache<K: Hash + Eq + Clone, V: Clone> {
    inner: Mutex<Option<LruCache<K, CacheEntry<V>>>>,
    capacity: usize,
    ttl: Duration,
    stats: CacheStatistics,
}

impl<K: Hash + Eq + Clone, V: Clone> AnalysisCache<K, V> {
    /// Create a cache bounded to `capacity` entries with the given TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let inner = NonZeroUsize::new(capacity).map(LruCache::new);
        Self {
            inner: Mutex::new(inner),
            capacity,
            ttl,
            stats: CacheStatistics::new(),
        }
    }

    /// Look up a value. A hit marks the entry most-recently-used; an
    /// expired entry is removed and reported absent. A miss never creates
    /// an entry, and lookups never fail.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock();
        let Some(cache) = guard.as_mut() else {
            self.stats.record_miss();
            return None;
        };

        match cache.peek(key) {
            None => {
                self.stats.record_miss();
                None
            }
            Some(entry) if entry.is_expired(self.ttl) => {
                cache.pop(key);
                self.stats.record_expiration(1);
                self.stats.record_miss();
                None
            }
            Some(_) => {
                if let Some(entry) = cache.get_mut(key) {
                    entry.touch();
                    self.stats.record_hit();
                    Some(entry.value.clone())
                } else {
                    self.stats.record_miss();
                    None
                }
            }
        }
    }

    /// Insert or overwrite a value, resetting its insertion timestamp.
    ///
    /// When the store is full and the key is new, expired entries are
    /// swept first so that a live entry is never evicted while a dead one
    /// occupies a slot; only then does LRU order pick the victim.
    pub fn put(&self, key: K, value: V) {
        let mut guard = self.inner.lock();
        let Some(cache) = guard.as_mut() else {
            return;
        };

        if cache.len() >= self.capacity && !cache.contains(&key) {
            let swept = Self::sweep_expired(cache, self.ttl);
            if swept > 0 {
                self.stats.record_expiration(swept);
            }
        }

        if let Some((evicted_key, _)) = cache.push(key.clone(), CacheEntry::new(value)) {
            if evicted_key != key {
                self.stats.record_eviction();
            }
        }
        self.stats.record_insertion();
    }

    /// Explicitly remove one entry, returning its value if present.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock();
        guard.as_mut()?.pop(key).map(|entry| entry.value)
    }

    /// Remove every expired entry, returning how many were purged.
    pub fn purge_expired(&self) -> usize {
        let mut guard = self.inner.lock();
        let Some(cache) = guard.as_mut() else {
            return 0;
        };
        let swept = Self::sweep_expired(cache, self.ttl);
        if swept > 0 {
            self.stats.record_expiration(swept);
        }
        swept as usize
    }

    fn sweep_expired(cache: &mut LruCache<K, CacheEntry<V>>, ttl: Duration) -> u64 {
        let dead: Vec<K> = cache
            .iter()
            .filter(|(_, entry)| entry.is_expired(ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &dead {
            cache.pop(key);
        }
        dead.len() as u64
    }

    /// Current live-entry count. Lazily expired entries count until a
    /// lookup or sweep removes them, the same view eviction sees.
    pub fn len(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, |cache| cache.len())
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Used on shutdown; counters are preserved.
    pub fn clear(&self) {
        if let Some(cache) = self.inner.lock().as_mut() {
            cache.clear();
        }
    }

    /// Configured capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Point-in-time counter snapshot.
    pub fn stats(&self) -> CacheSnapshot {
        self.stats.snapshot()
    }
}
