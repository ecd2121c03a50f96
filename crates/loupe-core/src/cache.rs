//! Bounded hot caches for records and query results.
//!
//! Three independent LRU caches sit in front of the index: a record cache
//! (id → record), a query-result cache (fingerprint → scored hits) and a
//! path cache (prefix → records). Query entries carry a timestamp and are
//! treated as misses once the TTL elapses. Every `get` hands back a deep
//! copy; callers must never rely on structure sharing with the cache.
//!
//! The mutator invalidates the query and path caches on every index write;
//! only entries provably independent of the write could be kept, and
//! dropping everything is the safe default.

use crate::types::{FileRecord, SearchHit};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Assumed per-entry footprints used to split the MiB budget into entry
/// counts. Coarse on purpose; the budget is advisory.
const RECORD_ENTRY_BYTES: u64 = 512;
const QUERY_ENTRY_BYTES: u64 = 8 * 1024;
const PATH_ENTRY_BYTES: u64 = 8 * 1024;

struct TimedResults {
    hits: Vec<SearchHit>,
    produced_at: Instant,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub record_entries: usize,
    pub query_entries: usize,
    pub path_entries: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Manager for the three hot caches.
pub struct CacheManager {
    enabled: bool,
    record_cache: Mutex<LruCache<u64, FileRecord>>,
    query_cache: Mutex<LruCache<String, TimedResults>>,
    path_cache: Mutex<LruCache<String, Vec<FileRecord>>>,
    query_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheManager {
    /// Build caches from a total MiB budget, split 50/30/20 between the
    /// record, query and path caches.
    pub fn new(size_mb: u64, query_ttl: Duration) -> Self {
        let budget = size_mb.max(1) * 1024 * 1024;
        let record_cap = ((budget / 2) / RECORD_ENTRY_BYTES).max(16) as usize;
        let query_cap = ((budget * 3 / 10) / QUERY_ENTRY_BYTES).max(16) as usize;
        let path_cap = ((budget / 5) / PATH_ENTRY_BYTES).max(16) as usize;
        Self::with_capacities(record_cap, query_cap, path_cap, query_ttl)
    }

    /// Build caches with explicit entry capacities.
    pub fn with_capacities(
        record_cap: usize,
        query_cap: usize,
        path_cap: usize,
        query_ttl: Duration,
    ) -> Self {
        let nz = |n: usize| NonZeroUsize::new(n.max(1)).unwrap_or(NonZeroUsize::MIN);
        CacheManager {
            enabled: true,
            record_cache: Mutex::new(LruCache::new(nz(record_cap))),
            query_cache: Mutex::new(LruCache::new(nz(query_cap))),
            path_cache: Mutex::new(LruCache::new(nz(path_cap))),
            query_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// A manager that stores nothing; every lookup is a miss.
    pub fn disabled() -> Self {
        let mut mgr = Self::with_capacities(1, 1, 1, Duration::from_secs(0));
        mgr.enabled = false;
        mgr
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // === Record cache ===

    pub fn put_record(&self, record: FileRecord) {
        if !self.enabled {
            return;
        }
        let mut cache = self.record_cache.lock();
        // Inserting a fresh key into a full cache evicts the LRU entry;
        // updating an existing key does not
        if cache.len() == cache.cap().get() && !cache.contains(&record.id) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        cache.put(record.id, record);
    }

    pub fn get_record(&self, id: u64) -> Option<FileRecord> {
        if !self.enabled {
            return None;
        }
        let mut cache = self.record_cache.lock();
        match cache.get(&id) {
            Some(record) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(record.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Drop a record that was mutated or removed in the index, so the
    /// cache never serves a stale copy.
    pub fn remove_record(&self, id: u64) {
        self.record_cache.lock().pop(&id);
    }

    /// Drop every cached record. Used when a subtree removal invalidates
    /// an unknown set of ids.
    pub fn clear_records(&self) {
        self.record_cache.lock().clear();
    }

    // === Query-result cache ===

    pub fn put_results(&self, fingerprint: String, hits: Vec<SearchHit>) {
        if !self.enabled {
            return;
        }
        let mut cache = self.query_cache.lock();
        let entry = TimedResults {
            hits,
            produced_at: Instant::now(),
        };
        if cache.len() == cache.cap().get() && !cache.contains(&fingerprint) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        cache.put(fingerprint, entry);
    }

    pub fn get_results(&self, fingerprint: &str) -> Option<Vec<SearchHit>> {
        if !self.enabled {
            return None;
        }
        let mut cache = self.query_cache.lock();
        let expired = match cache.get(fingerprint) {
            Some(entry) => entry.produced_at.elapsed() > self.query_ttl,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if expired {
            cache.pop(fingerprint);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        cache.get(fingerprint).map(|entry| entry.hits.clone())
    }

    // === Path cache ===

    pub fn put_path_results(&self, prefix: String, records: Vec<FileRecord>) {
        if !self.enabled {
            return;
        }
        let mut cache = self.path_cache.lock();
        if cache.len() == cache.cap().get() && !cache.contains(&prefix) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        cache.put(prefix, records);
    }

    pub fn get_path_results(&self, prefix: &str) -> Option<Vec<FileRecord>> {
        if !self.enabled {
            return None;
        }
        let mut cache = self.path_cache.lock();
        match cache.get(prefix) {
            Some(records) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(records.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    // === Invalidation and shedding ===

    /// Drop every cached query and path result. Called by the mutator on
    /// each index write.
    pub fn invalidate_queries(&self) {
        self.query_cache.lock().clear();
        self.path_cache.lock().clear();
    }

    /// Shed cache contents under memory pressure. Level 0 drops query
    /// results, level 1 additionally drops path results, level 2 drops
    /// everything. The primary indexes are never shed.
    pub fn shed(&self, level: usize) {
        self.query_cache.lock().clear();
        if level >= 1 {
            self.path_cache.lock().clear();
        }
        if level >= 2 {
            self.record_cache.lock().clear();
        }
    }

    pub fn clear(&self) {
        self.shed(2);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            record_entries: self.record_cache.lock().len(),
            query_entries: self.query_cache.lock().len(),
            path_entries: self.path_cache.lock().len(),
        }
    }
}
