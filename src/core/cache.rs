//! Bounded, time-aware cache store.
//!
//! Entries carry an absolute expiry and an estimated size. The store enforces
//! an entry-count bound and an aggregate memory bound; when either would be
//! exceeded it reclaims expired entries first and then evicts the
//! least-recently-used ones.
//!
//! Recency is kept by an `IndexMap` ordered oldest-first: every successful
//! `get` or `set` moves the key to the back, so the front is always the
//! eviction candidate and ties fall to the earlier insertion.
//!
//! All operations take one short critical section on a `parking_lot::Mutex`
//! and never return errors. Snapshot I/O failures are logged and the store
//! keeps serving from memory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::infra::snapshot::{self, Snapshot, SnapshotMetadata, SnapshotRecord};
use crate::util::clock::{duration_ms, now_ms};

/// Size assumed for values that cannot be serialized.
const FALLBACK_SIZE_BYTES: usize = 1024;

/// Estimate the in-memory footprint of a value from its JSON encoding.
///
/// Plain strings count their content only, without the surrounding quotes.
pub fn estimate_size<V: Serialize + ?Sized>(value: &V) -> usize {
    match serde_json::to_vec(value) {
        Ok(bytes) if bytes.len() >= 2 && bytes[0] == b'"' => bytes.len() - 2,
        Ok(bytes) => bytes.len(),
        Err(_) => FALLBACK_SIZE_BYTES,
    }
}

struct CacheEntry<V> {
    value: V,
    created_at_ms: u64,
    expires_at_ms: u64,
    last_accessed_ms: u64,
    access_count: u64,
    size_bytes: usize,
    ttl_ms: u64,
}

impl<V> CacheEntry<V> {
    const fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    const fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata {
            created_at: self.created_at_ms,
            expires_at: self.expires_at_ms,
            last_accessed_at: self.last_accessed_ms,
            access_count: self.access_count,
            size_bytes: self.size_bytes,
            ttl: self.ttl_ms,
        }
    }
}

struct CacheState<V> {
    /// Oldest access first.
    entries: IndexMap<String, CacheEntry<V>>,
    memory_usage: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    last_cleanup_ms: u64,
}

impl<V> CacheState<V> {
    fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            memory_usage: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            last_cleanup_ms: 0,
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.shift_remove(key)?;
        self.memory_usage = self.memory_usage.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn expired_keys(&self, now_ms: u64) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_expired(now_ms))
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn purge_expired(&mut self, now_ms: u64) -> usize {
        let expired = self.expired_keys(now_ms);
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Evict the least-recently-used entry other than `keep`.
    fn evict_lru(&mut self, keep: Option<&str>) -> bool {
        let Some(victim) = self.entries.keys().find(|k| Some(k.as_str()) != keep).cloned() else {
            return false;
        };
        self.remove(&victim);
        self.evictions += 1;
        debug!(key = %victim, "cache evicted least-recently-used entry");
        true
    }

    /// Whether storing `size` bytes under `key` stays within `limit`.
    fn fits(&self, key: &str, size: usize, limit: usize) -> bool {
        let replaced = self.entries.get(key).map_or(0, |e| e.size_bytes);
        self.memory_usage.saturating_sub(replaced) + size <= limit
    }

    /// Reclaim expired entries, then LRU entries, until `size` fits.
    fn free_memory(&mut self, key: &str, size: usize, limit: usize, now_ms: u64) -> bool {
        for expired in self.expired_keys(now_ms) {
            if self.fits(key, size, limit) {
                return true;
            }
            self.remove(&expired);
        }
        while !self.fits(key, size, limit) {
            if !self.evict_lru(Some(key)) {
                break;
            }
        }
        self.fits(key, size, limit)
    }

    fn enforce_count_bound(&mut self, keep: Option<&str>, max_entries: usize) {
        while self.entries.len() > max_entries {
            if !self.evict_lru(keep) {
                break;
            }
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored, including expired ones not yet reclaimed.
    pub size: usize,
    /// Configured entry bound.
    pub max_size: usize,
    /// Sum of recorded entry sizes.
    pub memory_usage_bytes: usize,
    /// Configured memory bound.
    pub max_memory_bytes: usize,
    /// Successful lookups.
    pub hits: u64,
    /// Failed lookups, including expired entries.
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0 before any lookup.
    pub hit_rate: f64,
    /// Entries displaced by the count or memory bound.
    pub evictions: u64,
    /// Entries past expiry but not reclaimed yet.
    pub expired_entries: usize,
    /// Time of the last expired-entry sweep, 0 if none ran.
    pub last_cleanup_ms: u64,
}

/// Thread-safe bounded cache keyed by string.
pub struct CacheStore<V> {
    max_entries: usize,
    max_memory_bytes: usize,
    default_ttl: Duration,
    snapshot_path: Option<PathBuf>,
    state: Mutex<CacheState<V>>,
}

impl<V> CacheStore<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    /// Create an empty store from configuration.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            max_memory_bytes: config.memory_limit_bytes(),
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            snapshot_path: config.snapshot_path.clone(),
            state: Mutex::new(CacheState::new()),
        }
    }

    /// Create a store and restore its snapshot, if persistence is configured.
    #[must_use]
    pub fn open(config: &CacheConfig) -> Self {
        let store = Self::new(config);
        store.load_snapshot();
        store
    }

    /// Snapshot file, if persistence is enabled.
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Look up a live entry and mark it most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, now_ms())
    }

    /// [`get`](Self::get) evaluated at an explicit time.
    pub fn get_at(&self, key: &str, now_ms: u64) -> Option<V> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(idx) = state.entries.get_index_of(key) else {
            state.misses += 1;
            return None;
        };
        if state.entries[idx].is_expired(now_ms) {
            state.remove(key);
            state.misses += 1;
            return None;
        }

        let last = state.entries.len() - 1;
        state.entries.move_index(idx, last);
        let entry = &mut state.entries[last];
        entry.last_accessed_ms = now_ms;
        entry.access_count += 1;
        let value = entry.value.clone();
        state.hits += 1;
        Some(value)
    }

    /// Store a value. `ttl = None` uses the default TTL.
    ///
    /// Returns `false`, leaving any previous value in place, when the value
    /// cannot fit within the memory bound even after reclamation.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) -> bool {
        self.set_at(key, value, ttl, now_ms())
    }

    /// [`set`](Self::set) evaluated at an explicit time.
    pub fn set_at(&self, key: impl Into<String>, value: V, ttl: Option<Duration>, now_ms: u64) -> bool {
        let key = key.into();
        let size = estimate_size(&value);
        if size > self.max_memory_bytes {
            warn!(key = %key, size, limit = self.max_memory_bytes, "cache refused entry larger than memory bound");
            return false;
        }

        let ttl_ms = duration_ms(ttl.unwrap_or(self.default_ttl));
        let mut state = self.state.lock();

        if !state.fits(&key, size, self.max_memory_bytes)
            && !state.free_memory(&key, size, self.max_memory_bytes, now_ms)
        {
            warn!(key = %key, size, "cache could not free enough memory for entry");
            return false;
        }

        state.remove(&key);
        state.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                created_at_ms: now_ms,
                expires_at_ms: now_ms.saturating_add(ttl_ms),
                last_accessed_ms: now_ms,
                access_count: 1,
                size_bytes: size,
                ttl_ms,
            },
        );
        state.memory_usage += size;
        state.enforce_count_bound(Some(&key), self.max_entries);
        true
    }

    /// Return the cached value or compute, store and return it.
    pub fn get_or_insert_with<F>(&self, key: &str, ttl: Option<Duration>, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute();
        self.set(key, value.clone(), ttl);
        value
    }

    /// Remove one entry. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Remove every entry and reset memory and eviction counters.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.memory_usage = 0;
        state.evictions = 0;
    }

    /// Remove every key matched by the regular expression `pattern`.
    ///
    /// An invalid pattern is logged and removes nothing.
    pub fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                warn!(pattern, error = %e, "invalid cache invalidation pattern");
                return 0;
            }
        };
        let mut state = self.state.lock();
        let matched: Vec<String> = state
            .entries
            .keys()
            .filter(|k| regex.is_match(k))
            .cloned()
            .collect();
        for key in &matched {
            state.remove(key);
        }
        debug!(pattern, removed = matched.len(), "cache invalidated by pattern");
        matched.len()
    }

    /// Keys in recency order (oldest first), optionally filtered by a regex.
    pub fn keys(&self, pattern: Option<&str>) -> Vec<String> {
        let regex = match pattern.map(Regex::new).transpose() {
            Ok(regex) => regex,
            Err(e) => {
                warn!(error = %e, "invalid cache key pattern");
                return Vec::new();
            }
        };
        self.state
            .lock()
            .entries
            .keys()
            .filter(|k| regex.as_ref().is_none_or(|r| r.is_match(k)))
            .cloned()
            .collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats_at(now_ms())
    }

    /// [`stats`](Self::stats) evaluated at an explicit time.
    #[allow(clippy::cast_precision_loss)]
    pub fn stats_at(&self, now_ms: u64) -> CacheStats {
        let state = self.state.lock();
        let total = state.hits + state.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            state.hits as f64 / total as f64
        };
        CacheStats {
            size: state.entries.len(),
            max_size: self.max_entries,
            memory_usage_bytes: state.memory_usage,
            max_memory_bytes: self.max_memory_bytes,
            hits: state.hits,
            misses: state.misses,
            hit_rate,
            evictions: state.evictions,
            expired_entries: state.entries.values().filter(|e| e.is_expired(now_ms)).count(),
            last_cleanup_ms: state.last_cleanup_ms,
        }
    }

    /// Remove every expired entry. Returns how many were reclaimed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(now_ms())
    }

    /// [`purge_expired`](Self::purge_expired) evaluated at an explicit time.
    pub fn purge_expired_at(&self, now_ms: u64) -> usize {
        let removed = {
            let mut state = self.state.lock();
            state.last_cleanup_ms = now_ms;
            state.purge_expired(now_ms)
        };
        if removed > 0 {
            info!(removed, "cache reclaimed expired entries");
        }
        removed
    }

    /// Persist unexpired entries. Returns whether a snapshot was written.
    pub fn save_snapshot(&self) -> bool {
        self.save_snapshot_at(now_ms())
    }

    /// [`save_snapshot`](Self::save_snapshot) evaluated at an explicit time.
    pub fn save_snapshot_at(&self, now_ms: u64) -> bool {
        let Some(path) = self.snapshot_path.as_deref() else {
            return false;
        };
        let snapshot: Snapshot<V> = {
            let state = self.state.lock();
            state
                .entries
                .iter()
                .filter(|(_, e)| !e.is_expired(now_ms))
                .map(|(k, e)| {
                    (
                        k.clone(),
                        SnapshotRecord {
                            value: e.value.clone(),
                            metadata: e.metadata(),
                        },
                    )
                })
                .collect()
        };
        match snapshot::write_snapshot(path, &snapshot) {
            Ok(()) => {
                debug!(path = %path.display(), entries = snapshot.len(), "cache snapshot saved");
                true
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "cache snapshot save failed");
                false
            }
        }
    }

    /// Restore entries from the snapshot file, dropping any already expired.
    /// Returns how many entries were loaded.
    pub fn load_snapshot(&self) -> usize {
        self.load_snapshot_at(now_ms())
    }

    /// [`load_snapshot`](Self::load_snapshot) evaluated at an explicit time.
    pub fn load_snapshot_at(&self, now_ms: u64) -> usize {
        let Some(path) = self.snapshot_path.as_deref() else {
            return 0;
        };
        let snapshot: Snapshot<V> = match snapshot::read_snapshot(path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!(path = %path.display(), "no cache snapshot found");
                return 0;
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "cache snapshot load failed");
                return 0;
            }
        };

        let mut loaded = 0;
        let mut state = self.state.lock();
        for (key, record) in snapshot {
            let meta = record.metadata;
            if meta.expires_at <= now_ms {
                continue;
            }
            if !state.fits(&key, meta.size_bytes, self.max_memory_bytes) {
                debug!(key = %key, "snapshot entry skipped, memory bound reached");
                continue;
            }
            state.remove(&key);
            state.entries.insert(
                key,
                CacheEntry {
                    value: record.value,
                    created_at_ms: meta.created_at,
                    expires_at_ms: meta.expires_at,
                    last_accessed_ms: meta.last_accessed_at,
                    access_count: meta.access_count,
                    size_bytes: meta.size_bytes,
                    ttl_ms: meta.ttl,
                },
            );
            state.memory_usage += meta.size_bytes;
            loaded += 1;
        }
        state.enforce_count_bound(None, self.max_entries);
        drop(state);

        info!(path = %path.display(), loaded, "cache snapshot loaded");
        loaded
    }
}
