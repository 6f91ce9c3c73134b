//! # Expiration Index
//!
//! Track which keys expire at which absolute second so the sweeper can
//! reclaim a whole bucket of keys in one pass instead of scanning the
//! entire store every tick.
//!
//! ## Design Principles
//!
//! 1. **Bucket Per Second**: all keys sharing an expiration instant live in
//!    one bucket, keyed by epoch seconds.
//! 2. **Reverse Index**: a key appears in at most one bucket; the reverse
//!    index lets `put`/`del` find and drop a stale bucket membership in
//!    O(1) instead of scanning buckets.
//! 3. **Single Lock**: buckets and the reverse index are always mutated
//!    together, so one `RwLock` covers both rather than risking the two
//!    structures drifting apart under independent locks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

struct Inner {
    buckets: HashMap<i64, Vec<Vec<u8>>>,
    index: HashMap<Vec<u8>, i64>,
}

/// Expiration index mapping epoch-second buckets to the keys expiring then.
pub struct Exi {
    inner: RwLock<Inner>,
    dirty: AtomicBool,
}

impl Exi {
    pub fn new() -> Self {
        Exi {
            inner: RwLock::new(Inner {
                buckets: HashMap::new(),
                index: HashMap::new(),
            }),
            dirty: AtomicBool::new(false),
        }
    }

    /// Removes `key` from whatever bucket it currently occupies, if any.
    /// Caller must already hold the write lock.
    fn unindex_locked(inner: &mut Inner, key: &[u8]) {
        if let Some(old_ts) = inner.index.remove(key) {
            if let Some(bucket) = inner.buckets.get_mut(&old_ts) {
                bucket.retain(|k| k.as_slice() != key);
                if bucket.is_empty() {
                    inner.buckets.remove(&old_ts);
                }
            }
        }
    }

    /// Binds `key` to expire at `timestamp` (epoch seconds), replacing any
    /// prior expiration for that key.
    pub fn put(&self, key: Vec<u8>, timestamp: i64) {
        let mut inner = self.inner.write();
        Self::unindex_locked(&mut inner, &key);
        inner.buckets.entry(timestamp).or_default().push(key.clone());
        inner.index.insert(key, timestamp);
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Removes any expiration binding for `key`. Idempotent.
    pub fn del(&self, key: &[u8]) {
        let mut inner = self.inner.write();
        if inner.index.contains_key(key) {
            Self::unindex_locked(&mut inner, key);
            self.dirty.store(true, Ordering::Relaxed);
        }
    }

    /// Returns true if `key` has a recorded expiration at or before `now`.
    pub fn has_expired(&self, key: &[u8], now: i64) -> bool {
        let inner = self.inner.read();
        matches!(inner.index.get(key), Some(&ts) if ts <= now)
    }

    /// Returns the expiration timestamp bound to `key`, if any.
    pub fn ttl_of(&self, key: &[u8]) -> Option<i64> {
        self.inner.read().index.get(key).copied()
    }

    /// Removes and returns every key bound to `timestamp`. Used by the
    /// sweeper to claim a whole bucket at once.
    pub fn take_bucket(&self, timestamp: i64) -> Vec<Vec<u8>> {
        let mut inner = self.inner.write();
        let keys = inner.buckets.remove(&timestamp).unwrap_or_default();
        for key in &keys {
            inner.index.remove(key);
        }
        if !keys.is_empty() {
            self.dirty.store(true, Ordering::Relaxed);
        }
        keys
    }

    /// Returns every bucket timestamp strictly less than `now`, for the
    /// startup catch-up sweep.
    pub fn expired_bucket_timestamps(&self, now: i64) -> Vec<i64> {
        self.inner
            .read()
            .buckets
            .keys()
            .copied()
            .filter(|&ts| ts < now)
            .collect()
    }

    /// Empties both the buckets and the reverse index.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.buckets.clear();
        inner.index.clear();
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Serializes the buckets as decimal-string-keyed key lists, matching
    /// the on-disk expiration snapshot format.
    pub fn to_map(&self) -> HashMap<String, Vec<Vec<u8>>> {
        self.inner
            .read()
            .buckets
            .iter()
            .map(|(ts, keys)| (ts.to_string(), keys.clone()))
            .collect()
    }

    /// Replaces the index from a loaded snapshot map. Timestamps that fail
    /// to parse as `i64` are skipped rather than failing the whole load.
    pub fn from_map(&self, map: HashMap<String, Vec<Vec<u8>>>) {
        let mut inner = self.inner.write();
        inner.buckets.clear();
        inner.index.clear();
        for (ts_str, keys) in map {
            let Ok(ts) = ts_str.parse::<i64>() else {
                tracing::warn!(timestamp = %ts_str, "skipping unparsable expiration bucket");
                continue;
            };
            for key in keys {
                inner.index.insert(key.clone(), ts);
                inner.buckets.entry(ts).or_default().push(key);
            }
        }
        self.dirty.store(false, Ordering::Relaxed);
    }

    pub fn bucket_count(&self) -> usize {
        self.inner.read().buckets.len()
    }

    pub fn indexed_count(&self) -> usize {
        self.inner.read().index.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Relaxed);
    }
}

impl Default for Exi {
    fn default() -> Self {
        Self::new()
    }
}
