//! # Sharded Key-Value Store
//!
//! Provide the primary key/value mapping backing the store, partitioned
//! into fixed-size shards so reads and writes on unrelated keys never
//! contend on the same lock.
//!
//! ## Design Principles
//!
//! 1. **Sharded Locks**: per-shard `RwLock` reduces contention under
//!    concurrency; operations on two different keys almost never block each
//!    other.
//! 2. **Copy In, Copy Out**: values are copied on both `put` and `get` so the
//!    store never aliases caller-owned buffers.
//! 3. **No Cross-Shard Snapshot**: `iterate`/`to_map`/`reset` visit shards one
//!    at a time and make no claim about a globally consistent view.

use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;

/// Fixed shard count. Chosen as a power of two so shard selection is a mask,
/// not a modulo.
pub const SHARD_COUNT: usize = 128;

struct Shard {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>, RandomState>>,
}

/// Sharded in-memory key-value store.
pub struct Kvs {
    shards: Vec<Shard>,
    shard_mask: usize,
    hash_state: RandomState,
    dirty: AtomicBool,
}

impl Kvs {
    /// Creates an empty store with the fixed shard count.
    pub fn new() -> Self {
        Self::with_shard_count(SHARD_COUNT)
    }

    /// Creates an empty store with a caller-provided shard count, normalized
    /// to the next power of two. Exposed mainly so tests can exercise a
    /// small number of shards without constructing 128 locks.
    pub fn with_shard_count(shards: usize) -> Self {
        let shard_count = shards.max(1).next_power_of_two();
        let hash_state = RandomState::new();
        let mut shard_vec = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shard_vec.push(Shard {
                inner: RwLock::new(HashMap::with_hasher(hash_state.clone())),
            });
        }

        Kvs {
            shards: shard_vec,
            shard_mask: shard_count - 1,
            hash_state,
            dirty: AtomicBool::new(false),
        }
    }

    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = self.hash_state.build_hasher();
        hasher.write(key);
        (hasher.finish() as usize) & self.shard_mask
    }

    fn shard_for(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Looks up a key and returns a fresh copy of its value.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let shard = self.shard_for(key);
        shard.inner.read().get(key).cloned()
    }

    /// Returns true if the key is present, without copying its value.
    pub fn contains(&self, key: &[u8]) -> bool {
        let shard = self.shard_for(key);
        shard.inner.read().contains_key(key)
    }

    /// Inserts or overwrites a key with a copy of `value`.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        let shard = self.shard_for(&key);
        shard.inner.write().insert(key, value);
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Removes a key. Returns true if a key was actually removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let shard = self.shard_for(key);
        let removed = shard.inner.write().remove(key).is_some();
        if removed {
            self.dirty.store(true, Ordering::Relaxed);
        }
        removed
    }

    /// Empties every shard.
    pub fn reset(&self) {
        for shard in &self.shards {
            shard.inner.write().clear();
        }
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Visits every key/value pair, one shard at a time. The visitor sees a
    /// copy of each value, never a live reference into a shard.
    pub fn iterate(&self, mut visit: impl FnMut(&[u8], &[u8])) {
        for shard in &self.shards {
            let guard = shard.inner.read();
            for (key, value) in guard.iter() {
                visit(key, value);
            }
        }
    }

    /// Returns a copy of the whole store as an owned map. Not a consistent
    /// point-in-time snapshot across shards.
    pub fn to_map(&self) -> std::collections::HashMap<Vec<u8>, Vec<u8>> {
        let mut out = std::collections::HashMap::new();
        self.iterate(|k, v| {
            out.insert(k.to_vec(), v.to_vec());
        });
        out
    }

    /// Replaces the store's contents with `map`, clearing the dirty flag
    /// (used right after a snapshot load, which is not itself a mutation
    /// worth re-persisting).
    pub fn from_map(&self, map: std::collections::HashMap<Vec<u8>, Vec<u8>>) {
        self.reset();
        for (key, value) in map {
            let shard = self.shard_for(&key);
            shard.inner.write().insert(key, value);
        }
        self.dirty.store(false, Ordering::Relaxed);
    }

    /// Total entry count across all shards, taken one shard at a time.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.inner.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if any mutating operation has happened since the last
    /// `clear_dirty`.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Clears the dirty flag after a successful snapshot flush.
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Relaxed);
    }
}

impl Default for Kvs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let kvs = Kvs::with_shard_count(4);
        kvs.put(b"alpha".to_vec(), b"value".to_vec());
        assert_eq!(kvs.get(b"alpha"), Some(b"value".to_vec()));
    }

    #[test]
    fn delete_removes_key() {
        let kvs = Kvs::with_shard_count(2);
        kvs.put(b"alpha".to_vec(), b"value".to_vec());
        assert!(kvs.delete(b"alpha"));
        assert!(kvs.get(b"alpha").is_none());
        assert!(!kvs.delete(b"alpha"));
    }

    #[test]
    fn reset_clears_every_shard() {
        let kvs = Kvs::with_shard_count(4);
        kvs.put(b"a".to_vec(), b"1".to_vec());
        kvs.put(b"b".to_vec(), b"2".to_vec());
        kvs.reset();
        assert_eq!(kvs.len(), 0);
    }

    #[test]
    fn get_never_aliases_stored_bytes() {
        let kvs = Kvs::with_shard_count(2);
        kvs.put(b"alpha".to_vec(), b"value".to_vec());
        let mut copy = kvs.get(b"alpha").unwrap();
        copy[0] = b'X';
        assert_eq!(kvs.get(b"alpha"), Some(b"value".to_vec()));
    }

    #[test]
    fn dirty_flag_tracks_mutations() {
        let kvs = Kvs::with_shard_count(2);
        assert!(!kvs.is_dirty());
        kvs.put(b"a".to_vec(), b"1".to_vec());
        assert!(kvs.is_dirty());
        kvs.clear_dirty();
        assert!(!kvs.is_dirty());
    }

    #[test]
    fn from_map_loads_and_clears_dirty() {
        let kvs = Kvs::with_shard_count(4);
        let mut map = std::collections::HashMap::new();
        map.insert(b"a".to_vec(), b"1".to_vec());
        map.insert(b"b".to_vec(), b"2".to_vec());
        kvs.from_map(map);
        assert_eq!(kvs.len(), 2);
        assert!(!kvs.is_dirty());
    }
}
