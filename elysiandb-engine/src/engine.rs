//! # Storage Engine Facade
//!
//! Bundle the key-value store and the expiration index behind the small set
//! of operations the protocol layer actually needs, so handlers never touch
//! `Kvs`/`Exi` directly and never have to remember the lock-ordering rule
//! (EXI before KVS, never both at once) by hand.
//!
//! ## Design Principles
//!
//! 1. **Facade Pattern**: one struct, one `Arc`, shared by every connection
//!    task and every background task.
//! 2. **Lazy Expiration on Read**: every lookup consults the expiration
//!    index first so a client can never observe a value past its TTL, even
//!    between sweeper ticks.
//! 3. **Wildcard Redirection**: any key containing an unescaped `*` or `?`
//!    is handled by scanning the store instead of a direct lookup.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::exi::Exi;
use crate::glob;
use crate::kvs::Kvs;

/// Returns the current wall-clock time as whole epoch seconds.
pub fn now_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The in-memory storage engine: the key-value store plus its expiration
/// index, operated on together so TTL semantics are never visible to a
/// caller as two separate steps.
pub struct Engine {
    kvs: Kvs,
    exi: Exi,
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            kvs: Kvs::new(),
            exi: Exi::new(),
        }
    }

    pub fn kvs(&self) -> &Kvs {
        &self.kvs
    }

    pub fn exi(&self) -> &Exi {
        &self.exi
    }

    /// Removes `key` from both structures if its expiration has passed.
    /// Returns true if the key was removed.
    fn reap_if_expired(&self, key: &[u8], now: i64) -> bool {
        if self.exi.has_expired(key, now) {
            self.kvs.delete(key);
            self.exi.del(key);
            true
        } else {
            false
        }
    }

    /// Fetches a single key, applying lazy expiration first.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let now = now_epoch_seconds();
        if self.reap_if_expired(key, now) {
            return None;
        }
        self.kvs.get(key)
    }

    /// Inserts `value` under `key`, optionally attaching a TTL in whole
    /// seconds. A TTL of `None` or `Some(0)` means no expiration (and clears
    /// any TTL a prior value under the same key may have carried).
    pub fn set(&self, key: Vec<u8>, value: Vec<u8>, ttl_seconds: Option<u64>) {
        self.exi.del(&key);
        self.kvs.put(key.clone(), value);
        if let Some(ttl) = ttl_seconds.filter(|&t| t > 0) {
            self.exi.put(key, now_epoch_seconds() + ttl as i64);
        }
    }

    /// Removes a single key. Returns true if a live key was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let now = now_epoch_seconds();
        if self.reap_if_expired(key, now) {
            return false;
        }
        let removed = self.kvs.delete(key);
        self.exi.del(key);
        removed
    }

    /// Clears every key and every expiration binding.
    pub fn reset(&self) {
        self.kvs.reset();
        self.exi.reset();
    }

    /// Returns every live (key, value) pair whose key matches `pattern`.
    /// Keys that have expired since the last sweep are skipped and reaped.
    pub fn wildcard_get(&self, pattern: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let now = now_epoch_seconds();
        let mut hits = Vec::new();
        let mut expired = Vec::new();

        self.kvs.iterate(|key, value| {
            if !glob::matches(pattern, key) {
                return;
            }
            if self.exi.has_expired(key, now) {
                expired.push(key.to_vec());
            } else {
                hits.push((key.to_vec(), value.to_vec()));
            }
        });

        for key in expired {
            self.kvs.delete(&key);
            self.exi.del(&key);
        }

        hits
    }

    /// Deletes every live key matching `pattern`. Returns the number of keys
    /// removed (expired keys found along the way are reaped but not counted
    /// as deleted by this call).
    pub fn wildcard_delete(&self, pattern: &[u8]) -> usize {
        let now = now_epoch_seconds();
        let mut live = Vec::new();
        let mut expired = Vec::new();

        self.kvs.iterate(|key, _value| {
            if !glob::matches(pattern, key) {
                return;
            }
            if self.exi.has_expired(key, now) {
                expired.push(key.to_vec());
            } else {
                live.push(key.to_vec());
            }
        });

        for key in &expired {
            self.kvs.delete(key);
            self.exi.del(key);
        }

        let mut deleted = 0;
        for key in &live {
            if self.kvs.delete(key) {
                self.exi.del(key);
                deleted += 1;
            }
        }
        deleted
    }

    /// Total number of live keys. Not adjusted for keys whose expiration has
    /// passed but have not yet been swept.
    pub fn keys_count(&self) -> usize {
        self.kvs.len()
    }

    /// Number of keys currently carrying a TTL.
    pub fn expiration_keys_count(&self) -> usize {
        self.exi.indexed_count()
    }

    pub fn is_dirty(&self) -> bool {
        self.kvs.is_dirty() || self.exi.is_dirty()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
