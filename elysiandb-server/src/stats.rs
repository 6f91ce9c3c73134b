//! # Request Counters
//!
//! Lightweight atomic counters updated from the protocol handlers. No
//! exposition surface is built here; that belongs to the HTTP façade, an
//! external collaborator this workspace does not implement. The counters
//! exist so a future exporter (or a test) has something to read.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: `AtomicU64` counters, incremented inline on
//!    the request path, no locks.
//! 2. **Disableable**: when `stats.enabled` is false in configuration, the
//!    caller simply never calls the increment methods; the struct itself is
//!    always present so handler code does not need two code paths.
//! 3. **Live Store Size, Not Tracked**: `keys_count`/`expiration_keys_count`
//!    are read straight from the engine at snapshot time rather than kept
//!    as their own counters, so they can never drift from the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use elysiandb_engine::Engine;

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub uptime_seconds: u64,
    pub keys_count: usize,
    pub expiration_keys_count: usize,
}

/// Thread-safe request counters for the TCP server.
pub struct Stats {
    enabled: bool,
    started_at: Instant,
    total_requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Stats {
    pub fn new(enabled: bool) -> Self {
        Stats {
            enabled,
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_request(&self) {
        if self.enabled {
            self.total_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_hit(&self) {
        if self.enabled {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_miss(&self) {
        if self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Takes a point-in-time view of the counters, reading the current
    /// store size directly off `engine` rather than tracking it separately.
    pub fn snapshot(&self, engine: &Engine) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            keys_count: engine.keys_count(),
            expiration_keys_count: engine.expiration_keys_count(),
        }
    }
}
