//! # Expiration Sweeper
//!
//! Periodically reclaim keys whose expiration bucket has passed, and catch
//! up on keys that expired while the process was not running.
//!
//! ## Design Principles
//!
//! 1. **Bucket Claim, Not Scan**: each tick claims the bucket for the
//!    current second directly instead of scanning every key's TTL.
//! 2. **Startup Catch-Up**: buckets left over from a previous run are swept
//!    once at load time so stale keys don't linger until their original
//!    second rolls around again (it won't).

use std::sync::Arc;
use std::time::Duration;

use crate::engine::{now_epoch_seconds, Engine};

const TICK: Duration = Duration::from_secs(1);

/// Reclaims every key bound to `now`'s bucket. Returns the number of keys
/// removed.
pub fn sweep_once(engine: &Engine, now: i64) -> usize {
    let keys = engine.exi().take_bucket(now);
    for key in &keys {
        engine.kvs().delete(key);
    }
    keys.len()
}

/// Reclaims every bucket whose timestamp is already in the past. Intended
/// to run once right after a snapshot load.
pub fn startup_sweep(engine: &Engine) -> usize {
    let now = now_epoch_seconds();
    let mut total = 0;
    for timestamp in engine.exi().expired_bucket_timestamps(now + 1) {
        total += sweep_once(engine, timestamp);
    }
    total
}

/// Spawns the background task that sweeps one bucket per second for as
/// long as the returned handle is alive.
pub fn spawn(engine: Arc<Engine>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        loop {
            interval.tick().await;
            let now = now_epoch_seconds();
            let removed = sweep_once(&engine, now);
            if removed > 0 {
                tracing::debug!(removed, "swept expired keys");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_once_removes_only_the_claimed_bucket() {
        let engine = Engine::new();
        engine.set(b"alpha".to_vec(), b"1".to_vec(), None);
        engine.exi().put(b"alpha".to_vec(), 100);
        engine.set(b"beta".to_vec(), b"2".to_vec(), None);
        engine.exi().put(b"beta".to_vec(), 200);

        let removed = sweep_once(&engine, 100);
        assert_eq!(removed, 1);
        assert!(engine.get(b"alpha").is_none());
        assert_eq!(engine.get(b"beta"), Some(b"2".to_vec()));
    }

    #[test]
    fn startup_sweep_reclaims_every_past_bucket() {
        let engine = Engine::new();
        let now = now_epoch_seconds();
        engine.set(b"alpha".to_vec(), b"1".to_vec(), None);
        engine.exi().put(b"alpha".to_vec(), now - 100);
        engine.set(b"beta".to_vec(), b"2".to_vec(), None);
        engine.exi().put(b"beta".to_vec(), now - 50);
        engine.set(b"gamma".to_vec(), b"3".to_vec(), None);
        engine.exi().put(b"gamma".to_vec(), now + 1000);

        let removed = startup_sweep(&engine);
        assert_eq!(removed, 2);
        assert!(engine.get(b"alpha").is_none());
        assert!(engine.get(b"beta").is_none());
        assert_eq!(engine.get(b"gamma"), Some(b"3".to_vec()));
    }
}
