//! Unique-until-executing locks.
//!
//! While a unique job waits in the queue, enqueueing an identical job is a
//! no-op. The lock is released when the job starts executing, so a change made
//! during execution still gets its own job. Locks are held in process memory
//! and expire after a TTL, which bounds the damage of a lost release.
//!
//! Only the orchestrator that runs a job can release its lock, so a client
//! takes locks only when it shares them with the orchestrator in its own
//! process (`SearchSyncClient::with_shared_locks`). Duplicates published from
//! other processes are collapsed when they arrive in the same batch.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default lock lifetime, in seconds.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 600;

#[derive(Debug)]
pub struct UniqueJobLocks {
    ttl: Duration,
    held: Mutex<HashMap<String, Instant>>,
}

impl Default for UniqueJobLocks {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_LOCK_TTL_SECS))
    }
}

impl UniqueJobLocks {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Take the lock for `key`. Returns `false` when a live lock already
    /// exists.
    pub fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.retain(|_, expires_at| *expires_at > now);

        if held.contains_key(key) {
            return false;
        }
        held.insert(key.to_string(), now + self.ttl);
        true
    }

    pub fn release(&self, key: &str) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(key);
    }

    pub fn is_held(&self, key: &str) -> bool {
        let held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.get(key)
            .map(|expires_at| *expires_at > Instant::now())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_acquire_is_refused() {
        let locks = UniqueJobLocks::default();
        assert!(locks.try_acquire("index:Article:42"));
        assert!(!locks.try_acquire("index:Article:42"));
        assert!(locks.try_acquire("index:Article:43"));
    }

    #[test]
    fn test_release_allows_reacquire() {
        let locks = UniqueJobLocks::default();
        assert!(locks.try_acquire("sync:Tag:3"));
        locks.release("sync:Tag:3");
        assert!(!locks.is_held("sync:Tag:3"));
        assert!(locks.try_acquire("sync:Tag:3"));
    }

    #[test]
    fn test_expired_lock_is_ignored() {
        let locks = UniqueJobLocks::new(Duration::ZERO);
        assert!(locks.try_acquire("sync:Tag:3"));
        assert!(!locks.is_held("sync:Tag:3"));
        assert!(locks.try_acquire("sync:Tag:3"));
    }
}
