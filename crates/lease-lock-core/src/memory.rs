//! In-process store backend.
//!
//! Keeps leases in a hash map guarded by a standard mutex and expires them
//! lazily on access. Timestamps come from `tokio::time`, so tests running with
//! a paused clock see leases expire as the clock is advanced.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{LockError, LockResult};
use crate::options::{DEFAULT_TTL_SECS, RetryPolicy};
use crate::traits::{LeaseStore, LockProvider};

#[derive(Debug)]
struct Lease {
    value: String,
    expires_at: Instant,
}

impl Lease {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A [`LeaseStore`] living in the current process.
///
/// Useful for tests and for serializing tasks of a single process; it offers
/// no protection across processes.
#[derive(Debug, Default)]
pub struct MemoryLeaseStore {
    leases: Mutex<HashMap<String, Lease>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn leases(&self) -> MutexGuard<'_, HashMap<String, Lease>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current live value under `key`, if any.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.leases()
            .get(key)
            .filter(|lease| lease.is_live(now))
            .map(|lease| lease.value.clone())
    }

    /// Returns `true` if a live lease exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl LeaseStore for MemoryLeaseStore {
    async fn try_set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> LockResult<bool> {
        let now = Instant::now();
        let Some(expires_at) = now.checked_add(Duration::from_secs(ttl_secs)) else {
            return Err(LockError::config(format!("ttl of {ttl_secs}s is out of range")));
        };
        let mut leases = self.leases();

        if leases.get(key).is_some_and(|lease| lease.is_live(now)) {
            return Ok(false);
        }

        leases.insert(
            key.to_string(),
            Lease {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> LockResult<bool> {
        let now = Instant::now();
        let mut leases = self.leases();

        match leases.get(key) {
            Some(lease) if lease.is_live(now) && lease.value == expected => {
                leases.remove(key);
                Ok(true)
            }
            Some(lease) if !lease.is_live(now) => {
                leases.remove(key);
                Ok(false)
            }
            _ => Ok(false),
        }
    }
}

/// Provider for locks on one shared [`MemoryLeaseStore`].
#[derive(Debug, Clone)]
pub struct MemoryLockProvider {
    store: Arc<MemoryLeaseStore>,
    ttl: Duration,
    retry: RetryPolicy,
}

impl MemoryLockProvider {
    /// Creates a provider on a fresh store with default TTL and retry policy.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryLeaseStore::new()),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the lease length of created locks.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets how created locks poll while the key is taken.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for MemoryLockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LockProvider for MemoryLockProvider {
    type Store = MemoryLeaseStore;

    fn store(&self) -> Arc<Self::Store> {
        self.store.clone()
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}
