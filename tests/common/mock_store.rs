//! Instrumented in-memory store and provider for integration tests.

#![allow(dead_code)]

use lease_lock_core::error::LockResult;
use lease_lock_core::memory::MemoryLeaseStore;
use lease_lock_core::options::RetryPolicy;
use lease_lock_core::traits::{LeaseStore, LockProvider};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Store wrapper counting every primitive call.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryLeaseStore,
    set_calls: AtomicUsize,
    set_wins: AtomicUsize,
    delete_calls: AtomicUsize,
    delete_wins: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn set_wins(&self) -> usize {
        self.set_wins.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn delete_wins(&self) -> usize {
        self.delete_wins.load(Ordering::SeqCst)
    }

    /// Total number of store round-trips.
    pub fn calls(&self) -> usize {
        self.set_calls() + self.delete_calls()
    }
}

impl LeaseStore for CountingStore {
    async fn try_set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> LockResult<bool> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        let created = self.inner.try_set_with_expiry(key, value, ttl_secs).await?;
        if created {
            self.set_wins.fetch_add(1, Ordering::SeqCst);
        }
        Ok(created)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> LockResult<bool> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let deleted = self.inner.compare_and_delete(key, expected).await?;
        if deleted {
            self.delete_wins.fetch_add(1, Ordering::SeqCst);
        }
        Ok(deleted)
    }
}

/// Provider handing out locks on a shared [`CountingStore`].
pub struct MockLockProvider {
    store: Arc<CountingStore>,
    ttl: Duration,
    retry: RetryPolicy,
}

impl MockLockProvider {
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: Arc::new(CountingStore::new()),
            ttl,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl LockProvider for MockLockProvider {
    type Store = CountingStore;

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
