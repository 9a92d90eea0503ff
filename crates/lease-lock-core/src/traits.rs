//! Core traits for lease locks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LockResult;
use crate::mutex::Mutex;
use crate::options::{MutexOptions, RetryPolicy};
use crate::reentrant::{LockContext, ReentrantMutex};

// ============================================================================
// Store Adapter Trait
// ============================================================================

/// The two atomic primitives a shared key-value store must offer.
///
/// Mutual exclusion across processes rests entirely on these operations
/// being indivisible on the store side. Connection handling, transport
/// retries and script loading belong to the implementation.
///
/// # Example
///
/// ```rust,ignore
/// // Redis: SET key token EX ttl NX
/// let created = store.try_set_with_expiry("job:42", token.as_str(), 30).await?;
///
/// // Redis: EVAL "if get == ARGV[1] then del" 1 key token
/// let deleted = store.compare_and_delete("job:42", token.as_str()).await?;
/// ```
pub trait LeaseStore: Send + Sync {
    /// Creates `key` holding `value` with an expiry of `ttl_secs` seconds,
    /// only if `key` does not exist.
    ///
    /// Returns whether the key was created.
    fn try_set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Deletes `key` only if its current value equals `expected`.
    ///
    /// Returns whether the key was deleted.
    fn compare_and_delete(
        &self,
        key: &str,
        expected: &str,
    ) -> impl Future<Output = LockResult<bool>> + Send;
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Factory for creating lease locks by key.
///
/// Providers carry the store connection plus default TTL and retry policy,
/// allowing application code to be backend-agnostic.
///
/// # Example
///
/// ```rust,ignore
/// // Configure once at startup
/// let provider = RedisLockProvider::builder().ttl_secs(30).build().await?;
///
/// // Create locks by key anywhere in the application
/// let mut lock = provider.create_mutex("job:42")?;
/// lock.scope(run_job()).await?;
/// ```
pub trait LockProvider: Send + Sync {
    /// The store adapter locks created by this provider talk to.
    type Store: LeaseStore + 'static;

    /// Shared handle to the store.
    fn store(&self) -> Arc<Self::Store>;

    /// Lease length applied to created locks.
    fn ttl(&self) -> Duration;

    /// Retry policy applied to created locks.
    fn retry_policy(&self) -> RetryPolicy;

    /// Validated options for `key` using this provider's defaults.
    fn options(&self, key: &str) -> LockResult<MutexOptions> {
        MutexOptions::builder(key)
            .ttl(self.ttl())
            .retry(self.retry_policy())
            .build()
    }

    /// Creates a non-reentrant lock on `key`.
    fn create_mutex(&self, key: &str) -> LockResult<Mutex<Self::Store>> {
        Ok(Mutex::with_shared_store(self.options(key)?, self.store()))
    }

    /// Creates a reentrant lock on `key` bound to the nesting state of `context`.
    fn create_reentrant_mutex(
        &self,
        key: &str,
        context: &LockContext,
    ) -> LockResult<ReentrantMutex<Self::Store>> {
        Ok(ReentrantMutex::with_shared_store(
            self.options(key)?,
            self.store(),
            context,
        ))
    }
}
