//! Non-reentrant lease lock.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{Span, debug, field, instrument, warn};

use crate::error::{LockError, LockResult};
use crate::options::MutexOptions;
use crate::token::HolderToken;
use crate::traits::LeaseStore;

/// A lease lock on a single key of a shared store.
///
/// `lock()` writes a fresh [`HolderToken`] under the key with the configured
/// TTL, polling until the key is free. `unlock()` deletes the key only if it
/// still holds that token, so a holder whose lease expired cannot release a
/// lock that someone else has taken over since.
///
/// # Example
///
/// ```rust,ignore
/// let options = MutexOptions::builder("job:42").ttl_secs(30).build()?;
/// let mut lock = Mutex::new(options, store);
///
/// let report = lock.scope(async { run_job().await }).await?;
/// ```
pub struct Mutex<S> {
    options: MutexOptions,
    store: Arc<S>,
    /// Token of the latest `lock()` call, overwritten on every call.
    token: Option<HolderToken>,
}

impl<S: LeaseStore + 'static> Mutex<S> {
    /// Creates a lock that owns its store adapter.
    pub fn new(options: MutexOptions, store: S) -> Self {
        Self::with_shared_store(options, Arc::new(store))
    }

    /// Creates a lock on a store adapter shared with other locks.
    pub fn with_shared_store(options: MutexOptions, store: Arc<S>) -> Self {
        Self {
            options,
            store,
            token: None,
        }
    }

    pub fn key(&self) -> &str {
        self.options.key()
    }

    pub fn ttl(&self) -> Duration {
        self.options.ttl()
    }

    /// `false` when this lock object was configured as a no-op.
    pub fn should_lock(&self) -> bool {
        self.options.should_lock()
    }

    pub fn options(&self) -> &MutexOptions {
        &self.options
    }

    /// Token written by the latest `lock()` or `try_lock()` call.
    pub fn token(&self) -> Option<&HolderToken> {
        self.token.as_ref()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Acquires the lock, polling the store until the key is free.
    ///
    /// Sleeps the retry interval between attempts, without backoff. With no
    /// maximum wait configured this blocks the calling task until the key is
    /// released or its lease expires.
    ///
    /// # Errors
    ///
    /// * `LockError::Timeout` - the configured maximum wait elapsed
    /// * `LockError::Connection` / `LockError::Backend` - store failure
    #[instrument(
        skip(self),
        fields(
            lock.key = %self.options.key(),
            ttl_secs = self.options.ttl_secs(),
            acquired = field::Empty,
            attempts = field::Empty,
            elapsed_ms = field::Empty,
        )
    )]
    pub async fn lock(&mut self) -> LockResult<()> {
        let token = HolderToken::generate();
        self.token = Some(token.clone());

        let retry = *self.options.retry();
        let start = Instant::now();
        let deadline = retry
            .max_wait
            .and_then(|max_wait| Some((max_wait, start.checked_add(max_wait)?)));
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            let created = self
                .store
                .try_set_with_expiry(self.options.key(), token.as_str(), self.options.ttl_secs())
                .await?;

            if created {
                let span = Span::current();
                span.record("acquired", true);
                span.record("attempts", attempts);
                span.record("elapsed_ms", start.elapsed().as_millis() as u64);
                return Ok(());
            }

            let pause = match deadline {
                None => retry.interval,
                Some((max_wait, deadline)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        let span = Span::current();
                        span.record("acquired", false);
                        span.record("attempts", attempts);
                        return Err(LockError::Timeout(max_wait));
                    }
                    // Don't sleep past the deadline
                    retry.interval.min(deadline - now)
                }
            };

            tokio::time::sleep(pause).await;
        }
    }

    /// Makes a single acquisition attempt.
    ///
    /// Returns `Ok(true)` if the lock was acquired and `Ok(false)` if the key
    /// is held by someone else.
    #[instrument(skip(self), fields(lock.key = %self.options.key(), acquired = field::Empty))]
    pub async fn try_lock(&mut self) -> LockResult<bool> {
        let token = HolderToken::generate();
        self.token = Some(token.clone());

        let created = self
            .store
            .try_set_with_expiry(self.options.key(), token.as_str(), self.options.ttl_secs())
            .await?;
        Span::current().record("acquired", created);
        Ok(created)
    }

    /// Releases the lock if this instance still holds it.
    ///
    /// Returns `Ok(false)` without touching the store when the key holds a
    /// different token (the lease expired and was taken over) or is gone.
    /// That case is logged at warn level and is not an error.
    #[instrument(skip(self), fields(lock.key = %self.options.key(), released = field::Empty))]
    pub async fn unlock(&mut self) -> LockResult<bool> {
        let Some(token) = self.token.as_ref() else {
            debug!("unlock called before any lock attempt; nothing to release");
            return Ok(false);
        };

        let released = self
            .store
            .compare_and_delete(self.options.key(), token.as_str())
            .await?;
        Span::current().record("released", released);

        if !released {
            warn!(
                lock.key = %self.options.key(),
                token = %token,
                "lock no longer held by this holder on release; lease expired or was taken over"
            );
        }
        Ok(released)
    }

    /// Runs `body` while holding the lock.
    ///
    /// The lock is released however the body ends: normal completion, a
    /// panic (re-raised after release), or the returned future being dropped
    /// mid-hold, in which case release is spawned on the current tokio
    /// runtime. A body returning `Err` is a normal completion. When
    /// `should_lock` is false the body runs without touching the store.
    pub async fn scope<Fut>(&mut self, body: Fut) -> LockResult<Fut::Output>
    where
        Fut: Future,
    {
        if !self.options.should_lock() {
            debug!(lock.key = %self.options.key(), "locking disabled; running body unlocked");
            return Ok(body.await);
        }

        self.lock().await?;
        let mut guard = self.release_on_drop();

        let outcome = AssertUnwindSafe(body).catch_unwind().await;
        let released = self.unlock().await;
        guard.disarm();

        match outcome {
            Ok(value) => released.map(|_| value),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    pub(crate) fn release_on_drop(&self) -> ReleaseOnDrop<S> {
        ReleaseOnDrop {
            pending: self
                .token
                .clone()
                .map(|token| (self.store.clone(), self.options.key().to_string(), token)),
        }
    }
}

/// Releases a held lease if a scope future is dropped before its exit path ran.
pub(crate) struct ReleaseOnDrop<S: LeaseStore + 'static> {
    pending: Option<(Arc<S>, String, HolderToken)>,
}

impl<S: LeaseStore + 'static> ReleaseOnDrop<S> {
    pub(crate) fn disarm(&mut self) {
        self.pending = None;
    }
}

impl<S: LeaseStore + 'static> Drop for ReleaseOnDrop<S> {
    fn drop(&mut self) {
        let Some((store, key, token)) = self.pending.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    match store.compare_and_delete(&key, token.as_str()).await {
                        Ok(true) => debug!(lock.key = %key, "released lock of cancelled scope"),
                        Ok(false) => warn!(
                            lock.key = %key,
                            token = %token,
                            "lock of cancelled scope no longer held on release"
                        ),
                        Err(e) => warn!(
                            lock.key = %key,
                            error = %e,
                            "failed to release lock of cancelled scope; lease will expire"
                        ),
                    }
                });
            }
            Err(_) => warn!(
                lock.key = %key,
                "scope dropped outside a tokio runtime; lease will expire after its ttl"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLeaseStore;

    fn mutex(key: &str, ttl_secs: u64, store: &Arc<MemoryLeaseStore>) -> Mutex<MemoryLeaseStore> {
        let options = MutexOptions::builder(key).ttl_secs(ttl_secs).build().unwrap();
        Mutex::with_shared_store(options, store.clone())
    }

    #[tokio::test]
    async fn test_lock_writes_token() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut lock = mutex("k", 10, &store);

        lock.lock().await.unwrap();
        let token = lock.token().unwrap().as_str().to_string();
        assert_eq!(store.get("k"), Some(token));
    }

    #[tokio::test]
    async fn test_lock_unlock_round_trip() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut lock = mutex("k", 10, &store);

        lock.lock().await.unwrap();
        assert!(lock.unlock().await.unwrap());
        assert!(!store.contains("k"));
    }

    #[tokio::test]
    async fn test_each_lock_uses_new_token() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut lock = mutex("k", 10, &store);

        lock.lock().await.unwrap();
        let first = lock.token().cloned();
        lock.unlock().await.unwrap();

        lock.lock().await.unwrap();
        assert_ne!(lock.token().cloned(), first);
    }

    #[tokio::test]
    async fn test_unlock_before_lock_is_noop() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut lock = mutex("k", 10, &store);
        assert!(!lock.unlock().await.unwrap());
    }

    #[tokio::test]
    async fn test_try_lock_contended() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut a = mutex("k", 10, &store);
        let mut b = mutex("k", 10, &store);

        assert!(a.try_lock().await.unwrap());
        assert!(!b.try_lock().await.unwrap());
        // b never held the lock, so it must not release a's
        assert!(!b.unlock().await.unwrap());
        assert!(store.contains("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_times_out() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut holder = mutex("k", 60, &store);
        holder.lock().await.unwrap();

        let options = MutexOptions::builder("k")
            .ttl_secs(60)
            .max_wait(Duration::from_millis(350))
            .build()
            .unwrap();
        let mut waiter = Mutex::with_shared_store(options, store.clone());

        let start = Instant::now();
        let err = waiter.lock().await.unwrap_err();
        assert!(matches!(err, LockError::Timeout(d) if d == Duration::from_millis(350)));
        assert!(start.elapsed() >= Duration::from_millis(350));
        assert!(start.elapsed() < Duration::from_millis(450));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_keeps_sub_millisecond_precision() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut holder = mutex("k", 60, &store);
        holder.lock().await.unwrap();

        let max_wait = Duration::from_micros(1500);
        let options = MutexOptions::builder("k")
            .ttl_secs(60)
            .max_wait(max_wait)
            .build()
            .unwrap();
        let mut waiter = Mutex::with_shared_store(options, store.clone());

        let start = Instant::now();
        let err = waiter.lock().await.unwrap_err();
        assert!(matches!(err, LockError::Timeout(d) if d == max_wait));
        assert!(start.elapsed() >= max_wait);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_waits_for_expiry() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut crashed = mutex("k", 1, &store);
        crashed.lock().await.unwrap();

        let mut waiter = mutex("k", 1, &store);
        let start = Instant::now();
        waiter.lock().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_scope_releases_on_error() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut lock = mutex("k", 10, &store);

        let result: Result<(), &str> = lock
            .scope(async {
                assert!(store.contains("k"));
                Err("job failed")
            })
            .await
            .unwrap();

        assert_eq!(result, Err("job failed"));
        assert!(!store.contains("k"));
    }

    #[tokio::test]
    async fn test_scope_releases_on_panic() {
        let store = Arc::new(MemoryLeaseStore::new());
        let store_clone = store.clone();

        let task = tokio::spawn(async move {
            let mut lock = mutex("k", 10, &store_clone);
            lock.scope(async {
                panic!("boom");
            })
            .await
        });

        assert!(task.await.unwrap_err().is_panic());
        assert!(!store.contains("k"));
    }

    #[tokio::test]
    async fn test_scope_releases_on_cancel() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut lock = mutex("k", 10, &store);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            lock.scope(std::future::pending::<()>()),
        )
        .await;
        assert!(cancelled.is_err());

        // Release runs on a spawned task
        for _ in 0..100 {
            if !store.contains("k") {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!store.contains("k"));
    }

    #[tokio::test]
    async fn test_disabled_lock_never_touches_store() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut holder = mutex("k", 10, &store);
        holder.lock().await.unwrap();

        let options = MutexOptions::builder("k").should_lock(false).build().unwrap();
        let mut disabled = Mutex::with_shared_store(options, store.clone());

        // Would block forever if it tried to lock
        let value = disabled.scope(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
        assert!(disabled.token().is_none());
        assert_eq!(store.get("k").as_deref(), holder.token().map(|t| t.as_str()));
    }
}
