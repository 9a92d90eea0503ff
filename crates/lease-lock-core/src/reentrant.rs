//! Reentrant lease lock and the per-call-context nesting state it relies on.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, instrument};

use crate::error::{LockError, LockResult};
use crate::mutex::Mutex;
use crate::options::MutexOptions;
use crate::traits::LeaseStore;

// ============================================================================
// Lock Context
// ============================================================================

/// Keys held by one logical call stack, with an entry count per key.
///
/// A context belongs to exactly one call stack and is handed down by `&mut`
/// through nested [`ReentrantMutex::scope`] calls, so it is never observed
/// concurrently. Only the scope that takes the store lock records an entry;
/// keys with depth zero have no entry.
///
/// # Example
///
/// ```rust,ignore
/// let mut ctx = LockContext::new();
/// let mut outer = provider.create_reentrant_mutex("job:42", &ctx)?;
/// outer
///     .scope(&mut ctx, async |ctx| {
///         // Same key again: no store round-trip, no self-deadlock
///         let mut inner = provider.create_reentrant_mutex("job:42", ctx)?;
///         inner.scope(ctx, async |_| step().await).await
///     })
///     .await??;
/// ```
#[derive(Debug, Default)]
pub struct LockContext {
    depths: HashMap<String, usize>,
}

impl LockContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open scopes on `key`, zero if none.
    pub fn depth(&self, key: &str) -> usize {
        self.depths.get(key).copied().unwrap_or(0)
    }

    /// Returns `true` if some scope on `key` is open in this context.
    pub fn is_held(&self, key: &str) -> bool {
        self.depths.contains_key(key)
    }

    /// Returns `true` if no scope is open in this context.
    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }

    /// Records one more open scope on `key` and returns the new depth.
    pub fn enter(&mut self, key: &str) -> usize {
        let depth = self.depths.entry(key.to_string()).or_insert(0);
        *depth += 1;
        *depth
    }

    /// Records one closed scope on `key` and returns the remaining depth.
    ///
    /// The entry is removed once the depth reaches zero.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::IllegalState`] if no scope on `key` is open.
    pub fn exit(&mut self, key: &str) -> LockResult<usize> {
        let Some(depth) = self.depths.get_mut(key) else {
            return Err(LockError::IllegalState(format!(
                "cannot leave lock scope on '{key}' without entering it"
            )));
        };

        if *depth <= 1 {
            self.depths.remove(key);
            return Ok(0);
        }
        *depth -= 1;
        Ok(*depth)
    }
}

/// Closes the context entry of a scope whose future was dropped mid-hold.
struct DepthGuard<'a> {
    context: &'a mut LockContext,
    key: String,
    armed: bool,
}

impl<'a> DepthGuard<'a> {
    fn enter(context: &'a mut LockContext, key: &str) -> Self {
        let depth = context.enter(key);
        debug!(lock.key = %key, depth, "entered lock scope");
        Self {
            context,
            key: key.to_string(),
            armed: true,
        }
    }

    fn context(&mut self) -> &mut LockContext {
        self.context
    }

    fn exit(mut self) -> LockResult<usize> {
        self.armed = false;
        let depth = self.context.exit(&self.key)?;
        debug!(lock.key = %self.key, depth, "left lock scope");
        Ok(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.context.exit(&self.key);
        }
    }
}

// ============================================================================
// Reentrant Mutex
// ============================================================================

/// A [`Mutex`] that the same call stack may enter again without blocking.
///
/// Whether an instance takes the real lock is decided once, when it is
/// created: if the context already holds the key, the instance neither
/// touches the store nor the context. The decision is not revisited if the
/// context changes later.
pub struct ReentrantMutex<S> {
    inner: Mutex<S>,
    owns_lock: bool,
}

impl<S: LeaseStore + 'static> ReentrantMutex<S> {
    /// Creates a reentrant lock that owns its store adapter.
    pub fn new(options: MutexOptions, store: S, context: &LockContext) -> Self {
        Self::with_shared_store(options, Arc::new(store), context)
    }

    /// Creates a reentrant lock on a shared store adapter.
    pub fn with_shared_store(options: MutexOptions, store: Arc<S>, context: &LockContext) -> Self {
        let nested = context.is_held(options.key());
        if nested {
            debug!(lock.key = %options.key(), "lock already held by this context; will not lock again");
        }

        Self {
            inner: Mutex::with_shared_store(options, store),
            owns_lock: !nested,
        }
    }

    pub fn key(&self) -> &str {
        self.inner.key()
    }

    /// `true` if this instance performs the real store lock on entry.
    pub fn owns_lock(&self) -> bool {
        self.owns_lock && self.inner.should_lock()
    }

    /// The wrapped non-reentrant lock.
    pub fn inner(&self) -> &Mutex<S> {
        &self.inner
    }

    /// Runs `body` inside a scope on this lock's key.
    ///
    /// The owning instance takes the store lock and records the key in the
    /// context on entry, then releases both on exit. Instances created while
    /// the key was already held run the body without any bookkeeping. Exit
    /// runs on normal completion and on panic (re-raised afterwards); if the
    /// future is dropped mid-hold, the context entry is closed and the store
    /// release is spawned on the current runtime.
    ///
    /// # Errors
    ///
    /// * errors from the wrapped [`Mutex::lock`] / [`Mutex::unlock`]
    /// * `LockError::IllegalState` - the context entry for the key vanished
    ///   while the body ran
    #[instrument(skip_all, fields(lock.key = %self.inner.key(), owns_lock = self.owns_lock))]
    pub async fn scope<T>(
        &mut self,
        context: &mut LockContext,
        body: impl AsyncFnOnce(&mut LockContext) -> T,
    ) -> LockResult<T> {
        if !self.inner.should_lock() {
            debug!("locking disabled; running body unlocked");
            return Ok(body(context).await);
        }
        if !self.owns_lock {
            debug!("nested scope; lock already held by this context");
            return Ok(body(context).await);
        }

        self.inner.lock().await?;
        let mut release = self.inner.release_on_drop();

        let mut depth = DepthGuard::enter(context, self.inner.key());
        let outcome = AssertUnwindSafe(body(depth.context())).catch_unwind().await;

        let released = self.inner.unlock().await;
        release.disarm();
        let exited = depth.exit();

        match outcome {
            Ok(value) => {
                released?;
                exited?;
                Ok(value)
            }
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLeaseStore;

    fn reentrant(
        key: &str,
        store: &Arc<MemoryLeaseStore>,
        context: &LockContext,
    ) -> ReentrantMutex<MemoryLeaseStore> {
        let options = MutexOptions::builder(key).ttl_secs(10).build().unwrap();
        ReentrantMutex::with_shared_store(options, store.clone(), context)
    }

    #[test]
    fn test_context_counts_and_removes() {
        let mut ctx = LockContext::new();
        assert_eq!(ctx.enter("k"), 1);
        assert_eq!(ctx.enter("k"), 2);
        assert_eq!(ctx.depth("k"), 2);

        assert_eq!(ctx.exit("k").unwrap(), 1);
        assert_eq!(ctx.exit("k").unwrap(), 0);
        assert!(!ctx.is_held("k"));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_context_exit_without_enter() {
        let mut ctx = LockContext::new();
        let err = ctx.exit("k").unwrap_err();
        assert!(matches!(err, LockError::IllegalState(_)));
    }

    #[tokio::test]
    async fn test_nested_scope_does_not_block() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut ctx = LockContext::new();
        let mut outer = reentrant("k", &store, &ctx);
        assert!(outer.owns_lock());

        let depth_inside = outer
            .scope(&mut ctx, async |ctx| {
                let mut inner = reentrant("k", &store, ctx);
                assert!(!inner.owns_lock());
                inner
                    .scope(ctx, async |ctx| {
                        assert!(store.contains("k"));
                        ctx.depth("k")
                    })
                    .await
                    .unwrap()
            })
            .await
            .unwrap();

        assert_eq!(depth_inside, 1);
        assert!(ctx.is_empty());
        assert!(!store.contains("k"));
    }

    #[tokio::test]
    async fn test_construction_time_check_is_not_revisited() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut ctx = LockContext::new();
        let mut outer = reentrant("k", &store, &ctx);

        let mut late = outer
            .scope(&mut ctx, async |ctx| reentrant("k", &store, ctx))
            .await
            .unwrap();
        assert!(!late.owns_lock());
        assert!(ctx.is_empty());

        // The outer scope is gone, yet this instance still skips the store.
        // It leaves the context untouched, so a lock created inside it
        // takes the store lock for real.
        late.scope(&mut ctx, async |ctx| {
            assert!(!store.contains("k"));
            assert!(!ctx.is_held("k"));

            let mut fresh = reentrant("k", &store, ctx);
            assert!(fresh.owns_lock());
            fresh
                .scope(ctx, async |_| assert!(store.contains("k")))
                .await
                .unwrap();
        })
        .await
        .unwrap();
        assert!(ctx.is_empty());
        assert!(!store.contains("k"));
    }

    #[tokio::test]
    async fn test_corrupted_context_is_illegal_state() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut ctx = LockContext::new();
        let mut lock = reentrant("k", &store, &ctx);

        let err = lock
            .scope(&mut ctx, async |ctx| {
                ctx.exit("k").unwrap();
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::IllegalState(_)));
        // The store lock is still released
        assert!(!store.contains("k"));
    }

    #[tokio::test]
    async fn test_disabled_reentrant_does_no_bookkeeping() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut ctx = LockContext::new();
        let options = MutexOptions::builder("k").should_lock(false).build().unwrap();
        let mut lock = ReentrantMutex::with_shared_store(options, store.clone(), &ctx);
        assert!(!lock.owns_lock());

        lock.scope(&mut ctx, async |ctx| assert!(!ctx.is_held("k")))
            .await
            .unwrap();
        assert!(!store.contains("k"));
    }
}
