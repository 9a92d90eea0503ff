//! Lease locks for Rust: named mutexes held as keys with a TTL in a shared
//! key-value store.
//!
//! Acquiring a lock atomically creates the key with a fresh holder token and
//! a time-to-live; releasing deletes the key only if it still holds that
//! token. If a holder crashes, the store expires its lease after the TTL.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use lease_lock::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connects to redis://127.0.0.1:6379 unless a URL is given
//!     let provider = RedisLockProvider::builder().ttl_secs(30).build().await?;
//!
//!     // Create a lock by key
//!     let mut lock = provider.create_mutex("job:42")?;
//!
//!     // Critical section - released on every exit path
//!     lock.scope(async {
//!         println!("Doing critical work...");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Reentrancy
//!
//! [`ReentrantMutex`] lets one logical call stack enter the same key again
//! without deadlocking on itself. Nesting depth lives in a [`LockContext`]
//! passed down through the scopes.
//!
//! ```rust,no_run
//! use lease_lock::*;
//!
//! # async fn demo(provider: RedisLockProvider) -> LockResult<()> {
//! let mut ctx = LockContext::new();
//! let mut outer = provider.create_reentrant_mutex("job:42", &ctx)?;
//! outer
//!     .scope(&mut ctx, async |ctx| {
//!         let mut inner = provider.create_reentrant_mutex("job:42", ctx)?;
//!         inner.scope(ctx, async |_| println!("still exclusive")).await
//!     })
//!     .await??;
//! # Ok(())
//! # }
//! ```
//!
//! # Crate Organization
//!
//! This is a meta-crate that re-exports types from:
//! - `lease-lock-core`: traits, `Mutex`, `ReentrantMutex`, in-memory store
//! - `lease-lock-redis`: Redis backend
//!
//! For fine-grained control, you can depend on individual crates instead.

// Re-export core types and traits
pub use lease_lock_core::*;

// Re-export redis backend
pub use lease_lock_redis::*;
