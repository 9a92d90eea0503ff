//! Convenience prelude for lease lock types.

pub use crate::error::{LockError, LockResult};
pub use crate::memory::{MemoryLeaseStore, MemoryLockProvider};
pub use crate::mutex::Mutex;
pub use crate::options::{MutexOptions, MutexOptionsBuilder, RetryPolicy};
pub use crate::reentrant::{LockContext, ReentrantMutex};
pub use crate::token::HolderToken;
pub use crate::traits::{LeaseStore, LockProvider};
