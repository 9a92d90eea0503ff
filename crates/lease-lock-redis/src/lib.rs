//! Redis backend for lease locks.

pub mod provider;
pub mod store;

pub use provider::{RedisLockProvider, RedisLockProviderBuilder};
pub use store::{DEFAULT_REDIS_URL, RedisLeaseStore};
