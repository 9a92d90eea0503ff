//! Core types for lease locks: named locks held as keys with a TTL in a
//! shared key-value store.

pub mod error;
pub mod memory;
pub mod mutex;
pub mod options;
pub mod prelude;
pub mod reentrant;
pub mod token;
pub mod traits;

pub use error::{LockError, LockResult};
pub use prelude::*;
