//! Workspace harness for the lease lock crates: integration tests, benchmarks
//! and demos. Library users depend on `lease-lock` directly.

pub use lease_lock::*;
