//! Error types for lease lock operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while configuring, acquiring or releasing a lease lock.
#[derive(Error, Debug)]
pub enum LockError {
    /// Invalid construction-time configuration (empty key, bad TTL, ...).
    #[error("invalid lock configuration: {0}")]
    Config(String),

    /// Nesting bookkeeping was driven out of order (exit without entry).
    #[error("illegal lock state: {0}")]
    IllegalState(String),

    /// Lock acquisition gave up after the configured maximum wait.
    #[error("lock acquisition timed out after {0:?}")]
    Timeout(Duration),

    /// Store connection failed.
    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Store-specific error.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LockError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns `true` for errors raised while validating configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns `true` if acquisition gave up waiting.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;
