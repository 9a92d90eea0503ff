//! Construction-time configuration for lease locks.

use std::time::Duration;

use crate::error::{LockError, LockResult};

/// Default lease length in seconds.
pub const DEFAULT_TTL_SECS: u64 = 1;

/// Smallest lease the store can express (`SET ... EX` takes whole seconds).
pub const MIN_TTL_SECS: u64 = 1;

/// Largest lease accepted. Redis keeps expiries as signed 64-bit
/// milliseconds, so anything longer cannot be stored.
pub const MAX_TTL_SECS: u64 = i64::MAX as u64 / 1000;

/// Default pause between two acquisition attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// How `lock()` polls the store while the key is taken.
///
/// The default polls every 100ms and never gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed sleep between failed attempts.
    pub interval: Duration,
    /// Maximum total wait before `lock()` fails with [`LockError::Timeout`].
    pub max_wait: Option<Duration>,
}

impl RetryPolicy {
    /// Polls at `interval` forever.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_wait: None,
        }
    }

    /// Caps the total wait of a single `lock()` call.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    fn validate(&self) -> LockResult<()> {
        if self.interval.is_zero() {
            return Err(LockError::config("retry interval must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_INTERVAL)
    }
}

/// Validated settings shared by [`Mutex`](crate::Mutex) and
/// [`ReentrantMutex`](crate::ReentrantMutex).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutexOptions {
    key: String,
    ttl_secs: u64,
    should_lock: bool,
    retry: RetryPolicy,
}

impl MutexOptions {
    /// Starts configuring a lock on `key`.
    pub fn builder(key: impl Into<String>) -> MutexOptionsBuilder {
        MutexOptionsBuilder::new(key)
    }

    /// Options for `key` with every default applied.
    pub fn new(key: impl Into<String>) -> LockResult<Self> {
        Self::builder(key).build()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Lease length in whole seconds.
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn should_lock(&self) -> bool {
        self.should_lock
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

/// Builder for [`MutexOptions`]. Validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct MutexOptionsBuilder {
    key: String,
    ttl: Duration,
    should_lock: bool,
    retry: RetryPolicy,
}

impl MutexOptionsBuilder {
    /// Creates a new builder with default settings.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            should_lock: true,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the lease length. Must be a whole number of seconds.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the lease length in seconds.
    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.ttl = Duration::from_secs(secs);
        self
    }

    /// When `false`, the lock object never touches the store.
    pub fn should_lock(mut self, should_lock: bool) -> Self {
        self.should_lock = should_lock;
        self
    }

    /// Replaces the whole retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the pause between acquisition attempts.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry.interval = interval;
        self
    }

    /// Makes `lock()` fail with a timeout instead of blocking forever.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.retry.max_wait = Some(max_wait);
        self
    }

    /// Validates and builds the options.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Config`] if the key is empty, the TTL is not a
    /// whole number of seconds or lies outside [`MIN_TTL_SECS`] ..=
    /// [`MAX_TTL_SECS`], or the retry interval is zero.
    pub fn build(self) -> LockResult<MutexOptions> {
        if self.key.is_empty() {
            return Err(LockError::config("lock key must not be empty"));
        }
        if self.ttl.subsec_nanos() != 0 {
            return Err(LockError::config(format!(
                "ttl must be a whole number of seconds, got {:?}",
                self.ttl
            )));
        }
        let ttl_secs = self.ttl.as_secs();
        if ttl_secs < MIN_TTL_SECS {
            return Err(LockError::config(format!(
                "ttl must be at least {MIN_TTL_SECS}s, got {ttl_secs}s"
            )));
        }
        if ttl_secs > MAX_TTL_SECS {
            return Err(LockError::config(format!(
                "ttl must be at most {MAX_TTL_SECS}s, got {ttl_secs}s"
            )));
        }
        self.retry.validate()?;

        Ok(MutexOptions {
            key: self.key,
            ttl_secs,
            should_lock: self.should_lock,
            retry: self.retry,
        })
    }
}
