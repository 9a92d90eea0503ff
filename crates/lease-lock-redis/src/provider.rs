//! Redis lock provider implementation.

use std::sync::Arc;
use std::time::Duration;

use lease_lock_core::error::LockResult;
use lease_lock_core::options::{DEFAULT_TTL_SECS, RetryPolicy};
use lease_lock_core::traits::LockProvider;

use crate::store::{DEFAULT_REDIS_URL, RedisLeaseStore};
use fred::prelude::*;

/// Builder for Redis lock provider configuration.
pub struct RedisLockProviderBuilder {
    url: Option<String>,
    client: Option<RedisClient>,
    ttl: Duration,
    retry: RetryPolicy,
}

impl RedisLockProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            url: None,
            client: None,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the Redis server URL.
    ///
    /// Defaults to [`DEFAULT_REDIS_URL`] when neither a URL nor a client is given.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Uses an existing Redis client instead of connecting.
    pub fn client(mut self, client: RedisClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Sets the lease length of created locks (whole seconds).
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the lease length of created locks in seconds.
    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.ttl = Duration::from_secs(secs);
        self
    }

    /// Sets how created locks poll while the key is taken.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builds the provider, connecting if no client was supplied.
    ///
    /// The TTL and retry policy are validated when locks are created.
    pub async fn build(self) -> LockResult<RedisLockProvider> {
        let store = match self.client {
            Some(client) => RedisLeaseStore::new(client),
            None => {
                let url = self.url.as_deref().unwrap_or(DEFAULT_REDIS_URL);
                RedisLeaseStore::connect(url).await?
            }
        };

        Ok(RedisLockProvider {
            store: Arc::new(store),
            ttl: self.ttl,
            retry: self.retry,
        })
    }
}

impl Default for RedisLockProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider for Redis-based lease locks.
#[derive(Clone)]
pub struct RedisLockProvider {
    store: Arc<RedisLeaseStore>,
    ttl: Duration,
    retry: RetryPolicy,
}

impl RedisLockProvider {
    /// Returns a new builder for configuring the provider.
    pub fn builder() -> RedisLockProviderBuilder {
        RedisLockProviderBuilder::new()
    }

    /// Creates a provider using the specified Redis URL.
    pub async fn new(url: impl Into<String>) -> LockResult<Self> {
        Self::builder().url(url).build().await
    }

    /// Creates a provider on the standard local server.
    pub async fn local() -> LockResult<Self> {
        Self::builder().build().await
    }
}

impl LockProvider for RedisLockProvider {
    type Store = RedisLeaseStore;

    fn store(&self) -> Arc<Self::Store> {
        self.store.clone()
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}
