//! Redis store adapter.

use lease_lock_core::error::{LockError, LockResult};
use lease_lock_core::traits::LeaseStore;
use fred::prelude::*;
use fred::types::CustomCommand;
use tracing::instrument;

/// Address used when no connection is configured.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Lua script deleting the key only while it holds the caller's token.
///
/// A mismatch is also logged on the server so that stray releases show up
/// in the Redis log.
const RELEASE_SCRIPT_LUA: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('del', KEYS[1])
    end
    redis.log(redis.LOG_WARNING, 'Try release other mutex key ' .. KEYS[1])
    return 0
"#;

/// [`LeaseStore`] backed by a single Redis server.
///
/// Acquisition is `SET key token EX ttl NX`; release is an `EVAL` of a
/// compare-and-delete script, so both primitives are atomic on the server.
#[derive(Clone)]
pub struct RedisLeaseStore {
    client: RedisClient,
}

impl RedisLeaseStore {
    /// Wraps an already connected client.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    /// Connects to the Redis server at `url`.
    pub async fn connect(url: &str) -> LockResult<Self> {
        let config = RedisConfig::from_url(url).map_err(|e| {
            LockError::Connection(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid Redis URL: {}", e),
            )))
        })?;

        let client = RedisClient::new(config, None, None, None);
        client.connect();
        client.wait_for_connect().await.map_err(|e| {
            LockError::Connection(Box::new(std::io::Error::other(format!(
                "failed to connect to Redis: {}",
                e
            ))))
        })?;

        Ok(Self::new(client))
    }

    /// Connects to the standard local server at [`DEFAULT_REDIS_URL`].
    pub async fn local() -> LockResult<Self> {
        Self::connect(DEFAULT_REDIS_URL).await
    }

    /// The underlying client.
    pub fn client(&self) -> &RedisClient {
        &self.client
    }
}

impl LeaseStore for RedisLeaseStore {
    #[instrument(skip(self, value), fields(backend = "redis"))]
    async fn try_set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> LockResult<bool> {
        let ttl_secs = i64::try_from(ttl_secs)
            .map_err(|_| LockError::Config(format!("ttl of {ttl_secs}s is out of range")))?;

        // SET NX returns Some(value) if key was set, None if key already exists
        let result: Option<String> = self
            .client
            .set(
                key,
                value,
                Some(Expiration::EX(ttl_secs)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| {
                LockError::Backend(Box::new(std::io::Error::other(format!(
                    "Redis SET NX failed: {}",
                    e
                ))))
            })?;

        Ok(result.is_some())
    }

    #[instrument(skip(self, expected), fields(backend = "redis"))]
    async fn compare_and_delete(&self, key: &str, expected: &str) -> LockResult<bool> {
        let args: Vec<RedisValue> = vec![
            RELEASE_SCRIPT_LUA.into(),
            1_i64.into(), // numkeys
            key.into(),
            expected.into(),
        ];

        let cmd = CustomCommand::new_static("EVAL", None, false);

        let deleted: i64 = self.client.custom(cmd, args).await.map_err(|e| {
            LockError::Backend(Box::new(std::io::Error::other(format!(
                "Redis EVAL (release) failed: {}",
                e
            ))))
        })?;

        Ok(deleted == 1)
    }
}
