//! Redis-backed store.

use std::collections::HashSet;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ErrorKind, RedisError};
use tracing::debug;

use super::{CachedEntry, KeyValueStore, StoreError};

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        match err.kind() {
            ErrorKind::AuthenticationFailed => StoreError::Auth(err.to_string()),
            ErrorKind::IoError => StoreError::Connection(err.to_string()),
            _ if err.is_connection_refusal() || err.is_connection_dropped() => {
                StoreError::Connection(err.to_string())
            }
            _ => StoreError::Command(err.to_string()),
        }
    }
}

/// A [`KeyValueStore`] over one multiplexed Redis connection.
///
/// The connection is cloned per operation; clones share the underlying
/// socket, so concurrent calls are pipelined rather than serialized.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Opens a connection to `url` and verifies it with `PING`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Auth`] if the server rejects the credentials,
    /// [`StoreError::Connection`] if it cannot be reached or does not answer
    /// `PING`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(StoreError::Connection(format!(
                "unexpected PING reply '{pong}'"
            )));
        }
        debug!("redis connection verified");
        Ok(Self { conn })
    }
}

// Redis answers TTL with -2 for a missing key and -1 for a key without expiry.
fn ttl_reply(raw: i64) -> Option<u64> {
    u64::try_from(raw).ok()
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: redis::Value = conn.set_ex(key, value, ttl_seconds).await?;
        Ok(matches!(reply, redis::Value::Okay))
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: i64 = conn.ttl(key).await?;
        Ok(ttl_reply(raw))
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.sadd(set, member).await?;
        Ok(())
    }

    async fn smembers(&self, set: &str) -> Result<HashSet<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(set).await?)
    }

    async fn get_with_ttl(&self, key: &str) -> Result<Option<CachedEntry>, StoreError> {
        let mut conn = self.conn.clone();
        let (ttl, value): (i64, Option<String>) = redis::pipe()
            .ttl(key)
            .get(key)
            .query_async(&mut conn)
            .await?;
        Ok(value.map(|raw| CachedEntry {
            raw,
            ttl: ttl_reply(ttl).unwrap_or(0),
        }))
    }
}
