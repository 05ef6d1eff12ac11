//! Key-value store seam.
//!
//! The engine needs only per-key atomic get/set/TTL, atomic set insertion,
//! and one batched read that returns a value together with its remaining TTL.
//! Two backends are provided:
//!
//! - [`RedisStore`]: Redis over a multiplexed tokio connection.
//! - [`MemoryStore`]: in-process maps with lazy expiry, for tests and
//!   single-process deployments.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Errors surfaced by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported connection target '{0}'")]
    Target(String),

    #[error("authentication with the store failed: {0}")]
    Auth(String),

    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store command failed: {0}")]
    Command(String),
}

/// A stored value read together with its remaining lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub raw: String,
    /// Seconds until the store evicts the entry.
    pub ttl: u64,
}

/// Operations the cache engine issues against its backing store.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` for `ttl_seconds`. Returns `false` if the store refused
    /// the write.
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, StoreError>;

    /// Remaining lifetime of `key`, or `None` if it does not exist or never
    /// expires.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError>;

    async fn smembers(&self, set: &str) -> Result<HashSet<String>, StoreError>;

    /// Reads the value and its TTL in one round trip so the two cannot
    /// disagree about whether the key exists.
    async fn get_with_ttl(&self, key: &str) -> Result<Option<CachedEntry>, StoreError>;
}

/// Where the engine's store lives, parsed from a connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// `memory://`
    Memory,
    /// `redis://`, `rediss://`, `redis+unix://`, `unix://`
    Redis(String),
}

impl StoreTarget {
    /// # Errors
    ///
    /// [`StoreError::Target`] for any other scheme, including an empty string.
    pub fn parse(target: &str) -> Result<Self, StoreError> {
        let target = target.trim();
        let scheme = target.split_once("://").map(|(scheme, _)| scheme);
        match scheme {
            Some("memory") => Ok(StoreTarget::Memory),
            Some("redis" | "rediss" | "redis+unix" | "unix") => {
                Ok(StoreTarget::Redis(target.to_owned()))
            }
            _ => Err(StoreError::Target(target.to_owned())),
        }
    }

    /// Opens the store this target names. Redis targets are pinged before
    /// being returned.
    pub async fn connect(&self) -> Result<Arc<dyn KeyValueStore>, StoreError> {
        match self {
            StoreTarget::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreTarget::Redis(url) => Ok(Arc::new(RedisStore::connect(url).await?)),
        }
    }
}
