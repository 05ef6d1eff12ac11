//! In-process store with lazy expiry.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use super::{CachedEntry, KeyValueStore, StoreError};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.checked_duration_since(now).filter(|d| !d.is_zero())
    }
}

/// A [`KeyValueStore`] backed by two maps behind tokio `RwLock`s.
///
/// Expired values are invisible to reads and are purged on the next write.
/// Tag sets never expire, matching Redis sets without a TTL.
///
/// Uses tokio's clock so paused-time tests can advance past expiries.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    sets: RwLock<HashMap<String, HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.remaining(now).is_some())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// Rounds to the nearest second, as Redis does for TTL replies.
fn whole_seconds(remaining: Duration) -> u64 {
    let secs = (remaining.as_millis() + 500) / 1000;
    u64::try_from(secs).unwrap_or(u64::MAX)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.remaining(now).is_some())
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, StoreError> {
        // Redis rejects a zero expiry; mirror that instead of storing a dead entry.
        if ttl_seconds == 0 {
            return Ok(false);
        }
        let now = Instant::now();
        let Some(expires_at) = now.checked_add(Duration::from_secs(ttl_seconds)) else {
            return Ok(false);
        };
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.remaining(now).is_some());
        entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .and_then(|e| e.remaining(now))
            .map(whole_seconds))
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError> {
        self.sets
            .write()
            .await
            .entry(set.to_owned())
            .or_default()
            .insert(member.to_owned());
        Ok(())
    }

    async fn smembers(&self, set: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self.sets.read().await.get(set).cloned().unwrap_or_default())
    }

    async fn get_with_ttl(&self, key: &str) -> Result<Option<CachedEntry>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries.get(key).and_then(|e| {
            e.remaining(now).map(|remaining| CachedEntry {
                raw: e.value.clone(),
                ttl: whole_seconds(remaining),
            })
        }))
    }
}
