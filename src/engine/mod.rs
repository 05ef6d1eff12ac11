//! The cache engine: one shared handle over the store, the codec and the key
//! generator.
//!
//! Built once with [`CacheEngine::init`] and shared as `Arc<CacheEngine>`.
//! If the store cannot be reached at init the engine comes up disabled and
//! every wrapped endpoint runs uncached for the life of the process.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::codec::{Codec, CodecError, Payload};
use crate::config::CacheConfig;
use crate::http::Method;
use crate::key::{Args, BindingError, CacheKey, KeyGenerator, Signature};
use crate::metadata::ResponseMetadata;
use crate::store::{CachedEntry, KeyValueStore, StoreError, StoreTarget};

/// Errors surfaced by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cannot derive cache key: {0}")]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("store refused to save key '{key}'")]
    NotStored { key: String },

    #[error("caching is disabled")]
    Disabled,
}

/// Lifecycle events, logged in the `event` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    ConnectBegin,
    ConnectSuccess,
    ConnectFail,
    KeyFoundInCache,
    KeyAddedToCache,
    FailedToCacheKey,
    TagIndexFailed,
}

impl CacheEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheEvent::ConnectBegin => "connect_begin",
            CacheEvent::ConnectSuccess => "connect_success",
            CacheEvent::ConnectFail => "connect_fail",
            CacheEvent::KeyFoundInCache => "key_found_in_cache",
            CacheEvent::KeyAddedToCache => "key_added_to_cache",
            CacheEvent::FailedToCacheKey => "failed_to_cache_key",
            CacheEvent::TagIndexFailed => "tag_index_failed",
        }
    }
}

impl fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared cache handle.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use rttp_cache::config::CacheConfig;
/// use rttp_cache::engine::CacheEngine;
/// use rttp_cache::store::MemoryStore;
///
/// let engine = CacheEngine::with_store(CacheConfig::default(), Arc::new(MemoryStore::new()));
/// assert!(engine.is_enabled());
/// assert!(!CacheEngine::disabled(CacheConfig::default()).is_enabled());
/// ```
pub struct CacheEngine {
    config: CacheConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    keys: KeyGenerator,
    metadata: ResponseMetadata,
}

impl fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEngine")
            .field("enabled", &self.is_enabled())
            .field("prefix", &self.keys.prefix())
            .field("codec", self.config.codec())
            .finish()
    }
}

impl CacheEngine {
    /// Connects to the configured store.
    ///
    /// Never fails: an unparseable target, a refused connection or rejected
    /// credentials are logged and yield a disabled engine.
    pub async fn init(config: CacheConfig) -> Self {
        info!(event = %CacheEvent::ConnectBegin, "connecting to cache store");

        let connected = match StoreTarget::parse(config.connection_target()) {
            Ok(target) => target.connect().await,
            Err(e) => Err(e),
        };

        match connected {
            Ok(store) => {
                info!(event = %CacheEvent::ConnectSuccess, "cache store connected");
                Self::with_store(config, store)
            }
            Err(e @ StoreError::Auth(_)) => {
                error!(event = %CacheEvent::ConnectFail, error = %e, "cache store rejected credentials, caching disabled");
                Self::disabled(config)
            }
            Err(e) => {
                warn!(event = %CacheEvent::ConnectFail, error = %e, "cache store unavailable, caching disabled");
                Self::disabled(config)
            }
        }
    }

    /// An enabled engine over an already open store.
    pub fn with_store(config: CacheConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self::build(config, Some(store))
    }

    /// An engine that bypasses every call.
    pub fn disabled(config: CacheConfig) -> Self {
        Self::build(config, None)
    }

    fn build(config: CacheConfig, store: Option<Arc<dyn KeyValueStore>>) -> Self {
        let keys = KeyGenerator::new(config.prefix(), config.ignored_types().iter().copied());
        let metadata = ResponseMetadata::new(config.status_header());
        Self {
            config,
            store,
            keys,
            metadata,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn codec(&self) -> &Codec {
        self.config.codec()
    }

    pub fn metadata(&self) -> &ResponseMetadata {
        &self.metadata
    }

    pub fn keys(&self) -> &KeyGenerator {
        &self.keys
    }

    /// Whether a request with this method and `Cache-Control` value may be
    /// served from or written to the cache.
    ///
    /// ```
    /// use rttp_cache::config::CacheConfig;
    /// use rttp_cache::engine::CacheEngine;
    /// use rttp_cache::http::Method;
    ///
    /// let engine = CacheEngine::disabled(CacheConfig::default());
    /// assert!(engine.is_cacheable(&Method::Get, None));
    /// assert!(!engine.is_cacheable(&Method::Post, None));
    /// assert!(!engine.is_cacheable(&Method::Get, Some("no-cache")));
    /// ```
    pub fn is_cacheable(&self, method: &Method, cache_control: Option<&str>) -> bool {
        if !self.config.allowed_methods().contains(method) {
            return false;
        }
        let Some(cache_control) = cache_control else {
            return true;
        };
        let directives = cache_control.to_ascii_lowercase();
        !(directives.contains("no-store") || directives.contains("no-cache"))
    }

    /// # Errors
    ///
    /// [`BindingError`] if `args` does not fit `signature`.
    pub fn compute_key(
        &self,
        signature: &Signature,
        args: &Args,
        tag: Option<&str>,
    ) -> Result<CacheKey, BindingError> {
        self.keys.derive(signature, args, tag)
    }

    /// Reads the entry and its remaining TTL in one round trip. A disabled
    /// engine always misses.
    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedEntry>, StoreError> {
        match &self.store {
            Some(store) => store.get_with_ttl(key.as_str()).await,
            None => Ok(None),
        }
    }

    /// Encodes `payload` and saves it under `key` for `ttl` seconds, then
    /// records the key under `tag`. Returns the canonical text that was
    /// stored.
    ///
    /// Nothing is written if encoding fails. A failed tag-index append is
    /// logged but does not fail the call.
    ///
    /// # Errors
    ///
    /// [`CacheError::Codec`] if the payload cannot be encoded,
    /// [`CacheError::Store`] or [`CacheError::NotStored`] if the write did
    /// not land, [`CacheError::Disabled`] on a disabled engine.
    pub async fn store(
        &self,
        key: &CacheKey,
        payload: &Payload,
        ttl: u64,
        tag: Option<&str>,
    ) -> Result<String, CacheError> {
        let store = self.store.as_ref().ok_or(CacheError::Disabled)?;

        let result = self.write(store.as_ref(), key, payload, ttl).await;
        let canonical = match result {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(event = %CacheEvent::FailedToCacheKey, key = %key, error = %e, "failed to cache key");
                return Err(e);
            }
        };
        info!(event = %CacheEvent::KeyAddedToCache, key = %key, ttl, "key added to cache");

        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            if let Err(e) = store.sadd(tag, key.as_str()).await {
                warn!(event = %CacheEvent::TagIndexFailed, key = %key, tag, error = %e, "failed to index key under tag");
            }
        }
        Ok(canonical)
    }

    async fn write(
        &self,
        store: &dyn KeyValueStore,
        key: &CacheKey,
        payload: &Payload,
        ttl: u64,
    ) -> Result<String, CacheError> {
        let canonical = self.codec().encode(payload)?;
        if store.set(key.as_str(), &canonical, ttl).await? {
            Ok(canonical)
        } else {
            Err(CacheError::NotStored {
                key: key.to_string(),
            })
        }
    }

    /// Every key ever stored under `tag`, including ones that have since
    /// expired.
    pub async fn tagged_keys(&self, tag: &str) -> Result<HashSet<String>, StoreError> {
        match &self.store {
            Some(store) => store.smembers(tag).await,
            None => Ok(HashSet::new()),
        }
    }

    /// Live entries stored under `tag`, sorted by key. Expired keys are
    /// skipped.
    pub async fn tagged_entries(&self, tag: &str) -> Result<Vec<(String, CachedEntry)>, StoreError> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        let mut keys: Vec<String> = store.smembers(tag).await?.into_iter().collect();
        keys.sort();

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            match store.get_with_ttl(&key).await? {
                Some(entry) => entries.push((key, entry)),
                None => debug!(key = %key, tag, "tagged key has expired"),
            }
        }
        Ok(entries)
    }
}
