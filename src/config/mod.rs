//! Cache configuration.
//!
//! A [`CacheConfig`] is built once and handed to
//! [`CacheEngine::init`](crate::engine::CacheEngine::init). Nothing here
//! touches the network; connection problems surface at init time.

use crate::codec::{Codec, TypeHandler};
use crate::http::Method;
use crate::key::ArgType;
use crate::metadata::DEFAULT_STATUS_HEADER;

/// Environment variable holding the store connection target.
pub const ENV_URL: &str = "RTTP_CACHE_URL";
/// Environment variable holding the key prefix.
pub const ENV_PREFIX: &str = "RTTP_CACHE_PREFIX";
/// Environment variable holding the status header name.
pub const ENV_HEADER: &str = "RTTP_CACHE_HEADER";

/// Used when no connection target is configured.
pub const DEFAULT_URL: &str = "redis://127.0.0.1:6379";

/// Configuration for a [`CacheEngine`](crate::engine::CacheEngine).
///
/// # Examples
///
/// ```
/// use rttp_cache::config::CacheConfig;
/// use rttp_cache::http::Method;
///
/// let config = CacheConfig::new("memory://")
///     .with_prefix("myapi-cache")
///     .with_status_header("X-MyAPI-Cache")
///     .ignore_type::<u64>()
///     .allow_method(Method::Head);
///
/// assert_eq!(config.connection_target(), "memory://");
/// assert_eq!(config.prefix(), "myapi-cache");
/// assert!(config.allowed_methods().contains(&Method::Head));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    connection_target: String,
    prefix: String,
    status_header: String,
    ignored_types: Vec<ArgType>,
    allowed_methods: Vec<Method>,
    codec: Codec,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

impl CacheConfig {
    pub fn new(connection_target: impl Into<String>) -> Self {
        Self {
            connection_target: connection_target.into(),
            prefix: String::new(),
            status_header: DEFAULT_STATUS_HEADER.to_owned(),
            ignored_types: Vec::new(),
            allowed_methods: vec![Method::Get],
            codec: Codec::default(),
        }
    }

    /// Reads `RTTP_CACHE_URL`, `RTTP_CACHE_PREFIX` and `RTTP_CACHE_HEADER`,
    /// falling back to the defaults for anything unset or empty.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut config = Self::new(var(ENV_URL).unwrap_or_else(|| DEFAULT_URL.to_owned()));
        if let Some(prefix) = var(ENV_PREFIX) {
            config.prefix = prefix;
        }
        if let Some(header) = var(ENV_HEADER) {
            config.status_header = header;
        }
        config
    }

    /// Namespace prepended to every key as `<prefix>:`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Name of the header reporting `Hit` or `Miss`.
    #[must_use]
    pub fn with_status_header(mut self, name: impl Into<String>) -> Self {
        self.status_header = name.into();
        self
    }

    /// Excludes parameters declared with type `T` from keys.
    #[must_use]
    pub fn ignore_type<T: ?Sized + 'static>(mut self) -> Self {
        self.ignored_types.push(ArgType::of::<T>());
        self
    }

    /// Adds a method to the cacheable set. `GET` is always present.
    #[must_use]
    pub fn allow_method(mut self, method: Method) -> Self {
        if !self.allowed_methods.contains(&method) {
            self.allowed_methods.push(method);
        }
        self
    }

    /// Replaces the codec, e.g. one with custom handlers already registered.
    #[must_use]
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Registers a custom handler ahead of the built-ins.
    #[must_use]
    pub fn register_type_handler(mut self, handler: impl TypeHandler + 'static) -> Self {
        self.codec.register_first(handler);
        self
    }

    pub fn connection_target(&self) -> &str {
        &self.connection_target
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn status_header(&self) -> &str {
        &self.status_header
    }

    pub fn ignored_types(&self) -> &[ArgType] {
        &self.ignored_types
    }

    pub fn allowed_methods(&self) -> &[Method] {
        &self.allowed_methods
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }
}
