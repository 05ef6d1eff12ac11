//! # rttp-cache
//!
//! Response caching for async HTTP endpoints, backed by Redis.
//!
//! Wrap an endpoint with a [`Cache`] policy and every `GET` it serves is
//! keyed by its arguments, stored with a TTL, and answered from the store on
//! later calls, with `ETag`/`If-None-Match` revalidation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rttp_cache::{Cache, CacheConfig, CacheEngine, Call, Context, Payload, Request, Signature};
//! use rttp_cache::key::Param;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CacheConfig::new("redis://127.0.0.1:6379").with_prefix("myapi-cache");
//!     let engine = Arc::new(CacheEngine::init(config).await);
//!
//!     let signature = Signature::new("items", "get_item").param(Param::new("id"));
//!     let handler = Cache::one_hour()
//!         .tag("items")
//!         .wrap(engine, signature, |call: Call| async move {
//!             Payload::object([("id", Payload::from(call.param("id").unwrap_or_default()))])
//!         })
//!         .into_handler();
//!
//!     let (request, _) = Request::parse(b"GET /items?id=1 HTTP/1.1\r\n\r\n").unwrap();
//!     let response = handler(Context::new(request)).await;
//!     println!("{:?}", response.header_map().get("X-Rttp-Cache"));
//! }
//! ```

// ── Carrier types ─────────────────────────────────────────────────────────────
pub mod context;
pub mod http;

// ── Caching ───────────────────────────────────────────────────────────────────
pub mod codec;
pub mod conditional;
pub mod config;
pub mod endpoint;
pub mod engine;
pub mod expiry;
pub mod key;
pub mod metadata;
pub mod store;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use codec::{Codec, CodecError, Payload, TypeHandler};
pub use config::CacheConfig;
pub use context::Context;
pub use endpoint::{Cache, CacheOutcome, CachedEndpoint, Call, Reply};
pub use engine::{CacheEngine, CacheError};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use key::{Args, CacheKey, Signature};
pub use store::{KeyValueStore, MemoryStore, RedisStore, StoreError};
