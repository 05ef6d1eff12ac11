//! Cached endpoints.
//!
//! [`Cache`] wraps an async endpoint so that each call goes through the
//! engine:
//!
//! 1. Bypass when the engine is disabled or the request is not cacheable.
//! 2. Derive the key from the call's arguments and look it up.
//! 3. On a hit, decode the stored text and answer `304 Not Modified` if the
//!    client's `If-None-Match` matches, else `200` with the stored body.
//! 4. On a miss, run the endpoint, store its payload and answer with `Miss`
//!    headers. If the payload could not be stored it is returned without
//!    any cache headers.
//!
//! The endpoint itself only ever sees a [`Call`] and returns a [`Payload`].
//!
//! Misses are not coalesced. Two concurrent calls that miss on the same key
//! both run the endpoint and both store; the last write wins.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::codec::{Codec, CodecError, Payload};
use crate::conditional::ConditionalContext;
use crate::context::Context;
use crate::engine::{CacheEngine, CacheError, CacheEvent};
use crate::expiry::{
    Expire, ONE_DAY_IN_SECONDS, ONE_HOUR_IN_SECONDS, ONE_MINUTE_IN_SECONDS, ONE_MONTH_IN_SECONDS,
    ONE_WEEK_IN_SECONDS, ONE_YEAR_IN_SECONDS,
};
use crate::http::{Headers, Request, Response, StatusCode, names};
use crate::key::{ArgType, Args, CacheKey, Signature, always_ignored};
use crate::metadata::{CacheStatus, etag_for};
use crate::store::CachedEntry;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Type-erased request handler produced by [`CachedEndpoint::into_handler`].
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture<Response> + Send + Sync + 'static>;

/// An async function from a [`Call`] to the [`Payload`] it serves.
///
/// Implemented for every `Fn(Call) -> impl Future<Output = Payload> + Send`
/// that is `Send + Sync + 'static`.
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, call: Call) -> BoxFuture<Payload>;
}

impl<T, F> Endpoint for T
where
    T: Fn(Call) -> F + Send + Sync + 'static,
    F: Future<Output = Payload> + Send + 'static,
{
    fn call(&self, call: Call) -> BoxFuture<Payload> {
        Box::pin((self)(call))
    }
}

/// One invocation of a cached endpoint: the request context plus the
/// argument values that identify it.
#[derive(Debug)]
pub struct Call {
    ctx: Context,
    args: Args,
}

impl Call {
    pub fn new(ctx: Context, args: Args) -> Self {
        Self { ctx, args }
    }

    /// Binds each declared parameter by name from the path parameters, then
    /// the query string. Carrier-typed parameters and names with no value
    /// are left for defaults.
    pub fn from_context(ctx: Context, signature: &Signature) -> Self {
        let carriers = always_ignored();
        Self::from_context_skipping(ctx, signature, |ty| carriers.contains(&ty))
    }

    /// Like [`Call::from_context`], but also leaves out every parameter whose
    /// type `skip` accepts. The host injects those; they are never read from
    /// the request.
    pub fn from_context_skipping(
        ctx: Context,
        signature: &Signature,
        skip: impl Fn(ArgType) -> bool,
    ) -> Self {
        let mut args = Args::new();
        for param in signature.params() {
            if param.ty().is_some_and(&skip) {
                continue;
            }
            if let Some(value) = ctx.lookup(param.name()) {
                args.push_kwarg(param.name(), value);
            }
        }
        Self { ctx, args }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn request(&self) -> &Request {
        self.ctx.request()
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    /// A path or query parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.ctx.lookup(name)
    }

    pub fn into_parts(self) -> (Context, Args) {
        (self.ctx, self.args)
    }
}

/// How a [`Reply`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Caching did not apply; the endpoint ran.
    Bypass,
    /// The endpoint ran and its payload was stored.
    Miss,
    /// The endpoint ran but its payload could not be stored.
    Uncached,
    /// Served from the cache.
    Hit,
    /// Served from the cache as `304 Not Modified`.
    NotModified,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    /// A payload that has not been encoded.
    Computed(Payload),
    /// A payload together with the canonical text it was stored as.
    Rendered { raw: String, payload: Payload },
    Empty,
}

/// The result of a cached call, before it is rendered to a [`Response`].
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    headers: Headers,
    body: ReplyBody,
    outcome: CacheOutcome,
}

impl Reply {
    fn computed(payload: Payload, outcome: CacheOutcome) -> Self {
        Self {
            status: StatusCode::Ok,
            headers: Headers::new(),
            body: ReplyBody::Computed(payload),
            outcome,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &ReplyBody {
        &self.body
    }

    pub fn outcome(&self) -> CacheOutcome {
        self.outcome
    }

    /// The payload carried by the reply; `None` for `304`.
    pub fn payload(&self) -> Option<&Payload> {
        match &self.body {
            ReplyBody::Computed(payload) | ReplyBody::Rendered { payload, .. } => Some(payload),
            ReplyBody::Empty => None,
        }
    }

    /// Renders the reply as JSON. Stored text is sent as-is; computed
    /// payloads are encoded with `codec`.
    ///
    /// # Errors
    ///
    /// [`CodecError`] if a computed payload cannot be encoded.
    pub fn into_response(self, codec: &Codec) -> Result<Response, CodecError> {
        let body = match self.body {
            ReplyBody::Computed(payload) => Some(codec.encode(&payload)?),
            ReplyBody::Rendered { raw, .. } => Some(raw),
            ReplyBody::Empty => None,
        };
        let response = Response::new(self.status).headers(self.headers);
        Ok(match body {
            Some(body) => response
                .header(names::CONTENT_TYPE, "application/json")
                .body(body),
            None => response,
        })
    }
}

/// Caching policy for one endpoint: how long entries live and which tag
/// they are indexed under.
///
/// # Examples
///
/// ```
/// use rttp_cache::endpoint::Cache;
///
/// assert_eq!(Cache::one_hour().ttl(), 3600);
/// assert_eq!(Cache::new(10u64 * 365 * 24 * 3600).ttl(), 31_536_000);
/// assert_eq!(Cache::one_day().tag("users").tag_name(), Some("users"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Cache {
    expire: Expire,
    tag: Option<String>,
}

impl Cache {
    pub fn new(expire: impl Into<Expire>) -> Self {
        Self {
            expire: expire.into(),
            tag: None,
        }
    }

    pub fn one_minute() -> Self {
        Self::new(ONE_MINUTE_IN_SECONDS)
    }

    pub fn one_hour() -> Self {
        Self::new(ONE_HOUR_IN_SECONDS)
    }

    pub fn one_day() -> Self {
        Self::new(ONE_DAY_IN_SECONDS)
    }

    pub fn one_week() -> Self {
        Self::new(ONE_WEEK_IN_SECONDS)
    }

    pub fn one_month() -> Self {
        Self::new(ONE_MONTH_IN_SECONDS)
    }

    pub fn one_year() -> Self {
        Self::new(ONE_YEAR_IN_SECONDS)
    }

    /// Indexes every entry under `tag`. An empty tag means no tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        self.tag = (!tag.is_empty()).then_some(tag);
        self
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The clamped TTL in seconds.
    pub fn ttl(&self) -> u64 {
        self.expire.resolve()
    }

    pub fn wrap(
        self,
        engine: Arc<CacheEngine>,
        signature: Signature,
        endpoint: impl Endpoint,
    ) -> CachedEndpoint {
        CachedEndpoint {
            ttl: self.ttl(),
            tag: self.tag,
            engine,
            signature: Arc::new(signature),
            endpoint: Arc::new(endpoint),
        }
    }

    /// [`wrap`](Self::wrap) for an endpoint that computes its payload
    /// without awaiting.
    pub fn wrap_sync<T>(self, engine: Arc<CacheEngine>, signature: Signature, f: T) -> CachedEndpoint
    where
        T: Fn(Call) -> Payload + Send + Sync + 'static,
    {
        self.wrap(engine, signature, move |call| std::future::ready(f(call)))
    }
}

/// An endpoint wrapped with a [`Cache`] policy.
#[derive(Clone)]
pub struct CachedEndpoint {
    engine: Arc<CacheEngine>,
    signature: Arc<Signature>,
    endpoint: Arc<dyn Endpoint>,
    ttl: u64,
    tag: Option<String>,
}

impl std::fmt::Debug for CachedEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedEndpoint")
            .field("endpoint", &self.signature.qualified_name())
            .field("ttl", &self.ttl)
            .field("tag", &self.tag)
            .finish()
    }
}

impl CachedEndpoint {
    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The key `call` would be cached under.
    pub fn key_for(&self, call: &Call) -> Result<CacheKey, CacheError> {
        Ok(self
            .engine
            .compute_key(&self.signature, call.args(), self.tag.as_deref())?)
    }

    /// Runs one call through the cache.
    ///
    /// Concurrent misses for one key each run the endpoint and each store
    /// their payload. The entry left behind is whichever write landed last.
    ///
    /// # Errors
    ///
    /// [`CacheError::Binding`] if the call's arguments do not fit the
    /// signature (the endpoint does not run), [`CacheError::Codec`] if a
    /// stored entry cannot be decoded.
    pub async fn call(&self, call: Call) -> Result<Reply, CacheError> {
        let request = call.request();
        let bypass = !self.engine.is_enabled()
            || !self.engine.is_cacheable(
                request.method(),
                request.headers().joined(names::CACHE_CONTROL).as_deref(),
            );
        if bypass {
            let payload = self.endpoint.call(call).await;
            return Ok(Reply::computed(payload, CacheOutcome::Bypass));
        }

        let key = self.key_for(&call)?;
        let conditional = ConditionalContext::from_headers(call.request().headers());

        match self.engine.lookup(&key).await {
            Ok(Some(entry)) => return self.hit(&key, entry, conditional),
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "cache lookup failed, treating as miss"),
        }

        let payload = self.endpoint.call(call).await;
        match self
            .engine
            .store(&key, &payload, self.ttl, self.tag.as_deref())
            .await
        {
            Ok(raw) => {
                let mut headers = Headers::new();
                self.engine
                    .metadata()
                    .stamp(&mut headers, CacheStatus::Miss, self.ttl, &raw, &payload);
                Ok(Reply {
                    status: StatusCode::Ok,
                    headers,
                    body: ReplyBody::Rendered { raw, payload },
                    outcome: CacheOutcome::Miss,
                })
            }
            Err(_) => Ok(Reply::computed(payload, CacheOutcome::Uncached)),
        }
    }

    fn hit(
        &self,
        key: &CacheKey,
        entry: CachedEntry,
        conditional: Option<ConditionalContext>,
    ) -> Result<Reply, CacheError> {
        let payload = self.engine.codec().decode(&entry.raw)?;
        info!(event = %CacheEvent::KeyFoundInCache, key = %key, ttl = entry.ttl, "key found in cache");

        let mut headers = Headers::new();
        self.engine
            .metadata()
            .stamp(&mut headers, CacheStatus::Hit, entry.ttl, &entry.raw, &payload);

        if conditional.is_some_and(|c| c.not_modified(&etag_for(&entry.raw))) {
            return Ok(Reply {
                status: StatusCode::NotModified,
                headers,
                body: ReplyBody::Empty,
                outcome: CacheOutcome::NotModified,
            });
        }
        Ok(Reply {
            status: StatusCode::Ok,
            headers,
            body: ReplyBody::Rendered {
                raw: entry.raw,
                payload,
            },
            outcome: CacheOutcome::Hit,
        })
    }

    /// Runs a call built from `ctx` and renders it. Failures become a bare
    /// `500 Internal Server Error`.
    pub async fn respond(&self, ctx: Context) -> Response {
        let keys = self.engine.keys();
        let call = Call::from_context_skipping(ctx, &self.signature, |ty| keys.is_ignored(ty));
        let rendered = match self.call(call).await {
            Ok(reply) => reply.into_response(self.engine.codec()).map_err(CacheError::from),
            Err(e) => Err(e),
        };
        rendered.unwrap_or_else(|e| {
            error!(endpoint = self.signature.qualified_name(), error = %e, "cached endpoint failed");
            Response::new(StatusCode::InternalServerError)
        })
    }

    /// Erases the endpoint into a shareable [`Handler`].
    pub fn into_handler(self) -> Handler {
        let endpoint = Arc::new(self);
        Arc::new(move |ctx: Context| -> BoxFuture<Response> {
            let endpoint = Arc::clone(&endpoint);
            Box::pin(async move { endpoint.respond(ctx).await })
        })
    }
}
