use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use rttp_cache::endpoint::ReplyBody;
use rttp_cache::key::Param;
use rttp_cache::store::CachedEntry;
use rttp_cache::{
    Cache, CacheConfig, CacheEngine, CacheError, CacheOutcome, Call, Codec, CodecError, Context,
    KeyValueStore, MemoryStore, Payload, Request, Signature, StatusCode, StoreError,
};

/// Wraps a [`MemoryStore`] and counts every operation issued against it.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingStore {
    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: u64) -> Result<bool, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.ttl(key).await
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.sadd(set, member).await
    }

    async fn smembers(&self, set: &str) -> Result<HashSet<String>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.smembers(set).await
    }

    async fn get_with_ttl(&self, key: &str) -> Result<Option<CachedEntry>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_with_ttl(key).await
    }
}

/// A store whose connection is gone.
struct DownStore;

#[async_trait]
impl KeyValueStore for DownStore {
    async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Connection("connection reset".into()))
    }
    async fn set(&self, _: &str, _: &str, _: u64) -> Result<bool, StoreError> {
        Err(StoreError::Connection("connection reset".into()))
    }
    async fn ttl(&self, _: &str) -> Result<Option<u64>, StoreError> {
        Err(StoreError::Connection("connection reset".into()))
    }
    async fn sadd(&self, _: &str, _: &str) -> Result<(), StoreError> {
        Err(StoreError::Connection("connection reset".into()))
    }
    async fn smembers(&self, _: &str) -> Result<HashSet<String>, StoreError> {
        Err(StoreError::Connection("connection reset".into()))
    }
    async fn get_with_ttl(&self, _: &str) -> Result<Option<CachedEntry>, StoreError> {
        Err(StoreError::Connection("connection reset".into()))
    }
}

fn context(path: &str, extra_headers: &[(&str, &str)]) -> Context {
    let mut raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n");
    for (name, value) in extra_headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str("\r\n");
    let (request, _) = Request::parse(raw.as_bytes()).expect("valid request");
    Context::new(request)
}

fn item_signature() -> Signature {
    Signature::new("shop::items", "get_item")
        .param(Param::new("request").typed::<Request>())
        .param(Param::new("id"))
}

fn item(call: Call) -> Payload {
    let id = call.param("id").unwrap_or("0").to_owned();
    Payload::object([
        ("id", Payload::from(id)),
        ("last_modified", Payload::from("Mon, 19 Apr 2021 10:00:00 GMT")),
    ])
}

async fn send(endpoint: &rttp_cache::CachedEndpoint, ctx: Context) -> rttp_cache::Reply {
    let call = Call::from_context(ctx, endpoint.signature());
    endpoint.call(call).await.expect("call succeeds")
}

#[tokio::test]
async fn miss_hit_then_not_modified() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let engine = Arc::new(CacheEngine::init(CacheConfig::new("memory://")).await);
    let endpoint = Cache::one_hour().wrap_sync(engine.clone(), item_signature(), item);

    let miss = send(&endpoint, context("/items?id=42", &[])).await;
    assert_eq!(miss.status(), StatusCode::Ok);
    assert_eq!(miss.outcome(), CacheOutcome::Miss);
    assert_eq!(miss.headers().get("X-Rttp-Cache"), Some("Miss"));
    assert_eq!(miss.headers().get("Cache-Control"), Some("max-age=3600"));
    assert_eq!(miss.headers().get("Last-Modified"), Some("Mon, 19 Apr 2021 10:00:00 GMT"));
    assert!(miss.headers().contains("Expires"));
    let v1 = miss.headers().get("ETag").expect("validator").to_owned();

    let hit = send(&endpoint, context("/items?id=42", &[])).await;
    assert_eq!(hit.status(), StatusCode::Ok);
    assert_eq!(hit.outcome(), CacheOutcome::Hit);
    assert_eq!(hit.headers().get("X-Rttp-Cache"), Some("Hit"));
    assert_eq!(hit.headers().get("ETag"), Some(v1.as_str()));

    let response = hit.into_response(engine.codec()).expect("renders");
    assert_eq!(response.header_map().get("content-type"), Some("application/json"));
    assert_eq!(
        response.content(),
        br#"{"id":"42","last_modified":"Mon, 19 Apr 2021 10:00:00 GMT"}"#
    );

    let not_modified = send(&endpoint, context("/items?id=42", &[("If-None-Match", v1.as_str())])).await;
    assert_eq!(not_modified.status(), StatusCode::NotModified);
    assert_eq!(not_modified.headers().get("X-Rttp-Cache"), Some("Hit"));
    assert_eq!(not_modified.body(), &ReplyBody::Empty);

    let wildcard = send(&endpoint, context("/items?id=42", &[("If-None-Match", "*")])).await;
    assert_eq!(wildcard.status(), StatusCode::NotModified);

    let stale = send(
        &endpoint,
        context("/items?id=42", &[("If-None-Match", r#"W/"-5480454928453453778""#)]),
    )
    .await;
    assert_eq!(stale.status(), StatusCode::Ok);
    assert_eq!(stale.outcome(), CacheOutcome::Hit);
}

#[tokio::test]
async fn bypass_sets_no_headers_and_never_touches_the_store() {
    let store = Arc::new(CountingStore::default());
    let engine = Arc::new(CacheEngine::with_store(
        CacheConfig::new("memory://"),
        store.clone(),
    ));
    let endpoint = Cache::default().wrap_sync(engine, item_signature(), item);

    for directive in ["no-store", "no-cache", "max-age=0, no-cache"] {
        let reply = send(&endpoint, context("/items?id=1", &[("Cache-Control", directive)])).await;
        assert_eq!(reply.outcome(), CacheOutcome::Bypass);
        assert!(reply.headers().is_empty(), "{directive} stamped headers");
    }
    assert_eq!(store.reads(), 0);
    assert_eq!(store.writes(), 0);

    send(&endpoint, context("/items?id=1", &[])).await;
    assert_eq!(store.reads(), 1);
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn non_get_requests_bypass() {
    let engine = Arc::new(CacheEngine::with_store(
        CacheConfig::new("memory://"),
        Arc::new(MemoryStore::new()),
    ));
    let endpoint = Cache::default().wrap_sync(engine, item_signature(), item);

    let (request, _) = Request::parse(b"POST /items?id=1 HTTP/1.1\r\nContent-Length: 0\r\n\r\n")
        .expect("valid request");
    let reply = send(&endpoint, Context::new(request)).await;
    assert_eq!(reply.outcome(), CacheOutcome::Bypass);
}

#[tokio::test]
async fn disabled_engine_runs_everything_uncached() {
    let engine = Arc::new(CacheEngine::init(CacheConfig::new("ftp://nowhere")).await);
    assert!(!engine.is_enabled());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let endpoint = Cache::default().wrap_sync(engine, item_signature(), move |call| {
        counter.fetch_add(1, Ordering::SeqCst);
        item(call)
    });

    for _ in 0..3 {
        let reply = send(&endpoint, context("/items?id=1", &[])).await;
        assert_eq!(reply.outcome(), CacheOutcome::Bypass);
        assert!(reply.headers().is_empty());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn store_outage_fails_open() {
    let engine = Arc::new(CacheEngine::with_store(
        CacheConfig::new("memory://"),
        Arc::new(DownStore),
    ));
    let endpoint = Cache::default().wrap_sync(engine.clone(), item_signature(), item);

    let reply = send(&endpoint, context("/items?id=9", &[])).await;
    assert_eq!(reply.outcome(), CacheOutcome::Uncached);
    assert!(reply.headers().is_empty());
    assert_eq!(reply.payload().and_then(|p| p.get("id")), Some(&Payload::from("9")));

    let response = reply.into_response(engine.codec()).expect("renders");
    assert_eq!(response.status(), StatusCode::Ok);
}

#[tokio::test]
async fn ttl_is_clamped_to_one_year() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(CacheEngine::with_store(CacheConfig::new("memory://"), store.clone()));
    let ten_years = Duration::from_secs(10 * 365 * 24 * 3600);
    let endpoint = Cache::new(ten_years).wrap_sync(engine, item_signature(), item);

    let reply = send(&endpoint, context("/items?id=1", &[])).await;
    assert_eq!(reply.headers().get("Cache-Control"), Some("max-age=31536000"));

    let key = endpoint
        .key_for(&Call::from_context(context("/items?id=1", &[]), endpoint.signature()))
        .expect("key");
    assert_eq!(store.ttl(key.as_str()).await.expect("ttl"), Some(31_536_000));
}

#[tokio::test(start_paused = true)]
async fn tag_index_tolerates_expired_members() {
    let engine = Arc::new(CacheEngine::with_store(
        CacheConfig::new("memory://").with_prefix("shop"),
        Arc::new(MemoryStore::new()),
    ));
    let short = Cache::one_minute().tag("items").wrap_sync(engine.clone(), item_signature(), item);
    let long = Cache::one_day().tag("items").wrap_sync(engine.clone(), item_signature(), item);
    let untagged = Cache::one_day().wrap_sync(engine.clone(), item_signature(), item);

    send(&short, context("/items?id=1", &[])).await;
    send(&long, context("/items?id=2", &[])).await;
    send(&untagged, context("/items?id=3", &[])).await;

    let keys = engine.tagged_keys("items").await.expect("members");
    assert_eq!(
        keys,
        HashSet::from([
            "shop:shop::items::get_item(id=1)::items".to_owned(),
            "shop:shop::items::get_item(id=2)::items".to_owned(),
        ])
    );

    tokio::time::advance(Duration::from_secs(120)).await;

    let live = engine.tagged_entries("items").await.expect("enumerates");
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].0, "shop:shop::items::get_item(id=2)::items");
    assert!(live[0].1.ttl <= 86_400 - 120);
}

#[tokio::test]
async fn keys_differ_by_argument_and_tag() {
    let engine = Arc::new(CacheEngine::disabled(CacheConfig::default()));
    let plain = Cache::default().wrap_sync(engine.clone(), item_signature(), item);
    let tagged = Cache::default().tag("x").wrap_sync(engine, item_signature(), item);

    let key = |endpoint: &rttp_cache::CachedEndpoint, path: &str| {
        endpoint
            .key_for(&Call::from_context(context(path, &[]), endpoint.signature()))
            .expect("key")
    };

    let a = key(&plain, "/items?id=1");
    assert_eq!(a, key(&plain, "/items?id=1"));
    assert_ne!(a, key(&plain, "/items?id=2"));
    assert_ne!(a, key(&tagged, "/items?id=1"));
    assert_eq!(key(&tagged, "/items?id=1").tag(), Some("x"));
    assert_eq!(a.tag(), None);
}

#[tokio::test]
async fn binding_errors_propagate() {
    let engine = Arc::new(CacheEngine::with_store(
        CacheConfig::new("memory://"),
        Arc::new(MemoryStore::new()),
    ));
    let endpoint = Cache::default().wrap_sync(engine, item_signature(), item);

    // `id` is required and absent from the query.
    let call = Call::from_context(context("/items", &[]), endpoint.signature());
    let err = endpoint.call(call).await.expect_err("missing id");
    assert!(matches!(err, CacheError::Binding(_)));

    let response = endpoint.respond(context("/items", &[])).await;
    assert_eq!(response.status(), StatusCode::InternalServerError);
}

#[tokio::test]
async fn unreadable_entry_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(CacheEngine::with_store(CacheConfig::new("memory://"), store.clone()));
    let endpoint = Cache::default().wrap_sync(engine, item_signature(), item);

    let ctx = context("/items?id=5", &[]);
    let key = endpoint
        .key_for(&Call::from_context(ctx, endpoint.signature()))
        .expect("key");
    store
        .set(key.as_str(), r#"{"_spec_type":"ipv4","val":"10.0.0.1"}"#, 60)
        .await
        .expect("seeded");

    let call = Call::from_context(context("/items?id=5", &[]), endpoint.signature());
    let err = endpoint.call(call).await.expect_err("undecodable");
    assert!(matches!(
        err,
        CacheError::Codec(CodecError::UnsupportedType { ref tag, .. }) if tag == "ipv4"
    ));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Invoice {
    number: u32,
    total: Decimal,
    issued: NaiveDate,
    paid_at: DateTime<FixedOffset>,
}

#[tokio::test]
async fn models_survive_the_cache() {
    let engine = Arc::new(CacheEngine::with_store(
        CacheConfig::new("memory://"),
        Arc::new(MemoryStore::new()),
    ));
    let invoice = Invoice {
        number: 7,
        total: Decimal::new(199_999, 2),
        issued: NaiveDate::from_ymd_opt(2021, 4, 19).expect("date"),
        paid_at: DateTime::parse_from_rfc3339("2021-04-20T09:30:00+02:00").expect("timestamp"),
    };
    let expected = invoice.clone();
    let signature = Signature::new("billing", "get_invoice");
    let endpoint = Cache::one_week().wrap(engine, signature, move |_call: Call| {
        let invoice = invoice.clone();
        async move { Payload::model(&invoice).unwrap_or(Payload::Null) }
    });

    send(&endpoint, context("/invoice", &[])).await;
    let hit = send(&endpoint, context("/invoice", &[])).await;
    assert_eq!(hit.outcome(), CacheOutcome::Hit);

    let decoded: Invoice = hit
        .payload()
        .cloned()
        .expect("payload")
        .into_model()
        .expect("rebuilds");
    assert_eq!(decoded, expected);
}

#[tokio::test]
async fn handler_serves_rendered_json() {
    let engine = Arc::new(CacheEngine::init(CacheConfig::new("memory://")).await);
    let handler = Cache::one_minute()
        .wrap_sync(engine, item_signature(), item)
        .into_handler();

    let first = handler(context("/items?id=3", &[])).await;
    let second = handler(context("/items?id=3", &[])).await;
    assert_eq!(first.status(), StatusCode::Ok);
    assert_eq!(first.header_map().get("X-Rttp-Cache"), Some("Miss"));
    assert_eq!(second.header_map().get("X-Rttp-Cache"), Some("Hit"));
    assert_eq!(first.content(), second.content());

    let body = std::str::from_utf8(second.content()).expect("utf8");
    let decoded = Codec::default().decode(body).expect("json");
    assert_eq!(decoded.get("id"), Some(&Payload::from("3")));
}
