//! Serves one cached endpoint three times and prints what the cache did.
//!
//! ```text
//! RTTP_CACHE_URL=memory:// cargo run --example cached_endpoint
//! RTTP_CACHE_URL=redis://127.0.0.1:6379 cargo run --example cached_endpoint
//! ```
//!
//! With no reachable store the engine starts disabled and every call runs
//! uncached.

use std::sync::Arc;

use chrono::Utc;
use rttp_cache::key::Param;
use rttp_cache::{Cache, CacheConfig, CacheEngine, Call, Context, Payload, Request, Signature};
use tracing_subscriber::EnvFilter;

fn request(extra: &str) -> Context {
    let raw = format!("GET /books?isbn=9780131103627 HTTP/1.1\r\nHost: localhost\r\n{extra}\r\n");
    let (request, _) = Request::parse(raw.as_bytes()).expect("demo request is well formed");
    Context::new(request)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = CacheConfig::from_env().with_prefix("demo");
    let engine = Arc::new(CacheEngine::init(config).await);

    let signature = Signature::new("library::books", "get_book")
        .param(Param::new("ctx").typed::<Context>())
        .param(Param::new("isbn"));

    let books = Cache::one_hour().tag("books").wrap(
        engine.clone(),
        signature,
        |call: Call| async move {
            let isbn = call.param("isbn").unwrap_or_default().to_owned();
            Payload::object([
                ("isbn", Payload::from(isbn)),
                ("title", Payload::from("The C Programming Language")),
                ("last_modified", Payload::from(Utc::now())),
            ])
        },
    );

    let first = books
        .call(Call::from_context(request(""), books.signature()))
        .await
        .expect("first call");
    println!("first:  {:?} {:?}", first.status(), first.outcome());

    let etag = first.headers().get("ETag").map(str::to_owned);
    let second = books
        .call(Call::from_context(request(""), books.signature()))
        .await
        .expect("second call");
    println!("second: {:?} {:?}", second.status(), second.outcome());

    let revalidate = etag
        .map(|etag| format!("If-None-Match: {etag}\r\n"))
        .unwrap_or_default();
    let third = books
        .call(Call::from_context(request(&revalidate), books.signature()))
        .await
        .expect("third call");
    println!("third:  {:?} {:?}", third.status(), third.outcome());

    match engine.tagged_keys("books").await {
        Ok(keys) => println!("keys tagged 'books': {keys:?}"),
        Err(e) => println!("tag index unavailable: {e}"),
    }
}
