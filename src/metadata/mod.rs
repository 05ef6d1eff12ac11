//! Response metadata: the headers a cached endpoint stamps on its replies.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::codec::Payload;
use crate::http::{Headers, names};

/// Header used to report hits and misses when none is configured.
pub const DEFAULT_STATUS_HEADER: &str = "X-Rttp-Cache";

/// Payload field copied into `Last-Modified`.
pub const LAST_MODIFIED_FIELD: &str = "last_modified";

/// IMF-fixdate, the preferred HTTP date format.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Whether a reply came from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "Hit",
            CacheStatus::Miss => "Miss",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weak validator for a canonical payload text.
///
/// SHA-256 keeps the value identical across processes and restarts, so a
/// client can revalidate against any instance.
///
/// # Examples
///
/// ```
/// use rttp_cache::metadata::etag_for;
///
/// let etag = etag_for(r#"{"success":true}"#);
/// assert!(etag.starts_with("W/\""));
/// assert_eq!(etag, etag_for(r#"{"success":true}"#));
/// ```
pub fn etag_for(canonical: &str) -> String {
    format!("W/\"{}\"", hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// Formats a timestamp as an HTTP date.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Stamps cache headers onto outgoing responses.
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    status_header: String,
}

impl Default for ResponseMetadata {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_HEADER)
    }
}

impl ResponseMetadata {
    pub fn new(status_header: impl Into<String>) -> Self {
        Self {
            status_header: status_header.into(),
        }
    }

    pub fn status_header(&self) -> &str {
        &self.status_header
    }

    /// Sets the status, `Expires`, `Cache-Control`, `ETag` and, when the
    /// payload carries one, `Last-Modified` headers.
    pub fn stamp(
        &self,
        headers: &mut Headers,
        status: CacheStatus,
        ttl: u64,
        canonical: &str,
        payload: &Payload,
    ) {
        self.stamp_at(headers, status, ttl, canonical, payload, Utc::now());
    }

    /// [`stamp`](Self::stamp) with an explicit clock.
    pub fn stamp_at(
        &self,
        headers: &mut Headers,
        status: CacheStatus,
        ttl: u64,
        canonical: &str,
        payload: &Payload,
        now: DateTime<Utc>,
    ) {
        headers.set(self.status_header.as_str(), status.as_str());
        let expires_at = i64::try_from(ttl)
            .ok()
            .and_then(|secs| now.checked_add_signed(Duration::seconds(secs)))
            .unwrap_or(now);
        headers.set(names::EXPIRES, http_date(expires_at));
        headers.set(names::CACHE_CONTROL, format!("max-age={ttl}"));
        headers.set(names::ETAG, etag_for(canonical));
        if let Some(last_modified) = last_modified(payload) {
            headers.set(names::LAST_MODIFIED, last_modified);
        }
    }
}

fn last_modified(payload: &Payload) -> Option<String> {
    match payload.get(LAST_MODIFIED_FIELD)? {
        Payload::String(s) => Some(s.clone()),
        Payload::DateTime(dt) => Some(http_date(dt.with_timezone(&Utc))),
        _ => None,
    }
}
