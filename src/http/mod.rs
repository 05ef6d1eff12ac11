//! HTTP carrier types.
//!
//! The cache never serves connections itself. It reads a parsed [`Request`]
//! (method, `Cache-Control`, `If-None-Match`) and produces a [`Response`]
//! carrying one of the three statuses a cached endpoint can answer with.

use std::fmt;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::Request;
pub use response::Response;

/// Header names read or written by the cache layer.
pub mod names {
    pub const CACHE_CONTROL: &str = "Cache-Control";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const ETAG: &str = "ETag";
    pub const EXPIRES: &str = "Expires";
    pub const IF_NONE_MATCH: &str = "If-None-Match";
    pub const LAST_MODIFIED: &str = "Last-Modified";
}

/// Status of a cached endpoint's response.
///
/// ```
/// use rttp_cache::http::StatusCode;
///
/// assert_eq!(StatusCode::NotModified.as_u16(), 304);
/// assert_eq!(StatusCode::NotModified.to_string(), "304 Not Modified");
/// assert!(!StatusCode::NotModified.allows_body());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    /// Fresh or cached payload.
    Ok = 200,
    /// The client's validator matched the stored entry.
    NotModified = 304,
    /// Binding, decoding or rendering failed.
    InternalServerError = 500,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn reason_phrase(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotModified => "Not Modified",
            Self::InternalServerError => "Internal Server Error",
        }
    }

    /// `false` for `304`, which never carries content or a `Content-Length`.
    pub fn allows_body(self) -> bool {
        !matches!(self, Self::NotModified)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// Request method, as matched against the configured cacheable methods.
///
/// Only `GET` is cacheable by default; `HEAD` and the rest can be allowed
/// through [`CacheConfig::allow_method`](crate::CacheConfig::allow_method).
/// Methods outside the common set parse as `Other` and compare by name.
///
/// ```
/// use rttp_cache::http::Method;
///
/// let method: Method = "GET".parse().unwrap();
/// assert_eq!(method, Method::Get);
/// assert_eq!("PURGE".parse::<Method>().unwrap().as_str(), "PURGE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "OPTIONS" => Self::Options,
            other => Self::Other(other.to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_not_modified_drops_the_body() {
        assert!(StatusCode::Ok.allows_body());
        assert!(StatusCode::InternalServerError.allows_body());
        assert!(!StatusCode::NotModified.allows_body());
        assert_eq!(u16::from(StatusCode::InternalServerError), 500);
    }

    #[test]
    fn unknown_methods_keep_their_name() {
        let method: Method = "PURGE".parse().unwrap();
        assert_eq!(method, Method::Other("PURGE".into()));
        assert_ne!(method, Method::Get);
        assert_eq!("get".parse::<Method>().unwrap().as_str(), "get");
    }
}
