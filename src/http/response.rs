//! The response a cached endpoint renders: status, the cache headers stamped
//! on it, and the JSON body. The host writes it out with
//! [`Response::into_bytes`] or reads the parts directly.

use bytes::{BufMut, BytesMut};

use super::{Headers, StatusCode};

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    ///
    /// The `Content-Length` header is written automatically by [`into_bytes`](Self::into_bytes).
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Replaces the whole header map. Used when a response is rendered from
    /// headers that were assembled before the body was known.
    #[must_use]
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers set so far. `Content-Length` is only added during
    /// [`into_bytes`](Self::into_bytes).
    pub fn header_map(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body bytes.
    pub fn content(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// A non-empty body without a `Content-Type` is sent as
    /// `text/plain; charset=utf-8`. `Content-Length` closes the header block,
    /// except on `304`, where neither a length nor a body is written.
    pub fn into_bytes(mut self) -> BytesMut {
        let with_body = self.status.allows_body();
        if with_body && !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let content_length = if with_body { self.body.len() } else { 0 };
        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + content_length);

        buf.put(format!("HTTP/1.1 {}\r\n", self.status).as_bytes());
        buf.put(self.headers.to_string().as_bytes());
        if with_body {
            buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        }
        buf.put(&b"\r\n"[..]);

        if with_body {
            buf.put(self.body.as_slice());
        }
        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
