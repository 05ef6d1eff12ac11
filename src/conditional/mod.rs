//! `If-None-Match` evaluation for cache hits.

use crate::http::{Headers, names};

/// The wildcard validator: matches any existing entry.
pub const WILDCARD: &str = "*";

/// Validators a client sent with a conditional request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalContext {
    validators: Vec<String>,
    wildcard: bool,
}

impl ConditionalContext {
    /// Parses an `If-None-Match` value. `None` when the header is absent,
    /// which means the request is not conditional.
    ///
    /// # Examples
    ///
    /// ```
    /// use rttp_cache::conditional::ConditionalContext;
    ///
    /// let ctx = ConditionalContext::parse(Some(r#"W/"a", W/"b""#)).unwrap();
    /// assert!(ctx.not_modified(r#"W/"b""#));
    /// assert!(!ctx.not_modified(r#"W/"c""#));
    /// assert!(ConditionalContext::parse(None).is_none());
    /// ```
    pub fn parse(header: Option<&str>) -> Option<Self> {
        let validators: Vec<String> = header?
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
            .collect();
        let wildcard = validators.len() == 1 && validators[0] == WILDCARD;
        Some(Self {
            validators,
            wildcard,
        })
    }

    /// Reads `If-None-Match` from `headers`, combining repeated field lines.
    pub fn from_headers(headers: &Headers) -> Option<Self> {
        Self::parse(headers.joined(names::IF_NONE_MATCH).as_deref())
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn validators(&self) -> &[String] {
        &self.validators
    }

    /// Whether an entry whose current validator is `etag` should be answered
    /// with `304 Not Modified`.
    pub fn not_modified(&self, etag: &str) -> bool {
        self.wildcard || self.validators.iter().any(|v| v == etag)
    }
}

/// Evaluates a possibly absent `If-None-Match` value against `etag`.
pub fn is_not_modified(header: Option<&str>, etag: &str) -> bool {
    ConditionalContext::parse(header).is_some_and(|ctx| ctx.not_modified(etag))
}
