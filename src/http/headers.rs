//! Header map shared by requests and cached responses.
//!
//! Names compare case-insensitively. A name may repeat; list headers such as
//! `If-None-Match` and `Cache-Control` are read through [`Headers::joined`] so
//! that split field lines behave like one comma-separated value.

use std::fmt;

/// Ordered, case-insensitive, multi-value header map.
///
/// ```
/// use rttp_cache::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("If-None-Match", r#"W/"a""#);
/// headers.insert("if-none-match", r#"W/"b""#);
/// headers.set("X-Rttp-Cache", "Miss");
/// headers.set("x-rttp-cache", "Hit");
///
/// assert_eq!(headers.joined("IF-NONE-MATCH").as_deref(), Some(r#"W/"a", W/"b""#));
/// assert_eq!(headers.get_all("x-rttp-cache").collect::<Vec<_>>(), ["Hit"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Appends a field line, keeping any existing values for `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces every value for `name` with `value`. Cache status and
    /// validator headers are always single-valued.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    pub fn get_all<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a str> + use<'a, 'b> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name` joined with `", "`, or `None` if the header is
    /// absent.
    pub fn joined(&self, name: &str) -> Option<String> {
        let mut values = self.get_all(name);
        let first = values.next()?;
        Some(values.fold(first.to_owned(), |mut acc, v| {
            acc.push_str(", ");
            acc.push_str(v);
            acc
        }))
    }

    /// Returns `true` if anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.entries.len() < before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of field lines, not distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Wire form: one `Name: value\r\n` line per entry, in insertion order.
impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}
