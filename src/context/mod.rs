//! Per-call context: the request carrier plus the path parameters a host
//! router extracted for it.
//!
//! The cache layer never routes; it only reads what the host already matched.
//! [`Call::from_context`](crate::endpoint::Call::from_context) binds declared
//! handler parameters from these path parameters first, then from the query
//! string.

use std::collections::HashMap;

use crate::Request;

/// Path parameters extracted from the matched route
#[derive(Default, Debug, Clone)]
pub struct Parameters {
    map: HashMap<String, String>,
}

impl Parameters {
    /// Create a new empty parameters map
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a value into the parameters map
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Get a value from the parameters map
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|value| value.as_str())
    }

    /// Remove a value from the parameters map
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.map.remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Parameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Per-call context handed to cached endpoints.
#[derive(Debug)]
pub struct Context {
    request: Request,
    params: Parameters,
}

impl Context {
    /// Create a new context from a request with no path parameters
    pub fn new(request: Request) -> Self {
        Self {
            request,
            params: Parameters::new(),
        }
    }

    /// Create a context carrying the path parameters a router matched
    pub fn with_params(request: Request, params: Parameters) -> Self {
        Self { request, params }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Looks up `name` among the path parameters, falling back to the query
    /// string.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .or_else(|| self.request.query_param(name))
    }
}
