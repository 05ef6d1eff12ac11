//! Cache key derivation.
//!
//! A key identifies "this callable with these argument values":
//!
//! ```text
//! <prefix>:<module>::<function>(<name>=<value>,<name>=<value>,...)[::<tag>]
//! ```
//!
//! Supplied arguments are bound onto the declared [`Signature`] the way a
//! function call would bind them: positional values fill parameters in order,
//! keyword values fill them by name, and declared defaults fill whatever is
//! left. Parameters whose declared type is ignored (the request/response
//! carriers always are) are dropped before the key is joined.
//!
//! Values are compared by their `Display` form. Two distinct values that
//! print identically produce the same key; choosing argument types with
//! unambiguous string forms is up to the caller. The same goes for values
//! containing `)::`: [`tag_from_key`] cannot tell them apart from a tag
//! separator.

use std::any::type_name;
use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::context::Context;
use crate::http::{Request, Response};

/// Errors raised while binding arguments onto a [`Signature`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("{callable}() takes {expected} positional arguments but {got} were given")]
    TooManyPositional {
        callable: String,
        expected: usize,
        got: usize,
    },

    #[error("{callable}() got an unexpected keyword argument '{name}'")]
    UnexpectedKeyword { callable: String, name: String },

    #[error("{callable}() got multiple values for argument '{name}'")]
    MultipleValues { callable: String, name: String },

    #[error("{callable}() missing required argument '{name}'")]
    Missing { callable: String, name: String },
}

/// Identity of a declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgType(&'static str);

impl ArgType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(type_name::<T>())
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

/// Carrier types that never contribute to a key.
pub fn always_ignored() -> [ArgType; 3] {
    [
        ArgType::of::<Request>(),
        ArgType::of::<Response>(),
        ArgType::of::<Context>(),
    ]
}

/// One declared parameter of a cached callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    name: String,
    ty: Option<ArgType>,
    default: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            default: None,
        }
    }

    /// Declares the parameter's type.
    #[must_use]
    pub fn typed<T: ?Sized + 'static>(mut self) -> Self {
        self.ty = Some(ArgType::of::<T>());
        self
    }

    /// Declares a default used when the caller supplies nothing.
    #[must_use]
    pub fn default_value(mut self, value: impl fmt::Display) -> Self {
        self.default = Some(value.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> Option<ArgType> {
        self.ty
    }
}

/// The declared shape of a cached callable.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::Request;
/// use rttp_cache::key::{Param, Signature};
///
/// let sig = Signature::new(module_path!(), "list_users")
///     .param(Param::new("request").typed::<Request>())
///     .param(Param::new("page").typed::<u32>().default_value(1));
/// assert!(sig.qualified_name().ends_with("::list_users"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    qualified_name: String,
    params: Vec<Param>,
}

impl Signature {
    /// `module` is usually `module_path!()`.
    pub fn new(module: &str, function: &str) -> Self {
        Self {
            qualified_name: format!("{module}::{function}"),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

/// Argument values as supplied by a caller, in their `Display` form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    positional: Vec<String>,
    keyword: Vec<(String, String)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.positional.push(value.to_string());
        self
    }

    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.keyword.push((name.into(), value.to_string()));
        self
    }

    pub fn push_kwarg(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        self.keyword.push((name.into(), value.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

/// A derived cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The tag embedded at the end of the key, if any.
    pub fn tag(&self) -> Option<&str> {
        tag_from_key(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns the tag of a raw key string: everything after the last `)::`.
///
/// An untagged key whose argument values contain `)::` reports a tag anyway:
/// `m::f(id=a)::b)` yields `Some("b)")`.
pub fn tag_from_key(key: &str) -> Option<&str> {
    key.rsplit_once(")::").map(|(_, tag)| tag)
}

/// Derives keys for one configured namespace.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
    ignored: HashSet<ArgType>,
}

impl KeyGenerator {
    /// `ignored` is extended with [`always_ignored`].
    pub fn new(prefix: impl Into<String>, ignored: impl IntoIterator<Item = ArgType>) -> Self {
        let mut ignored: HashSet<ArgType> = ignored.into_iter().collect();
        ignored.extend(always_ignored());
        Self {
            prefix: prefix.into(),
            ignored,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_ignored(&self, ty: ArgType) -> bool {
        self.ignored.contains(&ty)
    }

    /// Binds `args` onto `signature` and joins the surviving arguments into a
    /// key.
    ///
    /// # Errors
    ///
    /// Any [`BindingError`]: the caller supplied arguments the signature
    /// cannot accept, or left a required parameter unfilled.
    pub fn derive(
        &self,
        signature: &Signature,
        args: &Args,
        tag: Option<&str>,
    ) -> Result<CacheKey, BindingError> {
        let bound = bind(signature, args, &self.ignored)?;

        let args_str = signature
            .params()
            .iter()
            .zip(&bound)
            .filter(|(param, _)| !param.ty.is_some_and(|ty| self.is_ignored(ty)))
            .filter_map(|(param, value)| value.as_ref().map(|v| format!("{}={v}", param.name)))
            .collect::<Vec<_>>()
            .join(",");

        let mut key = String::new();
        if !self.prefix.is_empty() {
            key.push_str(&self.prefix);
            key.push(':');
        }
        key.push_str(signature.qualified_name());
        key.push('(');
        key.push_str(&args_str);
        key.push(')');
        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            key.push_str("::");
            key.push_str(tag);
        }
        Ok(CacheKey(key))
    }
}

// One slot per declared parameter. `None` marks an ignored-type parameter the
// host injects; it has no string form and never reaches the key.
fn bind(
    signature: &Signature,
    args: &Args,
    ignored: &HashSet<ArgType>,
) -> Result<Vec<Option<String>>, BindingError> {
    let params = signature.params();
    let callable = || signature.qualified_name().to_owned();

    if args.positional.len() > params.len() {
        return Err(BindingError::TooManyPositional {
            callable: callable(),
            expected: params.len(),
            got: args.positional.len(),
        });
    }

    let mut slots: Vec<Option<String>> = vec![None; params.len()];
    for (slot, value) in slots.iter_mut().zip(&args.positional) {
        *slot = Some(value.clone());
    }

    for (name, value) in &args.keyword {
        let index = params
            .iter()
            .position(|p| &p.name == name)
            .ok_or_else(|| BindingError::UnexpectedKeyword {
                callable: callable(),
                name: name.clone(),
            })?;
        if slots[index].is_some() {
            return Err(BindingError::MultipleValues {
                callable: callable(),
                name: name.clone(),
            });
        }
        slots[index] = Some(value.clone());
    }

    for (slot, param) in slots.iter_mut().zip(params) {
        if slot.is_some() {
            continue;
        }
        if let Some(default) = &param.default {
            *slot = Some(default.clone());
        } else if !param.ty.is_some_and(|ty| ignored.contains(&ty)) {
            return Err(BindingError::Missing {
                callable: callable(),
                name: param.name.clone(),
            });
        }
    }

    Ok(slots)
}
