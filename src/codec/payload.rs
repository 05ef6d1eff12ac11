//! The value model handlers return and the codec walks.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Number, Value};
use uuid::Uuid;

use super::CodecError;

/// A response payload.
///
/// The JSON-native variants (`Null` through `Object`) serialize as-is. The
/// remaining variants are types JSON has no native form for; the
/// [`Codec`](super::Codec) rewrites them through its handler chain.
///
/// Objects are kept in a [`BTreeMap`] so that the canonical text, and with it
/// the ETag, does not depend on insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<Payload>),
    Object(BTreeMap<String, Payload>),
    /// Timestamp with a UTC offset.
    DateTime(DateTime<FixedOffset>),
    /// Calendar date without a time.
    Date(NaiveDate),
    /// Exact decimal with scale. `rust_decimal` holds a 96-bit mantissa, so
    /// values are limited to about 28 significant digits; anything within that
    /// round-trips unchanged.
    Decimal(Decimal),
    Uuid(Uuid),
    /// A structured value flattened to its fields.
    Model(Model),
    /// An enum variant carrying an underlying value.
    Label(Label),
    /// Any other runtime value. Only custom handlers can encode these.
    Opaque(Opaque),
}

/// A structured value captured as its field mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub type_name: String,
    pub fields: BTreeMap<String, Payload>,
}

/// An enumerated value: the variant label and the value it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub label: String,
    pub value: Box<Payload>,
}

/// A type-erased runtime value.
///
/// Two opaque payloads are equal only when they share the same allocation.
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opaque")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl Payload {
    /// Builds an object payload from `(key, value)` pairs.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Payload)>,
    {
        Payload::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Captures a serializable value as a [`Model`].
    ///
    /// # Errors
    ///
    /// [`CodecError::NotAModel`] if `value` does not serialize to a JSON
    /// object, [`CodecError::Json`] if serialization itself fails.
    pub fn model<T: Serialize>(value: &T) -> Result<Self, CodecError> {
        let type_name = std::any::type_name::<T>();
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Payload::Model(Model {
                type_name: type_name.to_owned(),
                fields: map.into_iter().map(|(k, v)| (k, Payload::from(v))).collect(),
            })),
            _ => Err(CodecError::NotAModel { type_name }),
        }
    }

    /// Wraps `value` as the underlying value of the enum variant `label`.
    pub fn label(label: impl Into<String>, value: impl Into<Payload>) -> Self {
        Payload::Label(Label {
            label: label.into(),
            value: Box::new(value.into()),
        })
    }

    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Payload::Opaque(Opaque::new(value))
    }

    /// Rebuilds a typed value from an object payload, usually one returned by
    /// [`Codec::decode`](super::Codec::decode).
    ///
    /// # Errors
    ///
    /// [`CodecError::Json`] if the payload does not match `T`.
    pub fn into_model<T: DeserializeOwned>(self) -> Result<T, CodecError> {
        Ok(serde_json::from_value(self.into_plain_json())?)
    }

    /// Looks up a field of an object or model payload.
    pub fn get(&self, field: &str) -> Option<&Payload> {
        match self {
            Payload::Object(map) => map.get(field),
            Payload::Model(model) => model.fields.get(field),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    /// A short name for the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Null => "null",
            Payload::Bool(_) => "bool",
            Payload::Number(_) => "number",
            Payload::String(_) => "string",
            Payload::List(_) => "list",
            Payload::Object(_) => "object",
            Payload::DateTime(_) => "chrono::DateTime<FixedOffset>",
            Payload::Date(_) => "chrono::NaiveDate",
            Payload::Decimal(_) => "rust_decimal::Decimal",
            Payload::Uuid(_) => "uuid::Uuid",
            Payload::Model(_) => "model",
            Payload::Label(_) => "label",
            Payload::Opaque(o) => o.type_name(),
        }
    }

    // Lossy conversion used only to feed serde; extended types become their
    // natural string forms, opaque values become null.
    fn into_plain_json(self) -> Value {
        match self {
            Payload::Null | Payload::Opaque(_) => Value::Null,
            Payload::Bool(b) => Value::Bool(b),
            Payload::Number(n) => Value::Number(n),
            Payload::String(s) => Value::String(s),
            Payload::List(items) => {
                Value::Array(items.into_iter().map(Payload::into_plain_json).collect())
            }
            Payload::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.into_plain_json()))
                    .collect(),
            ),
            Payload::DateTime(dt) => Value::String(dt.to_rfc3339()),
            Payload::Date(d) => Value::String(d.to_string()),
            Payload::Decimal(d) => Value::String(d.to_string()),
            Payload::Uuid(u) => Value::String(u.to_string()),
            Payload::Model(model) => Value::Object(
                model
                    .fields
                    .into_iter()
                    .map(|(k, v)| (k, v.into_plain_json()))
                    .collect(),
            ),
            Payload::Label(label) => label.value.into_plain_json(),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Payload::Null,
            Value::Bool(b) => Payload::Bool(b),
            Value::Number(n) => Payload::Number(n),
            Value::String(s) => Payload::String(s),
            Value::Array(items) => Payload::List(items.into_iter().map(Payload::from).collect()),
            Value::Object(map) => {
                Payload::Object(map.into_iter().map(|(k, v)| (k, Payload::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::String(value.to_owned())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::String(value)
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Payload::Bool(value)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Payload {
                fn from(value: $ty) -> Self {
                    Payload::Number(Number::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl From<f64> for Payload {
    /// Non-finite floats have no JSON form and become `Null`.
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Payload::Null, Payload::Number)
    }
}

impl From<DateTime<FixedOffset>> for Payload {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Payload::DateTime(value)
    }
}

impl From<DateTime<Utc>> for Payload {
    fn from(value: DateTime<Utc>) -> Self {
        Payload::DateTime(value.fixed_offset())
    }
}

impl From<NaiveDate> for Payload {
    fn from(value: NaiveDate) -> Self {
        Payload::Date(value)
    }
}

impl From<Decimal> for Payload {
    fn from(value: Decimal) -> Self {
        Payload::Decimal(value)
    }
}

impl From<Uuid> for Payload {
    fn from(value: Uuid) -> Self {
        Payload::Uuid(value)
    }
}

impl<T: Into<Payload>> From<Vec<T>> for Payload {
    fn from(value: Vec<T>) -> Self {
        Payload::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map_or(Payload::Null, Into::into)
    }
}
