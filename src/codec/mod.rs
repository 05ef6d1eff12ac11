//! Value codec: canonical JSON text for response payloads, extended to the
//! types JSON cannot carry natively.
//!
//! Encoding walks a [`Payload`]. At every node the registered
//! [`TypeHandler`]s are consulted in order and the first one that claims the
//! value wins, so registration order is override priority. A handler either
//! emits a tagged object
//!
//! ```text
//! { "_spec_type": "<tag>", "val": "<string form>" }
//! ```
//!
//! which decoding turns back into the original value, or replaces the value
//! with another payload that is walked again (models become their fields,
//! UUIDs become strings). Values no handler claims fall through to the JSON
//! base cases; anything left over fails with
//! [`CodecError::NotSerializable`].
//!
//! Decoding looks every tagged object up in a reverse map from tag to handler.
//! Unknown tags fail with [`CodecError::UnsupportedType`].
//!
//! ## Lossy handlers
//!
//! UUIDs decode as plain strings and enum labels decode as their underlying
//! value. Neither writes a tag, so the original wrapper type cannot be
//! recovered from the cached text.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

mod handlers;
mod payload;

pub use handlers::{DateHandler, DateTimeHandler, DecimalHandler, LabelHandler, ModelHandler, UuidHandler};
pub use payload::{Label, Model, Opaque, Payload};

/// Discriminator field of a tagged object.
pub const TYPE_FIELD: &str = "_spec_type";

/// Value field of a tagged object.
pub const VALUE_FIELD: &str = "val";

/// Errors produced while encoding or decoding payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("object of type {type_name} is not serializable")]
    NotSerializable { type_name: &'static str },

    #[error("\"{val}\" (type: {tag}) is not a supported cached type")]
    UnsupportedType { tag: String, val: String },

    #[error("invalid {tag} value \"{val}\": {reason}")]
    InvalidValue {
        tag: String,
        val: String,
        reason: String,
    },

    #[error("value of type {type_name} does not serialize to an object")]
    NotAModel { type_name: &'static str },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a [`TypeHandler`] turns a value into.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    /// Emit `{ "_spec_type": tag, "val": val }`.
    Tagged { tag: String, val: String },
    /// Encode this payload in place of the original.
    Replace(Payload),
}

/// One link of the encoder chain.
///
/// Handlers that return [`Encoded::Tagged`] must report the same tag from
/// [`type_tag`](Self::type_tag) and implement [`decode`](Self::decode) so the
/// value can be read back.
pub trait TypeHandler: Send + Sync {
    /// Discriminator this handler writes, or `None` for lossy handlers.
    fn type_tag(&self) -> Option<&str> {
        None
    }

    /// Returns `Some` if this handler claims `value`.
    fn encode(&self, value: &Payload) -> Option<Encoded>;

    /// Reconstructs a value from the `val` field of a tagged object.
    fn decode(&self, val: &str) -> Result<Payload, CodecError> {
        Err(CodecError::UnsupportedType {
            tag: self.type_tag().unwrap_or_default().to_owned(),
            val: val.to_owned(),
        })
    }
}

/// Ordered handler chain plus its reverse tag map.
#[derive(Clone)]
pub struct Codec {
    handlers: Vec<Arc<dyn TypeHandler>>,
    by_tag: HashMap<String, usize>,
}

impl Default for Codec {
    /// A codec with the built-in handlers in priority order: datetime, date,
    /// decimal, model, uuid, label.
    fn default() -> Self {
        let mut codec = Self::empty();
        codec.register(DateTimeHandler);
        codec.register(DateHandler);
        codec.register(DecimalHandler);
        codec.register(ModelHandler);
        codec.register(UuidHandler);
        codec.register(LabelHandler);
        codec
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("handlers", &self.handlers.len())
            .field("tags", &self.by_tag.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Codec {
    /// A codec with no handlers: only JSON-native payloads encode.
    pub fn empty() -> Self {
        Self {
            handlers: Vec::new(),
            by_tag: HashMap::new(),
        }
    }

    /// Appends `handler` to the end of the chain (lowest priority).
    ///
    /// Decoding a tag is owned by the highest-priority handler reporting it,
    /// so a tag already claimed earlier in the chain keeps its decoder.
    pub fn register(&mut self, handler: impl TypeHandler + 'static) -> &mut Self {
        self.handlers.push(Arc::new(handler));
        self.reindex();
        self
    }

    /// Inserts `handler` at the front of the chain, ahead of the built-ins.
    pub fn register_first(&mut self, handler: impl TypeHandler + 'static) -> &mut Self {
        self.handlers.insert(0, Arc::new(handler));
        self.reindex();
        self
    }

    fn reindex(&mut self) {
        // Reverse so that earlier handlers overwrite later ones.
        self.by_tag = self
            .handlers
            .iter()
            .enumerate()
            .rev()
            .filter_map(|(i, h)| h.type_tag().map(|tag| (tag.to_owned(), i)))
            .collect();
    }

    /// Encodes `payload` to its canonical text.
    ///
    /// # Errors
    ///
    /// [`CodecError::NotSerializable`] naming the first value nothing could
    /// encode.
    pub fn encode(&self, payload: &Payload) -> Result<String, CodecError> {
        Ok(serde_json::to_string(&self.to_json(payload)?)?)
    }

    /// Encodes `payload` to a JSON value tree.
    pub fn to_json(&self, payload: &Payload) -> Result<Value, CodecError> {
        for handler in &self.handlers {
            if let Some(encoded) = handler.encode(payload) {
                return match encoded {
                    Encoded::Tagged { tag, val } => {
                        let mut map = Map::new();
                        map.insert(VALUE_FIELD.to_owned(), Value::String(val));
                        map.insert(TYPE_FIELD.to_owned(), Value::String(tag));
                        Ok(Value::Object(map))
                    }
                    Encoded::Replace(inner) => self.to_json(&inner),
                };
            }
        }
        self.base(payload)
    }

    fn base(&self, payload: &Payload) -> Result<Value, CodecError> {
        match payload {
            Payload::Null => Ok(Value::Null),
            Payload::Bool(b) => Ok(Value::Bool(*b)),
            Payload::Number(n) => Ok(Value::Number(n.clone())),
            Payload::String(s) => Ok(Value::String(s.clone())),
            Payload::List(items) => items
                .iter()
                .map(|item| self.to_json(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Payload::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.to_json(v)?)))
                .collect::<Result<Map<_, _>, CodecError>>()
                .map(Value::Object),
            other => Err(CodecError::NotSerializable {
                type_name: other.kind(),
            }),
        }
    }

    /// Decodes canonical text back into a payload.
    ///
    /// # Errors
    ///
    /// [`CodecError::Json`] for malformed text, [`CodecError::UnsupportedType`]
    /// for a tag no handler owns, [`CodecError::InvalidValue`] when the owning
    /// handler rejects the value.
    pub fn decode(&self, text: &str) -> Result<Payload, CodecError> {
        let value: Value = serde_json::from_str(text)?;
        self.from_json(value)
    }

    /// Decodes a JSON value tree.
    pub fn from_json(&self, value: Value) -> Result<Payload, CodecError> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.from_json(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Payload::List),
            Value::Object(map) if map.contains_key(TYPE_FIELD) => self.revive(map),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| Ok((k, self.from_json(v)?)))
                .collect::<Result<_, CodecError>>()
                .map(Payload::Object),
            scalar => Ok(Payload::from(scalar)),
        }
    }

    fn revive(&self, map: Map<String, Value>) -> Result<Payload, CodecError> {
        let tag = json_text(&map[TYPE_FIELD]);
        let val = map.get(VALUE_FIELD).map(json_text).unwrap_or_default();
        match self.by_tag.get(&tag) {
            Some(&index) => self.handlers[index].decode(&val),
            None => Err(CodecError::UnsupportedType { tag, val }),
        }
    }
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct Ipv4Handler;

    impl TypeHandler for Ipv4Handler {
        fn type_tag(&self) -> Option<&str> {
            Some("ipv4")
        }

        fn encode(&self, value: &Payload) -> Option<Encoded> {
            let Payload::Opaque(opaque) = value else {
                return None;
            };
            opaque.downcast_ref::<Ipv4Addr>().map(|ip| Encoded::Tagged {
                tag: "ipv4".into(),
                val: ip.to_string(),
            })
        }

        fn decode(&self, val: &str) -> Result<Payload, CodecError> {
            val.parse::<Ipv4Addr>()
                .map(Payload::opaque)
                .map_err(|e| CodecError::InvalidValue {
                    tag: "ipv4".into(),
                    val: val.into(),
                    reason: e.to_string(),
                })
        }
    }

    #[test]
    fn plain_json_round_trips() {
        let codec = Codec::default();
        let payload = Payload::object([
            ("success", Payload::from(true)),
            ("count", Payload::from(3)),
            ("tags", Payload::from(vec!["a", "b"])),
            ("missing", Payload::Null),
        ]);
        let text = codec.encode(&payload).unwrap();
        assert_eq!(codec.decode(&text).unwrap(), payload);
    }

    #[test]
    fn object_keys_are_canonically_ordered() {
        let codec = Codec::default();
        let a = Payload::object([("b", Payload::from(1)), ("a", Payload::from(2))]);
        let b = Payload::object([("a", Payload::from(2)), ("b", Payload::from(1))]);
        assert_eq!(codec.encode(&a).unwrap(), codec.encode(&b).unwrap());
        assert_eq!(codec.encode(&a).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn unhandled_opaque_is_not_serializable() {
        let codec = Codec::default();
        let payload = Payload::object([("addr", Payload::opaque(Ipv4Addr::LOCALHOST))]);
        match codec.encode(&payload) {
            Err(CodecError::NotSerializable { type_name }) => {
                assert!(type_name.ends_with("Ipv4Addr"));
            }
            other => panic!("expected NotSerializable, got {other:?}"),
        }
    }

    #[test]
    fn empty_codec_rejects_extended_types() {
        let codec = Codec::empty();
        let date = chrono::NaiveDate::from_ymd_opt(2021, 4, 21).unwrap();
        assert!(matches!(
            codec.encode(&Payload::from(date)),
            Err(CodecError::NotSerializable { .. })
        ));
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let codec = Codec::default();
        let text = r#"{"when":{"_spec_type":"ipv4","val":"127.0.0.1"}}"#;
        match codec.decode(text) {
            Err(CodecError::UnsupportedType { tag, val }) => {
                assert_eq!(tag, "ipv4");
                assert_eq!(val, "127.0.0.1");
            }
            other => panic!("expected UnsupportedType, got {other:?}"),
        }
    }

    #[test]
    fn custom_handler_round_trips_opaque_values() {
        let mut codec = Codec::default();
        codec.register(Ipv4Handler);
        let text = codec
            .encode(&Payload::opaque(Ipv4Addr::new(10, 0, 0, 1)))
            .unwrap();
        assert_eq!(text, r#"{"_spec_type":"ipv4","val":"10.0.0.1"}"#);

        let Payload::Opaque(decoded) = codec.decode(&text).unwrap() else {
            panic!("expected an opaque payload");
        };
        assert_eq!(
            decoded.downcast_ref::<Ipv4Addr>(),
            Some(&Ipv4Addr::new(10, 0, 0, 1))
        );
    }

    #[test]
    fn first_registered_handler_wins() {
        struct DateAsString;

        impl TypeHandler for DateAsString {
            fn encode(&self, value: &Payload) -> Option<Encoded> {
                match value {
                    Payload::Date(d) => Some(Encoded::Replace(Payload::String(d.to_string()))),
                    _ => None,
                }
            }
        }

        let mut codec = Codec::default();
        codec.register_first(DateAsString);
        let date = chrono::NaiveDate::from_ymd_opt(2021, 4, 21).unwrap();
        assert_eq!(codec.encode(&Payload::from(date)).unwrap(), r#""2021-04-21""#);
    }

    #[test]
    fn malformed_text_is_a_json_error() {
        let codec = Codec::default();
        assert!(matches!(codec.decode("{not json"), Err(CodecError::Json(_))));
    }
}
