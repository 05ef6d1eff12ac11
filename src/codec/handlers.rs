//! Built-in type handlers, registered by [`Codec::default`](super::Codec).

use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;

use super::{CodecError, Encoded, Payload, TypeHandler};

const DATETIME_TAG: &str = "datetime";
const DATE_TAG: &str = "date";
const DECIMAL_TAG: &str = "decimal";

/// `%Y-%m-%d`
const DATE_FORMAT: &str = "%Y-%m-%d";

/// RFC 3339 shaped, but `%Y` also writes and reads signed years outside
/// `0000..=9999`, which strict RFC 3339 parsing rejects.
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";

fn invalid(tag: &str, val: &str, reason: impl ToString) -> CodecError {
    CodecError::InvalidValue {
        tag: tag.to_owned(),
        val: val.to_owned(),
        reason: reason.to_string(),
    }
}

/// Timestamps with the original offset and any fractional seconds, e.g.
/// `2021-04-20T07:17:17+00:00`. Years past 9999 carry a sign
/// (`+10000-01-01T00:00:00+00:00`).
pub struct DateTimeHandler;

impl TypeHandler for DateTimeHandler {
    fn type_tag(&self) -> Option<&str> {
        Some(DATETIME_TAG)
    }

    fn encode(&self, value: &Payload) -> Option<Encoded> {
        match value {
            Payload::DateTime(dt) => Some(Encoded::Tagged {
                tag: DATETIME_TAG.to_owned(),
                val: dt.format(DATETIME_FORMAT).to_string(),
            }),
            _ => None,
        }
    }

    fn decode(&self, val: &str) -> Result<Payload, CodecError> {
        DateTime::parse_from_str(val, DATETIME_FORMAT)
            .map(Payload::DateTime)
            .map_err(|e| invalid(DATETIME_TAG, val, e))
    }
}

/// Calendar dates as `YYYY-MM-DD`.
pub struct DateHandler;

impl TypeHandler for DateHandler {
    fn type_tag(&self) -> Option<&str> {
        Some(DATE_TAG)
    }

    fn encode(&self, value: &Payload) -> Option<Encoded> {
        match value {
            Payload::Date(d) => Some(Encoded::Tagged {
                tag: DATE_TAG.to_owned(),
                val: d.format(DATE_FORMAT).to_string(),
            }),
            _ => None,
        }
    }

    fn decode(&self, val: &str) -> Result<Payload, CodecError> {
        NaiveDate::parse_from_str(val, DATE_FORMAT)
            .map(Payload::Date)
            .map_err(|e| invalid(DATE_TAG, val, e))
    }
}

/// Decimals as their exact string form, scale included (`3.140` stays
/// `3.140`).
pub struct DecimalHandler;

impl TypeHandler for DecimalHandler {
    fn type_tag(&self) -> Option<&str> {
        Some(DECIMAL_TAG)
    }

    fn encode(&self, value: &Payload) -> Option<Encoded> {
        match value {
            Payload::Decimal(d) => Some(Encoded::Tagged {
                tag: DECIMAL_TAG.to_owned(),
                val: d.to_string(),
            }),
            _ => None,
        }
    }

    fn decode(&self, val: &str) -> Result<Payload, CodecError> {
        val.parse::<Decimal>()
            .map(Payload::Decimal)
            .map_err(|e| invalid(DECIMAL_TAG, val, e))
    }
}

/// Models flatten to their field mapping; nested values are encoded again.
pub struct ModelHandler;

impl TypeHandler for ModelHandler {
    fn encode(&self, value: &Payload) -> Option<Encoded> {
        match value {
            Payload::Model(model) => Some(Encoded::Replace(Payload::Object(model.fields.clone()))),
            _ => None,
        }
    }
}

/// UUIDs become their hyphenated string. Lossy: they decode as strings.
pub struct UuidHandler;

impl TypeHandler for UuidHandler {
    fn encode(&self, value: &Payload) -> Option<Encoded> {
        match value {
            Payload::Uuid(u) => Some(Encoded::Replace(Payload::String(u.hyphenated().to_string()))),
            _ => None,
        }
    }
}

/// Enum labels become their underlying value. Lossy: the label is dropped.
pub struct LabelHandler;

impl TypeHandler for LabelHandler {
    fn encode(&self, value: &Payload) -> Option<Encoded> {
        match value {
            Payload::Label(label) => Some(Encoded::Replace((*label.value).clone())),
            _ => None,
        }
    }
}
