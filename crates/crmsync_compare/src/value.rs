//! Dynamic field value type.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute name to value map, used for both remote and local records.
pub type AttributeMap = BTreeMap<String, FieldValue>;

/// A single field value as seen by either side of a sync.
///
/// Values are untyped scalars: the remote system and the local store may
/// disagree on representation (a timestamp may arrive as text, a number as
/// an integer on one side and a float on the other), which is exactly what
/// [`crate::equals`] is there to paper over.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent / null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Text as received from a transport, not yet validated as UTF-8.
    RawText(Vec<u8>),
    /// Calendar date without a time component.
    Date(NaiveDate),
    /// Absolute instant.
    Timestamp(DateTime<Utc>),
}

/// Coarse kind of a value, used when deciding whether two values can be
/// compared at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Null.
    Null,
    /// Boolean.
    Bool,
    /// Integer or float.
    Numeric,
    /// Text (validated or raw).
    Text,
    /// Date.
    Date,
    /// Timestamp.
    Timestamp,
}

impl FieldValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            FieldValue::Null => ValueKind::Null,
            FieldValue::Bool(_) => ValueKind::Bool,
            FieldValue::Integer(_) | FieldValue::Float(_) => ValueKind::Numeric,
            FieldValue::Text(_) | FieldValue::RawText(_) => ValueKind::Text,
            FieldValue::Date(_) => ValueKind::Date,
            FieldValue::Timestamp(_) => ValueKind::Timestamp,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns the value as a float if it is numeric.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(n) => Some(*n as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this value as a string, if it is validated text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a timestamp, if it is one.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Integer(n) => write!(f, "{n}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Text(s) => write!(f, "{s:?}"),
            FieldValue::RawText(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            FieldValue::Date(d) => write!(f, "{d}"),
            FieldValue::Timestamp(ts) => {
                f.write_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Integer(n) => serializer.serialize_i64(*n),
            FieldValue::Float(x) => serializer.serialize_f64(*x),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::RawText(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
            FieldValue::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            FieldValue::Timestamp(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

/// Shape of a value on the wire. Strings stay strings: timestamp detection
/// is the comparison engine's job, not the deserializer's.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match WireValue::deserialize(deserializer)? {
            WireValue::Null => FieldValue::Null,
            WireValue::Bool(b) => FieldValue::Bool(b),
            WireValue::Integer(n) => FieldValue::Integer(n),
            WireValue::Float(x) => FieldValue::Float(x),
            WireValue::Text(s) => FieldValue::Text(s),
        })
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Integer(i64::from(n))
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        FieldValue::Float(x)
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        FieldValue::Date(d)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}
