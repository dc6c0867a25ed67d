//! Canonical scalar value shared by row handles, bind parameters, query
//! results and loaded node properties.
use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::PropertyType;

/// Typed value tagged with explicit type information.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// SQL null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Long(i64),
    /// 64-bit floating point number.
    Double(f64),
    /// UTF-8 text, including materialised large text.
    String(String),
    /// Binary payload.
    Bytes(Vec<u8>),
    /// Milliseconds since Unix epoch in UTC.
    #[serde(deserialize_with = "serde_millis::deserialize")]
    Date(i64),
}

mod serde_millis {
    use serde::de::{self, Deserializer, Visitor};
    use std::fmt;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MillisVisitor;

        impl<'de> Visitor<'de> for MillisVisitor {
            type Value = i64;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a string or number of milliseconds since Unix epoch")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(value)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                i64::try_from(value).map_err(|_| E::custom("date literal exceeds i64 range"))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse::<i64>()
                    .map_err(|err| E::custom(format!("invalid date literal '{value}': {err}")))
            }
        }

        deserializer.deserialize_any(MillisVisitor)
    }
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrows the text of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer payload of a long value.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Short name of the value's type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "binary",
            Value::Date(_) => "date",
        }
    }

    /// Converts the value for binding against a column of type `ty`.
    ///
    /// Returns `None` when the value cannot represent the target type.
    pub fn coerce(&self, ty: PropertyType) -> Option<Value> {
        match (ty, self) {
            (_, Value::Null) => Some(Value::Null),
            (PropertyType::String | PropertyType::LargeText, Value::String(s)) => {
                Some(Value::String(s.clone()))
            }
            (PropertyType::String | PropertyType::LargeText, Value::Long(v)) => {
                Some(Value::String(v.to_string()))
            }
            (PropertyType::String | PropertyType::LargeText, Value::Double(v)) => {
                Some(Value::String(v.to_string()))
            }
            (PropertyType::String | PropertyType::LargeText, Value::Bool(v)) => {
                Some(Value::String(v.to_string()))
            }
            (PropertyType::Long, Value::Long(v)) => Some(Value::Long(*v)),
            // `i64::MAX as f64` rounds up to 2^63, which is out of range.
            (PropertyType::Long, Value::Double(v))
                if v.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(v) =>
            {
                Some(Value::Long(*v as i64))
            }
            (PropertyType::Long, Value::String(s)) => s.trim().parse().ok().map(Value::Long),
            (PropertyType::Long, Value::Bool(v)) => Some(Value::Long(i64::from(*v))),
            (PropertyType::Double, Value::Double(v)) => Some(Value::Double(*v)),
            (PropertyType::Double, Value::Long(v)) => Some(Value::Double(*v as f64)),
            (PropertyType::Double, Value::String(s)) => s.trim().parse().ok().map(Value::Double),
            (PropertyType::Boolean, Value::Bool(v)) => Some(Value::Bool(*v)),
            (PropertyType::Boolean, Value::Long(v)) => match v {
                0 => Some(Value::Bool(false)),
                1 => Some(Value::Bool(true)),
                _ => None,
            },
            (PropertyType::Boolean, Value::String(s)) => match s.trim() {
                t if t.eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
                f if f.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
                _ => None,
            },
            (PropertyType::Date, Value::Date(v)) => Some(Value::Date(*v)),
            (PropertyType::Date, Value::Long(v)) => Some(Value::Date(*v)),
            (PropertyType::LargeBinary, Value::Bytes(b)) => Some(Value::Bytes(b.clone())),
            _ => None,
        }
    }

    /// Orders two non-null values of compatible types.
    ///
    /// `collation` enables case-insensitive text ordering for locale-aware sorts.
    /// Returns `None` when either side is null or the types are incomparable.
    pub fn compare(&self, other: &Value, collation: Option<&str>) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Long(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Long(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Long(b)) | (Value::Long(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(match collation {
                Some(_) => a
                    .to_lowercase()
                    .cmp(&b.to_lowercase())
                    .then_with(|| a.cmp(b)),
                None => a.cmp(b),
            }),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "'{v}'"),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => write!(f, "date({v})"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Long(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}
