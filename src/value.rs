//! The dynamic value type produced by the generator and consumed by sinks.

use std::fmt;

use indexmap::IndexMap;
use num_bigint::BigInt;

/// A dynamically-typed value produced while generating a record.
///
/// This mirrors the shape of a parsed JSON value (object/array/string/number/bool/null) plus an
/// arbitrary-precision integer variant, since sequence counters can exceed 64 bits (see
/// [`crate::context::RunContext`]).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// SQL `NULL` / JSON `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// An arbitrary-precision integer, used for sequence counters and integer rules.
    Int(BigInt),
    /// A 64-bit float, used for `decimal`/`float`/`double`/`numeric` columns.
    Float(f64),
    /// A UTF-8 string.
    Str(String),
    /// An ordered list of values, used for JSON array nodes.
    List(Vec<Value>),
    /// An ordered map of values, used for JSON object nodes and database records.
    ///
    /// [`IndexMap`] preserves insertion order, which keeps JSON object key order and CSV column
    /// order deterministic across a run.
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Returns `true` if this value is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The canonical string form used for uniqueness-set membership and CSV/SQL rendering of
    /// non-string scalars.
    ///
    /// This is intentionally infallible: every variant has some textual representation, and the
    /// generator only ever needs a hashable key, not a round-trippable one.
    pub fn canonical_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => {
                let mut buf = ryu::Buffer::new();
                buf.format(*f).to_owned()
            }
            Self::Str(s) => s.clone(),
            Self::List(_) | Self::Map(_) => serde_json::to_string(&self.to_json()).unwrap_or_default(),
        }
    }

    /// Converts this value into a [`serde_json::Value`] for JSON/TXT sinks.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => {
                if let Ok(n) = i64::try_from(i.clone()) {
                    serde_json::Value::Number(n.into())
                } else {
                    // BigInt values too large for i64/f64 are rendered as JSON strings so no
                    // precision is silently lost (see Testable Property: sequence precision).
                    serde_json::Value::String(i.to_string())
                }
            }
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Self::Map(map) => {
                serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => {
                let mut buf = ryu::Buffer::new();
                write!(f, "{}", buf.format(*v))
            }
            Self::Str(s) => write!(f, "{s}"),
            Self::List(_) | Self::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(BigInt::from(value))
    }
}

impl From<BigInt> for Value {
    fn from(value: BigInt) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(BigInt::from(i))
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigint_beyond_i64_is_rendered_as_json_string() {
        let huge: BigInt = "123456789012345678901234567890".parse().unwrap();
        let value = Value::Int(huge.clone());
        assert_eq!(value.to_json(), serde_json::Value::String(huge.to_string()));
    }

    #[test]
    fn small_int_is_rendered_as_json_number() {
        let value = Value::Int(BigInt::from(42));
        assert_eq!(value.to_json(), serde_json::json!(42));
    }

    #[test]
    fn canonical_string_is_stable_for_equal_floats() {
        let a = Value::Float(1.5).canonical_string();
        let b = Value::Float(1.5).canonical_string();
        assert_eq!(a, b);
    }

    #[test]
    fn display_matches_canonical_string_for_scalars() {
        let v = Value::Str("hello".into());
        assert_eq!(v.to_string(), "hello");
        assert_eq!(v.canonical_string(), "hello");
    }
}
