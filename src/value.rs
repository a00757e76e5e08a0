use std::collections::BTreeMap;
use std::fmt;

/// The dynamic value type that flows between rows, containers, and filters.
///
/// Stands in for whatever value representation the externally owned
/// schema-validation library uses; this crate never needs to know more about
/// a value than "which of these shapes is it".
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat),
    String(String),
    /// A nested map value, used for the in-memory representation of a
    /// record/tagged-union payload before it has been decomposed into
    /// containers (e.g. the `partial.variant` argument to `update`).
    Map(BTreeMap<String, Value>),
}

/// Thin wrapper so `Value` can derive `PartialEq` without requiring `Eq` on `f64`.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl From<f64> for OrderedFloat {
    fn from(v: f64) -> Self {
        OrderedFloat(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{}", v.0),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Map(m) => write!(f, "{m:?}"),
        }
    }
}

impl Value {
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v.into())
    }
}
