//! Property values stored on graph nodes.

use crate::model::vocab;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A single coerced literal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    #[serde(rename = "datetime")]
    DateTime(NaiveDateTime),
    Text(String),
}

/// Variant tag of a [`Value`], used to detect mixed typing within an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Float,
    Bool,
    Date,
    DateTime,
    Text,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Int => "integer",
            ValueKind::Float => "float",
            ValueKind::Bool => "boolean",
            ValueKind::Date => "date",
            ValueKind::DateTime => "datetime",
            ValueKind::Text => "text",
        }
    }

    /// XSD datatype used when a value of this kind is rendered as a typed string.
    pub fn datatype(&self) -> &'static str {
        match self {
            ValueKind::Int => vocab::XSD_LONG,
            ValueKind::Float => vocab::XSD_DOUBLE,
            ValueKind::Bool => vocab::XSD_BOOLEAN,
            ValueKind::Date => vocab::XSD_DATE,
            ValueKind::DateTime => vocab::XSD_DATE_TIME,
            ValueKind::Text => vocab::XSD_STRING,
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Date(_) => ValueKind::Date,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Text(_) => ValueKind::Text,
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Lexical form, as it would appear in a literal.
    pub fn lexical(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{:?}", s),
            other => f.write_str(&other.lexical()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// What a node holds under one property key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Single(Value),
    List(Vec<Value>),
}

impl PropertyValue {
    /// All values, in stored order.
    pub fn values(&self) -> &[Value] {
        match self {
            PropertyValue::Single(v) => std::slice::from_ref(v),
            PropertyValue::List(vs) => vs,
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        match self {
            PropertyValue::Single(v) => vec![v],
            PropertyValue::List(vs) => vs,
        }
    }

    pub fn as_single(&self) -> Option<&Value> {
        match self {
            PropertyValue::Single(v) => Some(v),
            PropertyValue::List(_) => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, PropertyValue::List(_))
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Single(v) => v.fmt(f),
            PropertyValue::List(vs) => {
                f.write_str("[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    v.fmt(f)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(v: Value) -> Self {
        PropertyValue::Single(v)
    }
}
