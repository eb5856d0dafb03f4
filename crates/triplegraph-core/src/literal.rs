//! Literal coercion: typed RDF literals to native property values.

use crate::model::{vocab, Literal};
use crate::naming::{NamespaceError, Vocabulary};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::trace;
use triplegraph_config::ImportConfig;

const XSD_INTEGER_FAMILY: &[&str] = &[
    "integer",
    "long",
    "int",
    "short",
    "byte",
    "nonNegativeInteger",
    "positiveInteger",
    "nonPositiveInteger",
    "negativeInteger",
    "unsignedLong",
    "unsignedInt",
    "unsignedShort",
    "unsignedByte",
];

const XSD_FLOAT_FAMILY: &[&str] = &["decimal", "double", "float"];

/// Datatype classes the coercer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatatypeClass {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Custom,
}

fn classify(datatype: &str) -> DatatypeClass {
    if datatype == vocab::XSD_STRING || datatype == vocab::RDF_LANG_STRING {
        return DatatypeClass::String;
    }
    let Some(local) = datatype.strip_prefix(vocab::XSD_NS) else {
        return DatatypeClass::Custom;
    };
    match local {
        "boolean" => DatatypeClass::Boolean,
        "date" => DatatypeClass::Date,
        "dateTime" => DatatypeClass::DateTime,
        l if XSD_INTEGER_FAMILY.contains(&l) => DatatypeClass::Integer,
        l if XSD_FLOAT_FAMILY.contains(&l) => DatatypeClass::Float,
        _ => DatatypeClass::Custom,
    }
}

/// Converts literals under one run's import policy.
#[derive(Debug, Clone)]
pub struct LiteralCoercer {
    config: ImportConfig,
}

impl LiteralCoercer {
    pub fn new(config: &ImportConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Coerce `literal`, the object of `property`.
    ///
    /// Returns `None` when the language filter rejects a string literal.
    /// Malformed numbers, booleans and dates fall back to their text.
    pub fn coerce(
        &self,
        property: &str,
        literal: &Literal,
        vocabulary: &mut Vocabulary,
    ) -> Result<Option<Value>, NamespaceError> {
        let lexical = literal.lexical.as_str();
        let value = match classify(literal.datatype()) {
            DatatypeClass::String => {
                if let Some(filter) = &self.config.language_filter {
                    let matches = literal
                        .language
                        .as_deref()
                        .is_some_and(|lang| lang.eq_ignore_ascii_case(filter));
                    if !matches {
                        trace!(property, "Literal rejected by language filter");
                        return Ok(None);
                    }
                }
                match (&literal.language, self.config.keep_lang_tag) {
                    (Some(lang), true) => Value::Text(format!("{}@{}", lexical, lang)),
                    _ => Value::text(lexical),
                }
            }
            DatatypeClass::Integer => lexical
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::text(lexical)),
            // INF, -INF and NaN stay text; stores cannot hold them as numbers
            DatatypeClass::Float => lexical
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float)
                .unwrap_or_else(|| Value::text(lexical)),
            DatatypeClass::Boolean => match lexical.trim() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => Value::text(lexical),
            },
            DatatypeClass::Date => parse_date(lexical)
                .map(Value::Date)
                .unwrap_or_else(|| Value::text(lexical)),
            DatatypeClass::DateTime => parse_date_time(lexical)
                .map(Value::DateTime)
                .unwrap_or_else(|| Value::text(lexical)),
            DatatypeClass::Custom => {
                if self.config.keeps_custom_data_type(property) {
                    Value::Text(vocabulary.typed_string(lexical, literal.datatype())?)
                } else {
                    Value::text(lexical)
                }
            }
        };
        Ok(Some(value))
    }
}

/// Parse an `xsd:date`, ignoring a trailing timezone.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    let (date, zone) = s.split_at_checked(10)?;
    let zone_ok = zone == "Z"
        || (zone.len() == 6 && (zone.starts_with('+') || zone.starts_with('-')));
    if !zone_ok {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Parse an `xsd:dateTime`.
///
/// Zoned values are kept as the wall-clock time at their own offset.
pub fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_local())
}
