//! Multi-value reconciliation between buffered and stored property values.

use crate::value::{PropertyValue, Value, ValueKind};
use std::collections::HashSet;

/// Buffered value(s) for one property of one resource.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingValue {
    /// OVERWRITE: the last value seen in the batch
    Single(Value),
    /// ARRAY: every value seen in the batch, in arrival order
    Multi(Vec<Value>),
}

impl PendingValue {
    /// Fold `value` into an optional slot under the property's policy.
    pub fn accumulate(slot: &mut Option<PendingValue>, value: Value, multivalued: bool) {
        match (slot.as_mut(), multivalued) {
            (Some(PendingValue::Multi(values)), true) => values.push(value),
            (_, true) => *slot = Some(PendingValue::Multi(vec![value])),
            (_, false) => *slot = Some(PendingValue::Single(value)),
        }
    }

    pub fn values(&self) -> &[Value] {
        match self {
            PendingValue::Single(v) => std::slice::from_ref(v),
            PendingValue::Multi(vs) => vs,
        }
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }
}

/// Result of merging a pending value over a stored one.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub value: PropertyValue,
    /// Buffered values dropped for having a different type than the first value
    pub discarded: Vec<Value>,
    /// Whether mixed types were rendered as typed strings
    pub retyped: bool,
}

/// Keep the first occurrence of every value.
pub fn dedup_preserving_order(values: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::with_capacity(values.len());
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}

/// Merge `pending` over `existing`.
///
/// A single pending value replaces whatever is stored. A multi-value is
/// unioned with the stored value(s), existing values first, and deduplicated.
/// When the union mixes value types, `strict` drops every value whose type
/// differs from the first one; otherwise non-text values are rendered with
/// `render` (typically `lexical^^datatype`).
pub fn merge<E>(
    existing: Option<PropertyValue>,
    pending: PendingValue,
    strict: bool,
    mut render: impl FnMut(&Value) -> Result<String, E>,
) -> Result<Merged, E> {
    let incoming = match pending {
        PendingValue::Single(value) => {
            return Ok(Merged {
                value: PropertyValue::Single(value),
                discarded: Vec::new(),
                retyped: false,
            })
        }
        PendingValue::Multi(values) => values,
    };

    let stored = existing.map(PropertyValue::into_values).unwrap_or_default();
    let Some(first_kind) = stored.first().or(incoming.first()).map(Value::kind) else {
        return Ok(Merged {
            value: PropertyValue::List(Vec::new()),
            discarded: Vec::new(),
            retyped: false,
        });
    };

    let homogeneous = stored
        .iter()
        .chain(incoming.iter())
        .all(|v| v.kind() == first_kind);
    if homogeneous {
        let mut all = stored;
        all.extend(incoming);
        return Ok(Merged {
            value: PropertyValue::List(dedup_preserving_order(all)),
            discarded: Vec::new(),
            retyped: false,
        });
    }

    if strict {
        let (kept_incoming, discarded): (Vec<_>, Vec<_>) = incoming
            .into_iter()
            .partition(|v| v.kind() == first_kind);
        let mut all: Vec<Value> = stored
            .into_iter()
            .filter(|v| v.kind() == first_kind)
            .collect();
        all.extend(kept_incoming);
        return Ok(Merged {
            value: PropertyValue::List(dedup_preserving_order(all)),
            discarded,
            retyped: false,
        });
    }

    let mut all = Vec::with_capacity(stored.len() + incoming.len());
    for value in stored.into_iter().chain(incoming) {
        if value.kind() == ValueKind::Text {
            all.push(value);
        } else {
            all.push(Value::Text(render(&value)?));
        }
    }
    Ok(Merged {
        value: PropertyValue::List(dedup_preserving_order(all)),
        discarded: Vec::new(),
        retyped: true,
    })
}

/// Outcome of removing values from a stored property.
#[derive(Debug, Clone, PartialEq)]
pub enum Subtracted {
    /// Store this reduced value
    Keep(PropertyValue),
    /// Remove the property key
    Remove,
}

/// Remove `values` from a stored array.
///
/// Returns the new stored state and how many of `values` were not present.
pub fn subtract(existing: PropertyValue, values: &[Value]) -> (Subtracted, usize) {
    let stored = existing.into_values();
    let missing = values.iter().filter(|v| !stored.contains(v)).count();
    let remaining: Vec<Value> = stored.into_iter().filter(|v| !values.contains(v)).collect();
    if remaining.is_empty() {
        (Subtracted::Remove, missing)
    } else {
        (Subtracted::Keep(PropertyValue::List(remaining)), missing)
    }
}
