//! Staged metadata filters.
//!
//! A [`FilterSet`] maps payload field names to operators. Pre-filters act
//! on indexed fields and are shipped to the vector store in its native
//! `{"field": {"$op": value}}` dialect; post-filters run in-process
//! against retrieved payloads. Both use the same operator semantics.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::error::EngineError;
use crate::models::ChunkPayload;

/// One comparison against a payload field.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    In(Vec<Value>),
    Lte(f64),
    Gte(f64),
    Lt(f64),
    Gt(f64),
}

/// A conjunction of per-field comparisons. Field order is stable for
/// deterministic serialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    fields: BTreeMap<String, FilterOp>,
}

/// Payload fields the vector store indexes for server-side filtering.
pub const PRE_FILTER_FIELDS: &[&str] = &["category", "language", "depth", "size_category"];

/// Non-indexed payload fields usable in post-filters.
pub const POST_FILTER_FIELDS: &[&str] = &[
    "has_class_def",
    "has_fn_def",
    "has_imports",
    "has_tests",
    "complexity",
    "word_count",
];

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, op: FilterOp) -> Self {
        self.fields.insert(field.to_string(), op);
        self
    }

    pub fn insert(&mut self, field: &str, op: FilterOp) {
        self.fields.insert(field.to_string(), op);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterOp)> {
        self.fields.iter()
    }

    /// Reject filters over unknown fields or with operands that cannot be
    /// compared. Callers disable filtering and continue on error.
    pub fn validate(&self, allowed_fields: &[&str]) -> Result<(), EngineError> {
        for (field, op) in &self.fields {
            if !allowed_fields.contains(&field.as_str()) {
                return Err(EngineError::Filter(format!(
                    "unknown filter field: {field}"
                )));
            }
            let comparable = match op {
                FilterOp::Eq(v) => v.is_string() || v.is_number() || v.is_boolean(),
                FilterOp::In(vs) => vs.iter().all(|v| v.is_string() || v.is_number()),
                FilterOp::Lte(_) | FilterOp::Gte(_) | FilterOp::Lt(_) | FilterOp::Gt(_) => true,
            };
            if !comparable {
                return Err(EngineError::Filter(format!(
                    "unsupported operand for field {field}"
                )));
            }
        }
        Ok(())
    }

    /// Evaluate the conjunction against one payload. A referenced field
    /// that does not exist fails the filter.
    pub fn matches(&self, payload: &ChunkPayload) -> bool {
        self.fields.iter().all(|(field, op)| {
            payload
                .field(field)
                .map(|value| op.matches(&value))
                .unwrap_or(false)
        })
    }

    /// Render in the vector store's metadata filter dialect, e.g.
    /// `{"language": {"$eq": "python"}, "depth": {"$lte": 2}}`.
    pub fn to_store_filter(&self) -> Value {
        let mut obj = serde_json::Map::new();
        for (field, op) in &self.fields {
            let clause = match op {
                FilterOp::Eq(v) => json!({ "$eq": v }),
                FilterOp::In(vs) => json!({ "$in": vs }),
                FilterOp::Lte(n) => json!({ "$lte": n }),
                FilterOp::Gte(n) => json!({ "$gte": n }),
                FilterOp::Lt(n) => json!({ "$lt": n }),
                FilterOp::Gt(n) => json!({ "$gt": n }),
            };
            obj.insert(field.clone(), clause);
        }
        Value::Object(obj)
    }
}

impl FilterOp {
    /// Apply this operator to a field value.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FilterOp::Eq(expected) => value == expected,
            FilterOp::In(options) => options.iter().any(|o| o == value),
            FilterOp::Lte(n) => as_f64(value).map(|v| v <= *n).unwrap_or(false),
            FilterOp::Gte(n) => as_f64(value).map(|v| v >= *n).unwrap_or(false),
            FilterOp::Lt(n) => as_f64(value).map(|v| v < *n).unwrap_or(false),
            FilterOp::Gt(n) => as_f64(value).map(|v| v > *n).unwrap_or(false),
        }
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}
