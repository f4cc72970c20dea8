//! Leaf filters: operator maps applied to a single field.

use indexmap::IndexMap;
use serde::Deserialize;
use smol_str::SmolStr;

use crate::value::FilterValue;

/// Operator name to operand map for one field, in input order.
///
/// A bare value is shorthand for `{ "eq": value }`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub struct LeafFilter {
    operators: IndexMap<SmolStr, FilterValue>,
}

impl LeafFilter {
    /// Create an empty leaf.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand equality leaf.
    pub fn eq(value: impl Into<FilterValue>) -> Self {
        Self::new().with("eq", value)
    }

    /// Add an operator.
    pub fn with(mut self, operator: impl Into<SmolStr>, operand: impl Into<FilterValue>) -> Self {
        self.operators.insert(operator.into(), operand.into());
        self
    }

    /// Parse from JSON.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Self {
                operators: map
                    .iter()
                    .map(|(k, v)| (SmolStr::new(k), FilterValue::from_json(v)))
                    .collect(),
            },
            other => Self::eq(FilterValue::from_json(other)),
        }
    }

    /// Get an operand by operator name.
    pub fn get(&self, operator: &str) -> Option<&FilterValue> {
        self.operators.get(operator)
    }

    /// Iterate over `(operator, operand)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.operators.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of operators.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Check if the leaf has no operators.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Regex operands of this leaf and of nested leaves (date parts, `length`).
    pub fn regex_patterns(&self) -> Vec<&str> {
        let mut patterns = Vec::new();
        for (op, operand) in &self.operators {
            match (op.as_str(), operand) {
                ("regex" | "iregex", FilterValue::String(pattern)) => patterns.push(pattern.as_str()),
                (_, FilterValue::Json(serde_json::Value::Object(nested))) => {
                    for (nested_op, nested_operand) in nested {
                        if let ("regex" | "iregex", serde_json::Value::String(pattern)) =
                            (nested_op.as_str(), nested_operand)
                        {
                            patterns.push(pattern.as_str());
                        }
                    }
                }
                _ => {}
            }
        }
        patterns
    }
}

impl From<serde_json::Value> for LeafFilter {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(&value)
    }
}
