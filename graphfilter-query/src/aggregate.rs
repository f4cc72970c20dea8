//! Aggregate functions used by `_agg` and `_cond_agg` filters.
//!
//! ```rust
//! use graphfilter_query::aggregate::AggregateFunction;
//! use serde_json::json;
//!
//! let ratings = [json!(5), json!(3), json!(null)];
//! assert_eq!(AggregateFunction::Avg.compute(&ratings), json!(4.0));
//! assert_eq!(AggregateFunction::Count.compute(&ratings), json!(2));
//! assert_eq!(AggregateFunction::Sum.compute(&[]), json!(null));
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// An aggregate over the rows of a to-many relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    /// Sum of a numeric field.
    Sum,
    /// Average of a numeric field.
    Avg,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
    /// Count non-null values (or related rows when no field is given).
    Count,
    /// Count distinct non-null values.
    CountDistinct,
}

impl AggregateFunction {
    /// Every aggregate function, in wire order.
    pub const ALL: [AggregateFunction; 6] = [
        Self::Sum,
        Self::Avg,
        Self::Min,
        Self::Max,
        Self::Count,
        Self::CountDistinct,
    ];

    /// Parse a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    /// Get the wire name, also used in projection names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
            Self::CountDistinct => "count_distinct",
        }
    }

    /// Get the SQL function name.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Count | Self::CountDistinct => "COUNT",
        }
    }

    /// Check if the function only makes sense over numeric fields.
    pub fn requires_numeric(&self) -> bool {
        matches!(self, Self::Sum | Self::Avg)
    }

    /// Check if the function can run without a field.
    pub fn allows_no_field(&self) -> bool {
        matches!(self, Self::Count)
    }

    /// Check if the result is always an integer count.
    pub fn is_count(&self) -> bool {
        matches!(self, Self::Count | Self::CountDistinct)
    }

    /// Compute the aggregate over a column of values. Nulls are ignored;
    /// an empty input yields NULL except for the counts, which yield 0.
    pub fn compute(&self, values: &[serde_json::Value]) -> serde_json::Value {
        let present: Vec<&serde_json::Value> = values.iter().filter(|v| !v.is_null()).collect();

        match self {
            Self::Count => serde_json::Value::from(present.len() as i64),
            Self::CountDistinct => {
                let distinct: HashSet<String> = present.iter().map(|v| v.to_string()).collect();
                serde_json::Value::from(distinct.len() as i64)
            }
            Self::Sum | Self::Avg => {
                let numbers: Vec<f64> = present.iter().filter_map(|v| v.as_f64()).collect();
                if numbers.is_empty() {
                    return serde_json::Value::Null;
                }
                let sum: f64 = numbers.iter().sum();
                if *self == Self::Avg {
                    serde_json::Value::from(sum / numbers.len() as f64)
                } else if present.iter().all(|v| v.is_i64()) {
                    serde_json::Value::from(sum as i64)
                } else {
                    serde_json::Value::from(sum)
                }
            }
            Self::Min | Self::Max => {
                let pick = if *self == Self::Min { Ordering::Less } else { Ordering::Greater };
                present
                    .iter()
                    .copied()
                    .reduce(|best, v| if compare_json(v, best) == Some(pick) { v } else { best })
                    .cloned()
                    .unwrap_or(serde_json::Value::Null)
            }
        }
    }
}

/// Order two JSON scalars of the same shape.
pub(crate) fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> Option<Ordering> {
    match (a, b) {
        (serde_json::Value::Number(x), serde_json::Value::Number(y)) => {
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (serde_json::Value::String(x), serde_json::Value::String(y)) => Some(x.cmp(y)),
        (serde_json::Value::Bool(x), serde_json::Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_name() {
        assert_eq!(AggregateFunction::from_name("count_distinct"), Some(AggregateFunction::CountDistinct));
        assert_eq!(AggregateFunction::from_name("median"), None);
    }

    #[test]
    fn test_sum_keeps_integers() {
        assert_eq!(AggregateFunction::Sum.compute(&[json!(1), json!(2)]), json!(3));
        assert_eq!(AggregateFunction::Sum.compute(&[json!(1.5), json!(2)]), json!(3.5));
    }

    #[test]
    fn test_min_max() {
        let values = [json!(4), json!(1), json!(9)];
        assert_eq!(AggregateFunction::Min.compute(&values), json!(1));
        assert_eq!(AggregateFunction::Max.compute(&values), json!(9));
        assert_eq!(AggregateFunction::Max.compute(&[json!("b"), json!("a")]), json!("b"));
    }

    #[test]
    fn test_count_distinct() {
        let values = [json!("a"), json!("b"), json!("a"), json!(null)];
        assert_eq!(AggregateFunction::CountDistinct.compute(&values), json!(2));
        assert_eq!(AggregateFunction::Count.compute(&[]), json!(0));
    }
}
