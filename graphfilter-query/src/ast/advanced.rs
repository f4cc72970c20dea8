//! Structured filter entries: aggregations, windows, subqueries, existence,
//! field comparisons, date parts and full-text search.

use serde::Deserialize;
use smol_str::SmolStr;
use tracing::debug;

use super::{FilterNode, LeafFilter};
use crate::aggregate::AggregateFunction;
use crate::expr::CompareOp;
use crate::projection::ProjectionKey;
use crate::search::SearchMode;
use crate::temporal::{DatePart, TruncKind};
use crate::types::OrderKey;
use crate::window::{WindowFunction, WindowSpec};

/// `<rel>_agg` / `<rel>_cond_agg`: aggregate a related field and filter on the result.
///
/// ```json
/// { "field": "rating", "avg": { "gte": 4.0 }, "count": { "gt": 10 } }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationFilter {
    /// The to-many relation.
    pub relation: SmolStr,
    /// The aggregated field. `None` only makes sense for `count`.
    pub field: Option<SmolStr>,
    /// Aggregate functions with the leaf applied to each result.
    pub functions: Vec<(AggregateFunction, LeafFilter)>,
    /// Restricts the aggregated rows (`_cond_agg` only).
    pub condition: Option<AggregationCondition>,
}

/// The row condition of a conditional aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationCondition {
    /// Filter over the related entity.
    pub node: FilterNode,
    /// Stable fingerprint of the condition, part of the projection name.
    pub fingerprint: u32,
}

impl AggregationFilter {
    /// Parse the body of an aggregation key.
    pub(crate) fn parse(
        relation: &str,
        value: &serde_json::Value,
        conditional: bool,
    ) -> Option<Self> {
        let map = value.as_object()?;

        let field = match map.get("field") {
            Some(serde_json::Value::String(field)) => Some(SmolStr::new(field)),
            Some(_) => return None,
            None => None,
        };

        let functions: Vec<_> = AggregateFunction::ALL
            .into_iter()
            .filter_map(|function| {
                map.get(function.as_str())
                    .map(|leaf| (function, LeafFilter::from_json(leaf)))
            })
            .collect();
        if functions.is_empty() {
            return None;
        }

        let condition = if conditional {
            let raw = map.get("condition")?;
            let node = FilterNode::parse(raw).ok()?;
            Some(AggregationCondition {
                node,
                fingerprint: ProjectionKey::fingerprint(raw),
            })
        } else {
            None
        };

        Some(Self {
            relation: SmolStr::new(relation),
            field,
            functions,
            condition,
        })
    }
}

/// `_window`: rank base rows and filter on the rank.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindowFilter {
    /// Ranking function.
    pub function: WindowFunction,
    /// Partition fields.
    #[serde(default)]
    pub partition_by: Vec<SmolStr>,
    /// Ordering keys (`-price` for descending).
    #[serde(default)]
    pub order_by: Vec<OrderKey>,
    /// Numeric leaf applied to the rank.
    pub filter: LeafFilter,
}

impl WindowFilter {
    /// The OVER clause.
    pub fn spec(&self) -> WindowSpec {
        WindowSpec {
            partition_by: self.partition_by.clone(),
            order_by: self.order_by.clone(),
        }
    }
}

/// `_subquery`: the first related value in some order, filtered.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubqueryFilter {
    /// The to-many relation.
    pub relation: SmolStr,
    /// The related field to select.
    pub field: SmolStr,
    /// Ordering keys choosing the first row.
    #[serde(default)]
    pub order_by: Vec<OrderKey>,
    /// Leaf of the selected field's kind.
    pub filter: LeafFilter,
}

/// `_exists`: whether related rows matching a condition exist.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExistsFilter {
    /// The relation.
    pub relation: SmolStr,
    /// Filter over the related entity.
    #[serde(default)]
    pub condition: Option<FilterNode>,
    /// `false` turns the test into NOT EXISTS.
    #[serde(default = "default_true")]
    pub exists: bool,
}

fn default_true() -> bool {
    true
}

/// `_compare`: compare two fields of the same entity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldComparison {
    /// Left field.
    pub left: SmolStr,
    /// Comparison operator.
    pub op: CompareOp,
    /// Right field.
    pub right: SmolStr,
}

/// `<field>_trunc`: truncate a temporal field and filter on the result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DateTruncFilter {
    /// The temporal field, taken from the key.
    #[serde(skip)]
    pub field: SmolStr,
    /// Truncation granularity.
    pub kind: TruncKind,
    /// Date leaf applied to the truncated value.
    pub filter: LeafFilter,
}

/// `<field>_extract`: extract a date part and filter on it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DateExtractFilter {
    /// The temporal field, taken from the key.
    #[serde(skip)]
    pub field: SmolStr,
    /// The part to extract.
    pub part: DatePart,
    /// Numeric leaf applied to the part.
    pub filter: LeafFilter,
}

/// `search`: full-text search over the entity's search fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchFilter {
    /// Query text.
    pub query: String,
    /// Fields to search. Empty means the entity's search fields.
    #[serde(default)]
    pub fields: Vec<SmolStr>,
    /// How the query is interpreted.
    #[serde(default)]
    pub mode: SearchMode,
    /// Minimum rank for a row to match.
    #[serde(default)]
    pub min_rank: Option<f64>,
    /// Text search configuration. Defaults to the configured one.
    #[serde(default)]
    pub config: Option<String>,
}

impl SearchFilter {
    /// A plain query over the default fields.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            fields: Vec::new(),
            mode: SearchMode::default(),
            min_rank: None,
            config: None,
        }
    }

    /// Parse the string or object form.
    pub(crate) fn parse(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(query) => Some(Self::new(query.clone())),
            serde_json::Value::Object(_) => match serde_json::from_value(value.clone()) {
                Ok(search) => Some(search),
                Err(e) => {
                    debug!(error = %e, "dropping malformed search filter");
                    None
                }
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_aggregation_parse() {
        let agg = AggregationFilter::parse(
            "reviews",
            &json!({"field": "rating", "avg": {"gte": 4.0}, "max": 5}),
            false,
        )
        .unwrap();
        assert_eq!(agg.field.as_deref(), Some("rating"));
        assert_eq!(agg.functions.len(), 2);
        assert_eq!(agg.functions[0].0, AggregateFunction::Avg);
        assert!(agg.condition.is_none());
    }

    #[test]
    fn test_aggregation_without_functions_dropped() {
        assert!(AggregationFilter::parse("reviews", &json!({"field": "rating"}), false).is_none());
        assert!(AggregationFilter::parse("reviews", &json!(3), false).is_none());
    }

    #[test]
    fn test_conditional_aggregation_needs_condition() {
        let body = json!({"field": "rating", "avg": {"gte": 4}});
        assert!(AggregationFilter::parse("reviews", &body, true).is_none());

        let body = json!({"field": "rating", "avg": {"gte": 4}, "condition": {"verified": true}});
        let agg = AggregationFilter::parse("reviews", &body, true).unwrap();
        let condition = agg.condition.unwrap();
        assert_eq!(condition.node.len(), 1);
        assert_eq!(
            condition.fingerprint,
            ProjectionKey::fingerprint(&json!({"verified": true}))
        );
    }

    #[test]
    fn test_window_filter_deserialize() {
        let window: WindowFilter = serde_json::from_value(json!({
            "function": "dense_rank",
            "partition_by": ["category"],
            "order_by": ["-price"],
            "filter": {"lte": 3}
        }))
        .unwrap();
        assert_eq!(window.function, WindowFunction::DenseRank);
        assert_eq!(window.spec().order_by, vec![OrderKey::desc("price")]);
    }

    #[test]
    fn test_exists_defaults_to_true() {
        let exists: ExistsFilter = serde_json::from_value(json!({"relation": "reviews"})).unwrap();
        assert!(exists.exists);
        assert!(exists.condition.is_none());
    }

    #[test]
    fn test_search_forms() {
        let plain = SearchFilter::parse(&json!("red shoes")).unwrap();
        assert_eq!(plain.mode, SearchMode::Plain);

        let full = SearchFilter::parse(&json!({
            "query": "red shoes",
            "mode": "phrase",
            "min_rank": 0.1
        }))
        .unwrap();
        assert_eq!(full.mode, SearchMode::Phrase);
        assert_eq!(full.min_rank, Some(0.1));

        assert!(SearchFilter::parse(&json!({"mode": "phrase"})).is_none());
        assert!(SearchFilter::parse(&json!(42)).is_none());
    }

    #[test]
    fn test_compare_deserialize() {
        let cmp: FieldComparison =
            serde_json::from_value(json!({"left": "price", "op": "gt", "right": "cost"})).unwrap();
        assert_eq!(cmp.op, CompareOp::Gt);
        assert!(
            serde_json::from_value::<FieldComparison>(json!({"left": "a", "op": "like", "right": "b"}))
                .is_err()
        );
    }
}
