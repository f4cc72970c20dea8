//! The filter tree.
//!
//! A [`FilterNode`] is parsed from a JSON object. Keys are classified by
//! name alone; whether `reviews` names a field or a relation, or whether
//! `reviews_count` is a real field, is decided later against the catalog.
//!
//! Parsing is lenient: an entry with the wrong JSON shape is dropped with a
//! debug log. Only a root that is not an object is an error.
//!
//! ```rust
//! use graphfilter_query::ast::{FilterEntry, FilterNode, Quantifier};
//! use serde_json::json;
//!
//! let node = FilterNode::parse(&json!({
//!     "name": {"icontains": "lamp"},
//!     "reviews_some": {"rating": {"gte": 4}},
//!     "OR": [{"price": {"lt": 20}}, {"on_sale": true}],
//!     "price": [1, 2]
//! })).unwrap();
//!
//! assert_eq!(node.len(), 4);
//! assert!(matches!(
//!     node.get("reviews_some"),
//!     Some(FilterEntry::Quantified { quantifier: Quantifier::Some, .. })
//! ));
//! ```

mod advanced;
mod leaf;

pub use advanced::{
    AggregationCondition, AggregationFilter, DateExtractFilter, DateTruncFilter, ExistsFilter,
    FieldComparison, SearchFilter, SubqueryFilter, WindowFilter,
};
pub use leaf::LeafFilter;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use smol_str::SmolStr;
use tracing::debug;

use crate::error::{FilterError, FilterResult};
use crate::value::FilterValue;

/// Relation quantifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    /// At least one related row matches (`_some`).
    Some,
    /// The relation is non-empty and every related row matches (`_every`).
    Every,
    /// No related row matches (`_none`).
    None,
}

impl Quantifier {
    /// Key suffix.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Some => "_some",
            Self::Every => "_every",
            Self::None => "_none",
        }
    }
}

/// One classified filter entry.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterEntry {
    /// `AND`: every node must match.
    And(Vec<FilterNode>),
    /// `OR`: at least one node must match.
    Or(Vec<FilterNode>),
    /// `NOT`: the node must not match.
    Not(Box<FilterNode>),
    /// `id`: leaf on the primary key.
    Id(LeafFilter),
    /// `quick`: free text across the quick-search fields.
    Quick(String),
    /// `include`: identifiers always part of the result.
    Include(Vec<FilterValue>),
    /// `search`: full-text search.
    Search(SearchFilter),
    /// `_window`: ranking filters.
    Window(Vec<WindowFilter>),
    /// `_subquery`: correlated lookups.
    Subquery(Vec<SubqueryFilter>),
    /// `_exists`: existence tests.
    Exists(Vec<ExistsFilter>),
    /// `_compare`: field-to-field comparisons.
    Compare(Vec<FieldComparison>),
    /// `<rel>_rel`: a filter on a related entity, joined in.
    Related { relation: SmolStr, node: FilterNode },
    /// `<rel>_some` / `_every` / `_none`.
    Quantified {
        relation: SmolStr,
        quantifier: Quantifier,
        node: FilterNode,
    },
    /// `<rel>_agg` / `<rel>_cond_agg`.
    Aggregate(AggregationFilter),
    /// `<field>_trunc`.
    DateTrunc(DateTruncFilter),
    /// `<field>_extract`.
    DateExtract(DateExtractFilter),
    /// `<rel>_count`, unless the entity has a real field with the full key.
    Count { relation: SmolStr, leaf: LeafFilter },
    /// Any other key: a field (or relation identifier) leaf.
    Field { name: SmolStr, leaf: LeafFilter },
}

impl FilterEntry {
    /// Nested nodes. Each is one level deeper than the entry's node.
    pub fn children(&self) -> Vec<&FilterNode> {
        match self {
            Self::And(nodes) | Self::Or(nodes) => nodes.iter().collect(),
            Self::Not(node) => vec![node.as_ref()],
            Self::Related { node, .. } | Self::Quantified { node, .. } => vec![node],
            Self::Exists(items) => items.iter().filter_map(|e| e.condition.as_ref()).collect(),
            Self::Aggregate(agg) => agg.condition.iter().map(|c| &c.node).collect(),
            _ => Vec::new(),
        }
    }

    /// Every leaf held directly by this entry.
    pub fn leaves(&self) -> Vec<&LeafFilter> {
        match self {
            Self::Id(leaf) | Self::Count { leaf, .. } | Self::Field { leaf, .. } => vec![leaf],
            Self::Aggregate(agg) => agg.functions.iter().map(|(_, leaf)| leaf).collect(),
            Self::Window(items) => items.iter().map(|w| &w.filter).collect(),
            Self::Subquery(items) => items.iter().map(|s| &s.filter).collect(),
            Self::DateTrunc(trunc) => vec![&trunc.filter],
            Self::DateExtract(extract) => vec![&extract.filter],
            _ => Vec::new(),
        }
    }

    /// Parse one entry.
    ///
    /// `_cond_agg` is checked before `_agg`, and `_count` last.
    fn classify(key: &str, value: &serde_json::Value) -> Option<Self> {
        match key {
            "AND" => return Some(Self::And(node_list(key, value)?)),
            "OR" => return Some(Self::Or(node_list(key, value)?)),
            "NOT" => return Some(Self::Not(Box::new(nested_node(key, value)?))),
            "id" => return Some(Self::Id(LeafFilter::from_json(value))),
            "quick" => return value.as_str().map(|q| Self::Quick(q.to_string())),
            "include" => {
                let values = FilterValue::from_json(value).into_list();
                return Some(Self::Include(values));
            }
            "search" => return SearchFilter::parse(value).map(Self::Search),
            "_window" => return non_empty(one_or_many(key, value)).map(Self::Window),
            "_subquery" => return non_empty(one_or_many(key, value)).map(Self::Subquery),
            "_exists" => return non_empty(one_or_many(key, value)).map(Self::Exists),
            "_compare" => return non_empty(one_or_many(key, value)).map(Self::Compare),
            _ => {}
        }

        if let Some(relation) = prefix(key, "_cond_agg") {
            return AggregationFilter::parse(relation, value, true).map(Self::Aggregate);
        }
        if let Some(relation) = prefix(key, "_agg") {
            return AggregationFilter::parse(relation, value, false).map(Self::Aggregate);
        }
        if let Some(relation) = prefix(key, "_rel") {
            return nested_node(key, value).map(|node| Self::Related {
                relation: SmolStr::new(relation),
                node,
            });
        }
        for quantifier in [Quantifier::Some, Quantifier::Every, Quantifier::None] {
            if let Some(relation) = prefix(key, quantifier.suffix()) {
                return nested_node(key, value).map(|node| Self::Quantified {
                    relation: SmolStr::new(relation),
                    quantifier,
                    node,
                });
            }
        }
        if let Some(field) = prefix(key, "_trunc") {
            return parse_one::<DateTruncFilter>(key, value).map(|mut trunc| {
                trunc.field = SmolStr::new(field);
                Self::DateTrunc(trunc)
            });
        }
        if let Some(field) = prefix(key, "_extract") {
            return parse_one::<DateExtractFilter>(key, value).map(|mut extract| {
                extract.field = SmolStr::new(field);
                Self::DateExtract(extract)
            });
        }
        if let Some(relation) = prefix(key, "_count") {
            return Some(Self::Count {
                relation: SmolStr::new(relation),
                leaf: LeafFilter::from_json(value),
            });
        }

        Some(Self::Field {
            name: SmolStr::new(key),
            leaf: LeafFilter::from_json(value),
        })
    }
}

fn prefix<'a>(key: &'a str, suffix: &str) -> Option<&'a str> {
    key.strip_suffix(suffix).filter(|rest| !rest.is_empty())
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn nested_node(key: &str, value: &serde_json::Value) -> Option<FilterNode> {
    match FilterNode::parse(value) {
        Ok(node) => Some(node),
        Err(_) => {
            debug!(key, "dropping entry: expected an object");
            None
        }
    }
}

fn node_list(key: &str, value: &serde_json::Value) -> Option<Vec<FilterNode>> {
    match value {
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| nested_node(key, item))
                .collect(),
        ),
        serde_json::Value::Object(_) => nested_node(key, value).map(|node| vec![node]),
        _ => {
            debug!(key, "dropping combinator: expected a list of objects");
            None
        }
    }
}

fn parse_one<T: DeserializeOwned>(key: &str, value: &serde_json::Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(key, error = %e, "dropping malformed entry");
            None
        }
    }
}

fn one_or_many<T: DeserializeOwned>(key: &str, value: &serde_json::Value) -> Vec<T> {
    match value {
        serde_json::Value::Array(items) => {
            items.iter().filter_map(|item| parse_one(key, item)).collect()
        }
        other => parse_one(key, other).into_iter().collect(),
    }
}

/// A filter over one entity: ordered map of keys to entries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub struct FilterNode {
    entries: IndexMap<SmolStr, FilterEntry>,
}

impl FilterNode {
    /// Create an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a node from a JSON object.
    pub fn parse(value: &serde_json::Value) -> FilterResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| FilterError::invalid_filter("filter must be a JSON object"))?;

        let mut entries = IndexMap::with_capacity(map.len());
        for (key, value) in map {
            match FilterEntry::classify(key, value) {
                Some(entry) => {
                    entries.insert(SmolStr::new(key), entry);
                }
                None => debug!(key = %key, "dropping malformed filter entry"),
            }
        }
        Ok(Self { entries })
    }

    /// Parse a node from JSON text.
    pub fn from_json_str(s: &str) -> FilterResult<Self> {
        let value: serde_json::Value = serde_json::from_str(s).map_err(|e| {
            FilterError::invalid_filter("filter is not valid JSON").with_source(e)
        })?;
        Self::parse(&value)
    }

    /// Add an entry.
    pub fn with(mut self, key: impl Into<SmolStr>, entry: FilterEntry) -> Self {
        self.entries.insert(key.into(), entry);
        self
    }

    /// Get an entry by key.
    pub fn get(&self, key: &str) -> Option<&FilterEntry> {
        self.entries.get(key)
    }

    /// Iterate over `(key, entry)` in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the node has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<serde_json::Value> for FilterNode {
    type Error = FilterError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_non_object_root_is_error() {
        let err = FilterNode::parse(&json!([1, 2])).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFilter);
    }

    #[test]
    fn test_key_classification() {
        let node = FilterNode::parse(&json!({
            "brand_rel": {"name": "Acme"},
            "reviews_every": {"rating": {"gte": 3}},
            "reviews_none": {"rating": 1},
            "reviews_agg": {"field": "rating", "avg": {"gte": 4}},
            "reviews_cond_agg": {"field": "rating", "count": {"gt": 1}, "condition": {"verified": true}},
            "reviews_count": {"gt": 2},
            "created_at_trunc": {"kind": "month", "filter": {"eq": "2024-01-01"}},
            "created_at_extract": {"part": "year", "filter": 2024},
            "quick": "lamp",
            "include": 7,
            "id": [1, 2]
        }))
        .unwrap();

        assert!(matches!(node.get("brand_rel"), Some(FilterEntry::Related { relation, .. }) if relation == "brand"));
        assert!(matches!(
            node.get("reviews_every"),
            Some(FilterEntry::Quantified { quantifier: Quantifier::Every, .. })
        ));
        assert!(matches!(
            node.get("reviews_none"),
            Some(FilterEntry::Quantified { quantifier: Quantifier::None, .. })
        ));
        match node.get("reviews_cond_agg") {
            Some(FilterEntry::Aggregate(agg)) => {
                assert_eq!(agg.relation, "reviews");
                assert!(agg.condition.is_some());
            }
            other => panic!("Expected conditional aggregate, got {:?}", other),
        }
        assert!(matches!(node.get("reviews_count"), Some(FilterEntry::Count { relation, .. }) if relation == "reviews"));
        match node.get("created_at_trunc") {
            Some(FilterEntry::DateTrunc(trunc)) => assert_eq!(trunc.field, "created_at"),
            other => panic!("Expected DateTrunc, got {:?}", other),
        }
        assert_eq!(node.get("include"), Some(&FilterEntry::Include(vec![FilterValue::Int(7)])));
        assert_eq!(node.get("quick"), Some(&FilterEntry::Quick("lamp".into())));
    }

    #[test]
    fn test_malformed_entries_dropped() {
        let node = FilterNode::parse(&json!({
            "brand_rel": 3,
            "AND": "x",
            "quick": 5,
            "_window": [{"function": "median"}],
            "created_at_trunc": {"kind": "decade", "filter": {}},
            "name": "ok"
        }))
        .unwrap();
        assert_eq!(node.len(), 1);
        assert!(node.get("name").is_some());
    }

    #[test]
    fn test_combinator_accepts_single_object() {
        let node = FilterNode::parse(&json!({"OR": {"a": 1}, "AND": [{"b": 2}, 3, {"c": 3}]})).unwrap();
        match node.get("OR") {
            Some(FilterEntry::Or(nodes)) => assert_eq!(nodes.len(), 1),
            other => panic!("Expected Or, got {:?}", other),
        }
        match node.get("AND") {
            Some(FilterEntry::And(nodes)) => assert_eq!(nodes.len(), 2),
            other => panic!("Expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_suffix_is_field() {
        let node = FilterNode::parse(&json!({"_rel": 1, "_count": 2})).unwrap();
        assert!(matches!(node.get("_rel"), Some(FilterEntry::Field { .. })));
        assert!(matches!(node.get("_count"), Some(FilterEntry::Field { .. })));
    }

    #[test]
    fn test_input_order_preserved() {
        let node = FilterNode::from_json_str(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
        let keys: Vec<_> = node.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_children() {
        let node = FilterNode::parse(&json!({
            "_exists": [{"relation": "reviews", "condition": {"rating": 5}}, {"relation": "tags"}]
        }))
        .unwrap();
        let entry = node.get("_exists").unwrap();
        assert_eq!(entry.children().len(), 1);
    }

    #[test]
    fn test_deserialize() {
        let node: FilterNode = serde_json::from_value(json!({"price": {"gt": 1}})).unwrap();
        assert_eq!(node.len(), 1);
        assert!(serde_json::from_value::<FilterNode>(json!("nope")).is_err());
    }
}
