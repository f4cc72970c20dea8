//! Fuzz target for filter parsing, validation and compilation.
//!
//! The first half of the input selects a mode. Raw mode feeds arbitrary bytes
//! as JSON; structured mode builds a tree from known keys and operators so the
//! compiler paths get exercised, not just the JSON parser.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_filter_tree
//! ```

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use graphfilter_query::{FilterApplicator, FilterNode, FilterSettings, MemoryAdapter, apply_compiled};
use graphfilter_schema::{Catalog, Entity, Field, FieldKind, Relation};
use libfuzzer_sys::fuzz_target;
use serde_json::{Value, json};
use std::sync::{Arc, OnceLock};

fn applicator() -> &'static FilterApplicator {
    static APPLICATOR: OnceLock<FilterApplicator> = OnceLock::new();
    APPLICATOR.get_or_init(|| {
        let catalog = Catalog::new()
            .with_entity(
                Entity::new("Product")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("name", FieldKind::Text))
                    .field(Field::new("price", FieldKind::Float))
                    .field(Field::new("created_at", FieldKind::DateTime))
                    .field(Field::new("tags", FieldKind::Array(Box::new(FieldKind::Text))))
                    .field(Field::new("meta", FieldKind::Json))
                    .relation(Relation::to_one("brand", "Brand"))
                    .relation(Relation::to_many("reviews", "Review")),
            )
            .with_entity(
                Entity::new("Brand")
                    .field(Field::new("id", FieldKind::Id))
                    .relation(Relation::to_many("products", "Product")),
            )
            .with_entity(
                Entity::new("Review")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("rating", FieldKind::Int))
                    .relation(Relation::to_one("product", "Product")),
            );
        FilterApplicator::new(Arc::new(catalog), &FilterSettings::all_features())
    })
}

const KEYS: &[&str] = &[
    "id", "name", "price", "created_at", "tags", "meta", "brand", "brand_rel", "reviews",
    "reviews_some", "reviews_every", "reviews_none", "reviews_count", "reviews_agg",
    "reviews_cond_agg", "created_at_trunc", "created_at_extract", "rating", "product_rel",
    "quick", "include", "search", "_window", "_subquery", "_exists", "_compare",
];

const OPERATORS: &[&str] = &[
    "eq", "ne", "gt", "gte", "lt", "lte", "in", "not_in", "between", "is_null", "contains",
    "icontains", "starts_with", "iends_with", "regex", "iregex", "year", "this_month",
    "has_key", "overlaps", "length", "avg", "sum", "max", "count",
];

/// A structured filter tree.
#[derive(Debug, Arbitrary)]
enum FuzzNode {
    Leaf { key: u8, op: u8, value: FuzzValue },
    Nested { key: u8, child: Box<FuzzNode> },
    And(Vec<FuzzNode>),
    Or(Vec<FuzzNode>),
    Not(Box<FuzzNode>),
}

#[derive(Debug, Arbitrary)]
enum FuzzValue {
    Null,
    Bool(bool),
    Int(i32),
    Float(f32),
    Text(String),
    List(Vec<i16>),
}

impl FuzzValue {
    fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => json!(b),
            Self::Int(i) => json!(i),
            Self::Float(f) => json!(f),
            Self::Text(s) => json!(s),
            Self::List(items) => json!(items),
        }
    }
}

impl FuzzNode {
    fn to_json(&self, depth: usize) -> Value {
        if depth > 12 {
            return json!({});
        }
        match self {
            Self::Leaf { key, op, value } => {
                let key = KEYS[*key as usize % KEYS.len()];
                let op = OPERATORS[*op as usize % OPERATORS.len()];
                json!({ key: { op: value.to_json() } })
            }
            Self::Nested { key, child } => {
                let key = KEYS[*key as usize % KEYS.len()];
                json!({ key: child.to_json(depth + 1) })
            }
            Self::And(children) => {
                json!({"AND": children.iter().map(|c| c.to_json(depth + 1)).collect::<Vec<_>>()})
            }
            Self::Or(children) => {
                json!({"OR": children.iter().map(|c| c.to_json(depth + 1)).collect::<Vec<_>>()})
            }
            Self::Not(child) => json!({"NOT": child.to_json(depth + 1)}),
        }
    }
}

fn exercise(raw: &Value) {
    // Parsing, validation and compilation must never panic, only return errors.
    let Ok(tree) = FilterNode::parse(raw) else {
        return;
    };
    let Ok(compiled) = applicator().compile(&tree, "Product") else {
        return;
    };
    let rows = MemoryAdapter::new(vec![
        json!({"id": 1, "name": "lamp", "price": 9.5, "tags": ["a"], "meta": {"k": 1},
               "created_at": "2024-05-01T10:00:00Z", "brand": {"id": 2},
               "reviews": [{"id": 3, "rating": 4}]}),
        json!({"id": 2, "reviews": []}),
    ]);
    let _ = apply_compiled(rows, &compiled);
}

fuzz_target!(|data: &[u8]| {
    let Some((mode, rest)) = data.split_first() else {
        return;
    };

    if mode % 2 == 0 {
        if let Ok(raw) = serde_json::from_slice::<Value>(rest) {
            exercise(&raw);
        }
    } else if let Ok(node) = FuzzNode::arbitrary(&mut Unstructured::new(rest)) {
        exercise(&node.to_json(0));
    }
});
