//! In-memory evaluation of compiled filters over JSON rows.
//!
//! Rows are JSON objects. A to-one relation is a nested object, a to-many
//! relation an array of objects. [`MemoryAdapter`] computes projections into
//! each row under the projection name, then keeps the rows the predicate
//! accepts.
//!
//! Comparisons are two-valued: a missing or null operand fails every test
//! except `IS NULL`. Window and search rank projections are not computed, so
//! predicates over them never match.
//!
//! ```rust
//! use graphfilter_query::applicator::FilterApplicator;
//! use graphfilter_query::ast::FilterNode;
//! use graphfilter_query::eval::MemoryAdapter;
//! use graphfilter_query::FilterSettings;
//! use graphfilter_schema::{Catalog, Entity, Field, FieldKind, Relation};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let catalog = Catalog::new()
//!     .with_entity(
//!         Entity::new("Product")
//!             .field(Field::new("id", FieldKind::Id))
//!             .relation(Relation::to_many("reviews", "Review")),
//!     )
//!     .with_entity(Entity::new("Review").field(Field::new("rating", FieldKind::Int)));
//! let applicator = FilterApplicator::new(Arc::new(catalog), &FilterSettings::default());
//!
//! let rows = MemoryAdapter::new(vec![
//!     json!({"id": 1, "reviews": [{"rating": 5}, {"rating": 4}]}),
//!     json!({"id": 2, "reviews": [{"rating": 1}]}),
//!     json!({"id": 3, "reviews": []}),
//! ]);
//! let tree = FilterNode::parse(&json!({"reviews_agg": {"field": "rating", "avg": {"gte": 4}}})).unwrap();
//!
//! let matched = applicator.apply(rows, &tree, "Product").unwrap();
//! assert_eq!(matched.ids("id"), vec![json!(1)]);
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use regex_lite::Regex;
use serde_json::{Map, Value};
use smol_str::SmolStr;
use std::cmp::Ordering;
use tracing::{debug, trace};

use crate::aggregate::compare_json;
use crate::applicator::QueryAdapter;
use crate::expr::{ArrayMatch, FieldPath, KeyMatch, Operand, Predicate, RelationPath, TextMatch};
use crate::projection::{Projection, ProjectionExpr, ProjectionSet};
use crate::types::{OrderKey, SortOrder};
use crate::value::FilterValue;

/// A query over an in-memory list of JSON rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryAdapter {
    rows: Vec<Value>,
}

impl MemoryAdapter {
    /// Wrap a list of rows.
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows }
    }

    /// The current rows.
    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    /// Take the rows.
    pub fn into_rows(self) -> Vec<Value> {
        self.rows
    }

    /// The value of `field` in each row, in row order.
    pub fn ids(&self, field: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(field).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no rows are left.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl QueryAdapter for MemoryAdapter {
    fn annotate(mut self, projections: &ProjectionSet) -> Self {
        for row in &mut self.rows {
            for projection in projections.iter() {
                for target in scope_rows_mut(row, projection.scope.segments()) {
                    let Some(value) = compute(projection, target) else {
                        continue;
                    };
                    if let Value::Object(map) = target {
                        map.insert(projection.name().to_string(), value);
                    }
                }
            }
        }
        self
    }

    fn filter(mut self, predicate: &Predicate) -> Self {
        let before = self.rows.len();
        self.rows.retain(|row| evaluate(predicate, &Context { row, base: row }));
        trace!(before, after = self.rows.len(), "rows filtered");
        self
    }
}

/// The row a predicate is evaluated against, and the row its projections
/// live on: the base row, or the related row of the innermost existence test.
#[derive(Clone, Copy)]
struct Context<'r> {
    row: &'r Value,
    base: &'r Value,
}

/// The rows at `path` below `row`, mutably.
fn scope_rows_mut<'r>(row: &'r mut Value, path: &[SmolStr]) -> Vec<&'r mut Value> {
    let Some((first, rest)) = path.split_first() else {
        return vec![row];
    };
    match row.get_mut(first.as_str()) {
        Some(Value::Array(items)) => items
            .iter_mut()
            .flat_map(|item| scope_rows_mut(item, rest))
            .collect(),
        Some(value) if value.is_object() => scope_rows_mut(value, rest),
        _ => Vec::new(),
    }
}

fn compute(projection: &Projection, row: &Value) -> Option<Value> {
    match &projection.expr {
        ProjectionExpr::Aggregate {
            function,
            relation,
            field,
            filter,
        } => {
            let related = related_rows(row, relation);
            let values: Vec<Value> = related
                .into_iter()
                .filter(|item| match filter {
                    Some(filter) => evaluate(filter, &Context { row: *item, base: *item }),
                    None => true,
                })
                .map(|item| match field {
                    Some(field) => item.get(field.as_str()).cloned().unwrap_or(Value::Null),
                    None => Value::Bool(true),
                })
                .collect();
            Some(function.compute(&values))
        }
        ProjectionExpr::Count { relation } => {
            Some(Value::from(related_rows(row, relation).len() as i64))
        }
        ProjectionExpr::Subquery {
            relation,
            field,
            order_by,
        } => {
            let mut related = related_rows(row, relation);
            related.sort_by(|a, b| order_rows(a, b, order_by));
            Some(
                related
                    .first()
                    .and_then(|item| item.get(field.as_str()))
                    .cloned()
                    .unwrap_or(Value::Null),
            )
        }
        ProjectionExpr::DateTrunc { field, kind } => Some(match temporal(read(row, field)?) {
            Some(Temporal::Date(date)) => Value::String(kind.truncate_date(date).to_string()),
            Some(Temporal::DateTime(dt)) => Value::String(kind.truncate(dt).to_rfc3339()),
            None => Value::Null,
        }),
        ProjectionExpr::DateExtract { field, part } => Some(match temporal(read(row, field)?) {
            Some(Temporal::Date(date)) => Value::from(part.extract_date(date)),
            Some(Temporal::DateTime(dt)) => Value::from(part.extract(dt)),
            None => Value::Null,
        }),
        ProjectionExpr::SearchVector { fields, .. } => {
            let text: Vec<&str> = fields
                .iter()
                .filter_map(|field| read(row, field).and_then(Value::as_str))
                .collect();
            Some(Value::String(text.join(" ")))
        }
        ProjectionExpr::Window { .. } | ProjectionExpr::SearchRank { .. } => {
            trace!(projection = %projection.name(), "projection not evaluated in memory");
            None
        }
    }
}

fn order_rows(a: &Value, b: &Value, keys: &[OrderKey]) -> Ordering {
    for key in keys {
        let left = a.get(key.field.as_str()).unwrap_or(&Value::Null);
        let right = b.get(key.field.as_str()).unwrap_or(&Value::Null);
        // Nulls sort last in either direction.
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => compare_json(left, right).unwrap_or(Ordering::Equal),
        };
        let ordering = match key.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Rows reached from `row` through a relation path. Objects are one row,
/// arrays are many, anything else is none.
fn related_rows<'r>(row: &'r Value, path: &RelationPath) -> Vec<&'r Value> {
    let mut current = vec![row];
    for segment in path.segments() {
        current = current
            .into_iter()
            .filter_map(|item| item.get(segment.as_str()))
            .flat_map(|value| match value {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                Value::Object(_) => vec![value],
                _ => Vec::new(),
            })
            .collect();
    }
    current
}

/// Follow a field path through nested objects.
fn read<'r>(row: &'r Value, path: &FieldPath) -> Option<&'r Value> {
    path.segments()
        .iter()
        .try_fold(row, |value, segment| value.get(segment.as_str()))
}

enum Temporal {
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

fn temporal(value: &Value) -> Option<Temporal> {
    let text = value.as_str()?;
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Temporal::Date(date));
    }
    match FilterValue::from(text).coerce_datetime() {
        FilterValue::DateTime(dt) => Some(Temporal::DateTime(dt)),
        _ => None,
    }
}

fn resolve<'r>(operand: &Operand, ctx: &Context<'r>) -> Option<Value> {
    let value = match operand {
        Operand::Field(path) => read(ctx.row, path)?.clone(),
        Operand::Projection(projection) => ctx.base.get(projection.name())?.clone(),
        Operand::DatePart { field, part } => match temporal(read(ctx.row, field)?)? {
            Temporal::Date(date) => Value::from(part.extract_date(date)),
            Temporal::DateTime(dt) => Value::from(part.extract(dt)),
        },
        Operand::ArrayLength(path) => Value::from(read(ctx.row, path)?.as_array()?.len() as i64),
    };
    (!value.is_null()).then_some(value)
}

/// Order an actual JSON value against an expected operand.
///
/// Temporal operands coerce the actual value the same way the compiler
/// coerced the operand.
fn order(actual: &Value, expected: &FilterValue) -> Option<Ordering> {
    let actual = match expected {
        FilterValue::Date(_) => FilterValue::from_json(actual).coerce_date(),
        FilterValue::DateTime(_) => FilterValue::from_json(actual).coerce_datetime(),
        FilterValue::Json(json) => {
            return Some(if actual == json { Ordering::Equal } else { Ordering::Less });
        }
        _ => FilterValue::from_json(actual),
    };
    match (&actual, expected) {
        (FilterValue::String(a), FilterValue::String(b)) => Some(a.cmp(b)),
        (FilterValue::Bool(a), FilterValue::Bool(b)) => Some(a.cmp(b)),
        (FilterValue::Date(a), FilterValue::Date(b)) => Some(a.cmp(b)),
        (FilterValue::DateTime(a), FilterValue::DateTime(b)) => Some(a.cmp(b)),
        (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

fn equals(actual: &Value, expected: &FilterValue) -> bool {
    order(actual, expected) == Some(Ordering::Equal)
}

fn evaluate(predicate: &Predicate, ctx: &Context<'_>) -> bool {
    match predicate {
        Predicate::Compare { left, op, value } => resolve(left, ctx)
            .and_then(|actual| order(&actual, value))
            .is_some_and(|ordering| op.holds(ordering)),
        Predicate::CompareOperands { left, op, right } => {
            match (resolve(left, ctx), resolve(right, ctx)) {
                (Some(left), Some(right)) => {
                    compare_json(&left, &right).is_some_and(|ordering| op.holds(ordering))
                }
                _ => false,
            }
        }
        Predicate::In {
            operand,
            values,
            negated,
        } => match resolve(operand, ctx) {
            Some(actual) => values.iter().any(|v| equals(&actual, v)) != *negated,
            None => false,
        },
        Predicate::IsNull { operand, negated } => resolve(operand, ctx).is_none() != *negated,
        Predicate::Text {
            operand,
            kind,
            value,
            case_insensitive,
        } => {
            let Some(actual) = resolve(operand, ctx) else {
                return false;
            };
            let Some(text) = actual.as_str() else {
                return false;
            };
            let (text, value) = if *case_insensitive {
                (text.to_lowercase(), value.to_lowercase())
            } else {
                (text.to_string(), value.clone())
            };
            match kind {
                TextMatch::Contains => text.contains(&value),
                TextMatch::StartsWith => text.starts_with(&value),
                TextMatch::EndsWith => text.ends_with(&value),
            }
        }
        Predicate::Regex {
            operand,
            pattern,
            case_insensitive,
        } => {
            let Some(actual) = resolve(operand, ctx) else {
                return false;
            };
            let source = if *case_insensitive {
                format!("(?i){}", pattern)
            } else {
                pattern.clone()
            };
            match Regex::new(&source) {
                Ok(re) => actual.as_str().is_some_and(|text| re.is_match(text)),
                Err(e) => {
                    debug!(pattern = %pattern, error = %e, "invalid regex in evaluation");
                    false
                }
            }
        }
        Predicate::JsonKeys {
            operand,
            keys,
            mode,
        } => {
            let Some(Value::Object(map)) = resolve(operand, ctx) else {
                return false;
            };
            match mode {
                KeyMatch::All => keys.iter().all(|key| map.contains_key(key)),
                KeyMatch::Any => keys.iter().any(|key| map.contains_key(key)),
            }
        }
        Predicate::Array {
            operand,
            kind,
            values,
        } => {
            let Some(Value::Array(items)) = resolve(operand, ctx) else {
                return false;
            };
            let holds = |item: &Value| values.iter().any(|v| equals(item, v));
            match kind {
                ArrayMatch::Contains => values
                    .iter()
                    .all(|v| items.iter().any(|item| equals(item, v))),
                ArrayMatch::ContainedBy => items.iter().all(holds),
                ArrayMatch::Overlaps => items.iter().any(holds),
            }
        }
        Predicate::Exists {
            relation,
            predicate,
            ..
        } => related_rows(ctx.row, relation).into_iter().any(|item| match predicate {
            Some(inner) => evaluate(inner, &Context { row: item, base: item }),
            None => true,
        }),
        Predicate::TextSearch {
            vector,
            query,
            mode,
            ..
        } => ctx
            .base
            .get(vector.name())
            .and_then(Value::as_str)
            .is_some_and(|document| mode.matches(document, query)),
        Predicate::And(items) => items.iter().all(|item| evaluate(item, ctx)),
        Predicate::Or(items) => items.iter().any(|item| evaluate(item, ctx)),
        Predicate::Not(inner) => !evaluate(inner, ctx),
    }
}

/// Evaluate a predicate against a single row that already carries its projections.
pub fn matches(predicate: &Predicate, row: &Value) -> bool {
    evaluate(predicate, &Context { row, base: row })
}

/// Compute the base-row projections of a single row without filtering.
///
/// Projections scoped to related rows are left out.
pub fn project(projections: &ProjectionSet, row: &Value) -> Map<String, Value> {
    projections
        .iter()
        .filter(|projection| projection.scope.is_empty())
        .filter_map(|projection| {
            compute(projection, row).map(|value| (projection.name().to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applicator::FilterApplicator;
    use crate::ast::FilterNode;
    use crate::config::FilterSettings;
    use chrono::TimeZone;
    use graphfilter_schema::{Catalog, Entity, Field, FieldKind, Relation};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn applicator(settings: FilterSettings) -> FilterApplicator {
        let catalog = Catalog::new()
            .with_entity(
                Entity::new("Product")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("name", FieldKind::Text))
                    .field(Field::new("price", FieldKind::Float))
                    .field(Field::new("cost", FieldKind::Float))
                    .field(Field::new("released", FieldKind::Date))
                    .field(Field::new("tags", FieldKind::Array(Box::new(FieldKind::Text))))
                    .field(Field::new("meta", FieldKind::Json).nullable())
                    .relation(Relation::to_one("brand", "Brand"))
                    .relation(Relation::to_many("reviews", "Review")),
            )
            .with_entity(
                Entity::new("Brand")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("name", FieldKind::Text)),
            )
            .with_entity(
                Entity::new("Review")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("rating", FieldKind::Int))
                    .field(Field::new("verified", FieldKind::Boolean))
                    .field(Field::new("posted", FieldKind::DateTime)),
            );
        FilterApplicator::new(Arc::new(catalog), &settings)
    }

    fn rows() -> Vec<Value> {
        vec![
            json!({
                "id": 1, "name": "Desk Lamp", "price": 30.0, "cost": 12.0,
                "released": "2023-11-02", "tags": ["light", "desk"], "meta": {"color": "red"},
                "brand": {"id": 10, "name": "Acme"},
                "reviews": [
                    {"id": 100, "rating": 5, "verified": true, "posted": "2024-01-03T10:00:00Z"},
                    {"id": 101, "rating": 4, "verified": true, "posted": "2024-02-01T09:00:00Z"}
                ]
            }),
            json!({
                "id": 2, "name": "Floor Lamp", "price": 80.0, "cost": 95.0,
                "released": "2024-03-15", "tags": ["light"], "meta": null,
                "brand": {"id": 11, "name": "Globex"},
                "reviews": [
                    {"id": 102, "rating": 2, "verified": false, "posted": "2024-03-20T18:30:00Z"},
                    {"id": 103, "rating": 5, "verified": true, "posted": "2024-04-01T08:00:00Z"}
                ]
            }),
            json!({
                "id": 3, "name": "Chair", "price": 45.0, "cost": 20.0,
                "released": "2024-05-01", "tags": [], "meta": {"legs": 4},
                "brand": null,
                "reviews": []
            }),
        ]
    }

    fn run(settings: FilterSettings, tree: Value) -> Vec<Value> {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let compiled = applicator(settings)
            .compile_at(&FilterNode::parse(&tree).unwrap(), "Product", now)
            .unwrap();
        crate::applicator::apply_compiled(MemoryAdapter::new(rows()), &compiled).ids("id")
    }

    fn ids(tree: Value) -> Vec<Value> {
        run(FilterSettings::default(), tree)
    }

    #[test]
    fn test_every_needs_a_row() {
        assert_eq!(ids(json!({"reviews_every": {"rating": {"gte": 4}}})), vec![json!(1)]);
        assert_eq!(ids(json!({"reviews_every": {}})), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_none_negates_some() {
        let some = ids(json!({"reviews_some": {"rating": {"lt": 3}}}));
        let none = ids(json!({"reviews_none": {"rating": {"lt": 3}}}));
        assert_eq!(some, vec![json!(2)]);
        assert_eq!(none, vec![json!(1), json!(3)]);
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(
            ids(json!({"reviews_agg": {"field": "rating", "avg": {"gte": 4}}})),
            vec![json!(1)]
        );
        assert_eq!(ids(json!({"reviews_count": 0})), vec![json!(3)]);
        assert_eq!(
            ids(json!({"reviews_agg": {"field": "rating", "min": {"lte": 2}}})),
            vec![json!(2)]
        );
    }

    #[test]
    fn test_conditional_aggregate() {
        let tree = json!({"reviews_cond_agg": {
            "field": "rating",
            "count": {"gte": 2},
            "condition": {"verified": true}
        }});
        assert_eq!(run(FilterSettings::all_features(), tree), vec![json!(1)]);
    }

    #[test]
    fn test_related_and_identifier() {
        assert_eq!(ids(json!({"brand_rel": {"name": "Acme"}})), vec![json!(1)]);
        assert_eq!(ids(json!({"brand": {"is_null": true}})), vec![json!(3)]);
        assert_eq!(ids(json!({"reviews": 103})), vec![json!(2)]);
    }

    #[test]
    fn test_text_and_regex() {
        assert_eq!(ids(json!({"name": {"icontains": "LAMP"}})), vec![json!(1), json!(2)]);
        assert_eq!(ids(json!({"name": {"iregex": "^floor"}})), vec![json!(2)]);
        assert_eq!(ids(json!({"quick": "chair", "include": [1]})), vec![json!(1), json!(3)]);
    }

    #[test]
    fn test_compare_fields() {
        assert_eq!(
            ids(json!({"_compare": {"left": "cost", "op": "gt", "right": "price"}})),
            vec![json!(2)]
        );
    }

    #[test]
    fn test_temporal() {
        assert_eq!(ids(json!({"released": {"gte": "2024-01-01"}})), vec![json!(2), json!(3)]);
        assert_eq!(ids(json!({"released": {"year": 2023}})), vec![json!(1)]);
        assert_eq!(ids(json!({"released": {"this_year": true}})), vec![json!(2), json!(3)]);
        assert_eq!(
            run(
                FilterSettings::all_features(),
                json!({"released_trunc": {"kind": "month", "filter": {"eq": "2024-03-01"}}})
            ),
            vec![json!(2)]
        );
        assert_eq!(
            ids(json!({"reviews_some": {"posted": {"hour": {"gte": 18}}}})),
            vec![json!(2)]
        );
    }

    #[test]
    fn test_arrays_and_json() {
        let settings = FilterSettings::all_features();
        assert_eq!(run(settings.clone(), json!({"tags": {"contains": "desk"}})), vec![json!(1)]);
        assert_eq!(
            run(settings.clone(), json!({"tags": {"length": {"lt": 1}}})),
            vec![json!(3)]
        );
        assert_eq!(run(settings, json!({"meta": {"has_key": "legs"}})), vec![json!(3)]);
        assert_eq!(ids(json!({"meta": null})), vec![json!(2)]);
    }

    #[test]
    fn test_subquery_and_exists() {
        let settings = FilterSettings::all_features();
        assert_eq!(
            run(
                settings.clone(),
                json!({"_subquery": {
                    "relation": "reviews",
                    "field": "rating",
                    "order_by": ["-posted"],
                    "filter": {"eq": 5}
                }})
            ),
            vec![json!(2)]
        );
        assert_eq!(
            run(settings, json!({"_exists": {"relation": "reviews", "exists": false}})),
            vec![json!(3)]
        );
    }

    #[test]
    fn test_search() {
        let tree = json!({"search": "desk"});
        assert_eq!(run(FilterSettings::all_features(), tree), vec![json!(1)]);
    }

    #[test]
    fn test_window_projection_is_not_evaluated() {
        let tree = json!({"_window": {"function": "row_number", "order_by": ["price"], "filter": {"lte": 1}}});
        assert!(run(FilterSettings::all_features(), tree).is_empty());
    }

    #[test]
    fn test_project_single_row() {
        let applicator = applicator(FilterSettings::default());
        let tree = FilterNode::parse(&json!({"reviews_count": {"gt": 0}})).unwrap();
        let compiled = applicator.compile(&tree, "Product").unwrap();
        let row = rows().remove(0);
        let projected = project(&compiled.projections, &row);
        assert_eq!(projected.get("reviews_count"), Some(&json!(2)));

        let mut annotated = row;
        if let Value::Object(map) = &mut annotated {
            map.extend(projected);
        }
        assert!(matches(compiled.predicate.as_ref().unwrap(), &annotated));
    }
}
