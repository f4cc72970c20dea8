//! Read-only filter analysis.
//!
//! The analyzer never compiles or rejects a tree. It reports what a query
//! layer needs to know before running one: the relations to join or
//! prefetch, the size of the tree, and a rough cost tier with hints.
//!
//! ```rust
//! use graphfilter_query::analyzer::{CostTier, FilterAnalyzer};
//! use graphfilter_query::ast::FilterNode;
//! use graphfilter_query::FilterSettings;
//! use graphfilter_schema::{Catalog, Entity, Field, FieldKind, Relation};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let catalog = Catalog::new()
//!     .with_entity(
//!         Entity::new("Product")
//!             .field(Field::new("id", FieldKind::Id))
//!             .relation(Relation::to_one("brand", "Brand"))
//!             .relation(Relation::to_many("reviews", "Review")),
//!     )
//!     .with_entity(Entity::new("Brand").field(Field::new("id", FieldKind::Id)))
//!     .with_entity(
//!         Entity::new("Review")
//!             .field(Field::new("id", FieldKind::Id))
//!             .field(Field::new("rating", FieldKind::Int)),
//!     );
//!
//! let analyzer = FilterAnalyzer::new(Arc::new(catalog), &FilterSettings::default());
//! let tree = FilterNode::parse(&json!({
//!     "brand_rel": {"id": 3},
//!     "reviews_some": {"rating": 5}
//! })).unwrap();
//!
//! let analysis = analyzer.analyze(&tree, "Product").unwrap();
//! assert_eq!(analysis.select_related, vec!["brand"]);
//! assert_eq!(analysis.prefetch_related, vec!["reviews"]);
//! assert_eq!(analysis.cost, CostTier::Low);
//! ```

use graphfilter_schema::{Entity, EntityCatalog, Relation};
use indexmap::IndexSet;
use serde::Serialize;
use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::applicator::FilterApplicator;
use crate::ast::{FilterEntry, FilterNode};
use crate::config::FilterSettings;
use crate::error::{FilterError, FilterResult};
use crate::operators::{OperatorInfo, operators_for};
use crate::security;

// ============================================================================
// Cost model
// ============================================================================

const CLAUSE_POINTS: usize = 1;
const TRAVERSAL_POINTS: usize = 3;
const PROJECTION_POINTS: usize = 3;
const PATTERN_POINTS: usize = 5;
const HEAVY_POINTS: usize = 5;

const MEDIUM_THRESHOLD: usize = 10;
const HIGH_THRESHOLD: usize = 25;

/// Rough cost of running a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    /// Plain column predicates and a few joins.
    Low,
    /// Several traversals or projections.
    Medium,
    /// Many projections, patterns or ranking work.
    High,
}

impl CostTier {
    /// Tier for a point total.
    pub fn from_points(points: usize) -> Self {
        if points < MEDIUM_THRESHOLD {
            Self::Low
        } else if points < HIGH_THRESHOLD {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for CostTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a filter tree touches and what it will roughly cost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterAnalysis {
    /// Entity the tree was analyzed against.
    pub entity: String,
    /// To-one relation paths worth joining, `__`-separated.
    pub select_related: Vec<String>,
    /// To-many relation paths worth prefetching, `__`-separated.
    pub prefetch_related: Vec<String>,
    /// Clauses in the tree.
    pub clause_count: usize,
    /// Nesting depth of the tree.
    pub max_depth: usize,
    /// Projections the compiler will add.
    pub projection_count: usize,
    /// Pattern operators (`regex`, `iregex`).
    pub pattern_count: usize,
    /// Point total behind [`cost`](Self::cost).
    pub points: usize,
    /// Cost tier.
    pub cost: CostTier,
    /// Human-readable suggestions.
    pub hints: Vec<String>,
}

impl FilterAnalysis {
    /// Whether the tree needs anything beyond the base rows.
    pub fn touches_relations(&self) -> bool {
        !self.select_related.is_empty() || !self.prefetch_related.is_empty()
    }
}

#[derive(Debug, Default)]
struct Tally {
    select: IndexSet<String>,
    prefetch: IndexSet<String>,
    traversals: usize,
    heavy: usize,
    windows: usize,
    searches: usize,
}

/// Analyzes filter trees against a catalog.
#[derive(Clone)]
pub struct FilterAnalyzer {
    applicator: FilterApplicator,
    settings: FilterSettings,
}

impl fmt::Debug for FilterAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterAnalyzer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl FilterAnalyzer {
    /// Create an analyzer.
    pub fn new(catalog: Arc<dyn EntityCatalog>, settings: &FilterSettings) -> Self {
        Self {
            applicator: FilterApplicator::new(catalog, settings),
            settings: settings.clone(),
        }
    }

    /// Analyze a tree against the named entity.
    pub fn analyze(&self, tree: &FilterNode, entity: &str) -> FilterResult<FilterAnalysis> {
        let catalog = self.applicator.catalog();
        let base = catalog
            .entity(entity)
            .ok_or_else(|| FilterError::unknown_entity(entity))?;

        let mut tally = Tally::default();
        self.walk(tree, base, &[], &mut tally);

        let clause_count = security::clause_count(tree);
        let max_depth = security::max_depth(tree);
        let pattern_count = security::count_patterns(tree);
        let projection_count = self.applicator.collect_projections(tree, base).len();

        let points = clause_count * CLAUSE_POINTS
            + tally.traversals * TRAVERSAL_POINTS
            + projection_count * PROJECTION_POINTS
            + pattern_count * PATTERN_POINTS
            + tally.heavy * HEAVY_POINTS;
        let cost = CostTier::from_points(points);

        let hints = self.hints(&tally, clause_count, max_depth, pattern_count, cost);
        trace!(entity, points, cost = %cost, "filter analyzed");

        Ok(FilterAnalysis {
            entity: entity.to_string(),
            select_related: tally.select.into_iter().collect(),
            prefetch_related: tally.prefetch.into_iter().collect(),
            clause_count,
            max_depth,
            projection_count,
            pattern_count,
            points,
            cost,
            hints,
        })
    }

    fn walk(&self, node: &FilterNode, entity: &Entity, path: &[SmolStr], tally: &mut Tally) {
        let catalog = self.applicator.catalog();
        for (key, entry) in node.iter() {
            match entry {
                FilterEntry::And(nodes) | FilterEntry::Or(nodes) => {
                    for child in nodes {
                        self.walk(child, entity, path, tally);
                    }
                }
                FilterEntry::Not(child) => self.walk(child, entity, path, tally),
                FilterEntry::Related { relation, node }
                | FilterEntry::Quantified { relation, node, .. } => {
                    let Some((relation, target)) = resolve(catalog, entity, relation) else {
                        debug!(key, "unknown relation, not analyzed");
                        continue;
                    };
                    let inner = tally.visit(path, relation);
                    self.walk(node, target, &inner, tally);
                }
                FilterEntry::Exists(items) => {
                    for item in items {
                        let Some((relation, target)) = resolve(catalog, entity, &item.relation)
                        else {
                            continue;
                        };
                        let inner = tally.visit(path, relation);
                        if let Some(condition) = &item.condition {
                            self.walk(condition, target, &inner, tally);
                        }
                    }
                }
                FilterEntry::Aggregate(agg) => {
                    if let Some((relation, target)) = resolve(catalog, entity, &agg.relation) {
                        let inner = tally.visit(path, relation);
                        if let Some(condition) = &agg.condition {
                            self.walk(&condition.node, target, &inner, tally);
                        }
                    }
                }
                FilterEntry::Count { relation, .. } => {
                    if entity.has_field(key) {
                        continue;
                    }
                    if let Some((relation, _)) = resolve(catalog, entity, relation) {
                        tally.visit(path, relation);
                    }
                }
                FilterEntry::Subquery(items) => {
                    for item in items {
                        tally.heavy += 1;
                        if let Some((relation, _)) = resolve(catalog, entity, &item.relation) {
                            tally.visit(path, relation);
                        }
                    }
                }
                FilterEntry::Window(items) => {
                    tally.heavy += items.len();
                    tally.windows += items.len();
                }
                FilterEntry::Search(_) => {
                    tally.heavy += 1;
                    tally.searches += 1;
                }
                FilterEntry::Field { name, .. } => {
                    if entity.has_field(name) {
                        continue;
                    }
                    if let Some((relation, _)) = resolve(catalog, entity, name) {
                        tally.visit(path, relation);
                    }
                }
                FilterEntry::Id(_)
                | FilterEntry::Quick(_)
                | FilterEntry::Include(_)
                | FilterEntry::Compare(_)
                | FilterEntry::DateTrunc(_)
                | FilterEntry::DateExtract(_) => {}
            }
        }
    }

    fn hints(
        &self,
        tally: &Tally,
        clause_count: usize,
        max_depth: usize,
        pattern_count: usize,
        cost: CostTier,
    ) -> Vec<String> {
        let limits = &self.settings.limits;
        let mut hints = Vec::new();

        if !tally.select.is_empty() {
            hints.push(format!(
                "Join to-one relations in the base query: {}",
                tally.select.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if !tally.prefetch.is_empty() {
            hints.push(format!(
                "Index the foreign keys behind: {}",
                tally.prefetch.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if pattern_count > 0 {
            hints.push(format!(
                "{pattern_count} regex pattern(s) cannot use a b-tree index; prefer starts_with or icontains"
            ));
        }
        if tally.windows > 0 {
            hints.push("Window filters rank every base row before filtering".to_string());
        }
        if tally.searches > 0 {
            hints.push("Full-text search benefits from an index on the search vector".to_string());
        }
        if clause_count * 5 >= limits.max_clauses * 4 {
            hints.push(format!(
                "Clause count {clause_count} is close to the limit of {}",
                limits.max_clauses
            ));
        }
        if max_depth + 2 >= limits.max_filter_depth {
            hints.push(format!(
                "Nesting depth {max_depth} is close to the limit of {}",
                limits.max_filter_depth
            ));
        }
        if cost == CostTier::High {
            hints.push("Narrow the filter with an indexed field before the costly parts".to_string());
        }
        hints
    }
}

impl Tally {
    /// Record a traversal and return the extended path.
    fn visit(&mut self, path: &[SmolStr], relation: &Relation) -> Vec<SmolStr> {
        let mut inner = path.to_vec();
        inner.push(relation.name.clone());
        let joined = inner.iter().map(SmolStr::as_str).collect::<Vec<_>>().join("__");
        if relation.is_to_many() {
            self.traversals += 1;
            self.prefetch.insert(joined);
        } else {
            self.select.insert(joined);
        }
        inner
    }
}

fn resolve<'c>(
    catalog: &'c dyn EntityCatalog,
    entity: &'c Entity,
    name: &str,
) -> Option<(&'c Relation, &'c Entity)> {
    let relation = entity.get_relation(name)?;
    let target = catalog.entity(&relation.target)?;
    Some((relation, target))
}

// ============================================================================
// Operator catalog
// ============================================================================

/// Everything a client may put in a filter for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorCatalog {
    /// Entity name.
    pub entity: String,
    /// Scalar fields with their operators.
    pub fields: Vec<FieldOperators>,
    /// Relations with the keys they offer.
    pub relations: Vec<RelationKeys>,
    /// Keys that are not tied to a field or relation.
    pub special_keys: Vec<SpecialKey>,
}

impl OperatorCatalog {
    /// Look up a field entry.
    pub fn field(&self, name: &str) -> Option<&FieldOperators> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a relation entry.
    pub fn relation(&self, name: &str) -> Option<&RelationKeys> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Whether a special key is available.
    pub fn has_special_key(&self, key: &str) -> bool {
        self.special_keys.iter().any(|k| k.key == key)
    }
}

/// Operators of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldOperators {
    /// Field name.
    pub name: String,
    /// Field kind.
    pub kind: String,
    /// Whether the field can be null.
    pub nullable: bool,
    /// Allowed values, if constrained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    /// Operators valid on the field.
    pub operators: Vec<OperatorInfo>,
    /// Derived keys (`<field>_trunc`, `<field>_extract`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_keys: Vec<String>,
}

/// Keys offered by one relation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationKeys {
    /// Relation name.
    pub name: String,
    /// Target entity.
    pub target: String,
    /// `one` or `many`.
    pub cardinality: String,
    /// Filter keys, e.g. `reviews_some`.
    pub keys: Vec<String>,
}

/// A key not tied to a field or relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecialKey {
    /// The key.
    pub key: &'static str,
    /// What it does.
    pub description: &'static str,
}

const fn special(key: &'static str, description: &'static str) -> SpecialKey {
    SpecialKey { key, description }
}

/// Describe the keys and operators available on an entity's root filter.
pub fn describe_operators(entity: &Entity, settings: &FilterSettings) -> OperatorCatalog {
    let features = settings.features;
    let max = settings.schema.max_relation_depth;

    let fields = entity
        .fields
        .values()
        .filter(|field| features.array || !field.kind.is_array())
        .map(|field| {
            let mut extra_keys = Vec::new();
            if field.kind.is_temporal() {
                if features.date_trunc {
                    extra_keys.push(format!("{}_trunc", field.name));
                }
                if features.date_extract {
                    extra_keys.push(format!("{}_extract", field.name));
                }
            }
            FieldOperators {
                name: field.name.to_string(),
                kind: field.kind.as_str().to_string(),
                nullable: field.nullable,
                choices: field.choices.clone(),
                operators: operators_for(&field.kind),
                extra_keys,
            }
        })
        .collect();

    let relations = if max > 0 {
        entity
            .relations
            .values()
            .map(|relation| relation_keys(entity, relation, max, settings))
            .collect()
    } else {
        Vec::new()
    };

    let mut special_keys = vec![
        special("id", "Filter on the primary key"),
        special("quick", "Case-insensitive text match across the quick-search fields"),
        special("include", "Identifiers always part of the result"),
        special("AND", "Every nested filter matches"),
        special("OR", "At least one nested filter matches"),
        special("NOT", "The nested filter does not match"),
        special("_compare", "Compare two fields of the same row"),
    ];
    if features.window {
        special_keys.push(special("_window", "Filter on a window function result"));
    }
    if max > 0 && features.subquery {
        special_keys.push(special("_subquery", "Filter on a value looked up in related rows"));
    }
    if max > 0 && features.exists {
        special_keys.push(special("_exists", "Test whether related rows exist"));
    }
    if features.full_text {
        special_keys.push(special("search", "Full-text search over the search fields"));
    }

    OperatorCatalog {
        entity: entity.name.to_string(),
        fields,
        relations,
        special_keys,
    }
}

fn relation_keys(
    entity: &Entity,
    relation: &Relation,
    max: usize,
    settings: &FilterSettings,
) -> RelationKeys {
    let name = &relation.name;
    let nested = 1 < max;
    let mut keys = vec![name.to_string()];

    if relation.is_to_one() {
        if nested {
            keys.push(format!("{name}_rel"));
        }
    } else {
        keys.push(format!("{name}_agg"));
        let count_key = format!("{name}_count");
        if !entity.has_field(&count_key) {
            keys.push(count_key);
        }
        if nested {
            if settings.features.conditional_aggregation {
                keys.push(format!("{name}_cond_agg"));
            }
            for suffix in ["some", "every", "none"] {
                keys.push(format!("{name}_{suffix}"));
            }
        }
    }

    RelationKeys {
        name: name.to_string(),
        target: relation.target.to_string(),
        cardinality: if relation.is_to_one() { "one" } else { "many" }.to_string(),
        keys,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphfilter_schema::{Catalog, Field, FieldKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_entity(
                Entity::new("Product")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("name", FieldKind::Text))
                    .field(Field::new("status", FieldKind::Text).with_choices(["draft", "live"]))
                    .field(Field::new("created_at", FieldKind::DateTime))
                    .field(Field::new("tags", FieldKind::Array(Box::new(FieldKind::Text))))
                    .relation(Relation::to_one("brand", "Brand"))
                    .relation(Relation::to_many("reviews", "Review")),
            )
            .with_entity(
                Entity::new("Brand")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("name", FieldKind::Text))
                    .relation(Relation::to_one("country", "Country")),
            )
            .with_entity(
                Entity::new("Country")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("code", FieldKind::Text)),
            )
            .with_entity(
                Entity::new("Review")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("rating", FieldKind::Int))
                    .field(Field::new("body", FieldKind::Text))
                    .relation(Relation::to_one("author", "User")),
            )
            .with_entity(
                Entity::new("User")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("email", FieldKind::Text)),
            )
    }

    fn analyzer(settings: FilterSettings) -> FilterAnalyzer {
        FilterAnalyzer::new(Arc::new(catalog()), &settings)
    }

    fn analyze(tree: serde_json::Value) -> FilterAnalysis {
        let tree = FilterNode::parse(&tree).unwrap();
        analyzer(FilterSettings::all_features())
            .analyze(&tree, "Product")
            .unwrap()
    }

    #[test]
    fn test_plain_filter_is_low_cost() {
        let analysis = analyze(json!({"name": {"icontains": "lamp"}}));
        assert_eq!(analysis.clause_count, 1);
        assert_eq!(analysis.cost, CostTier::Low);
        assert!(!analysis.touches_relations());
        assert!(analysis.hints.is_empty());
    }

    #[test]
    fn test_relation_paths() {
        let analysis = analyze(json!({
            "brand_rel": {"country_rel": {"code": "DE"}},
            "reviews_some": {"author_rel": {"email": {"iends_with": "@example.com"}}},
            "OR": [{"reviews_count": {"gt": 2}}, {"brand": 4}]
        }));
        assert_eq!(analysis.select_related, vec!["brand", "brand__country", "reviews__author"]);
        assert_eq!(analysis.prefetch_related, vec!["reviews"]);
    }

    #[test]
    fn test_exists_and_aggregate_relations() {
        let analysis = analyze(json!({
            "_exists": [{"relation": "reviews", "condition": {"author_rel": {"id": 1}}}],
            "reviews_agg": {"field": "rating", "avg": {"gte": 4}}
        }));
        assert_eq!(analysis.prefetch_related, vec!["reviews"]);
        assert_eq!(analysis.select_related, vec!["reviews__author"]);
        assert_eq!(analysis.projection_count, 1);
    }

    #[test]
    fn test_heavy_filter_is_high_cost() {
        let analysis = analyze(json!({
            "name": {"iregex": "^l(a|o)mp"},
            "search": {"query": "desk lamp", "min_rank": 0.1},
            "_window": [{"function": "rank", "order_by": ["-created_at"], "filter": {"lte": 3}}],
            "reviews_agg": {"field": "rating", "avg": {"gte": 4}, "count": {"gt": 3}},
            "reviews_count": {"gt": 1}
        }));
        assert_eq!(analysis.pattern_count, 1);
        assert_eq!(analysis.cost, CostTier::High);
        assert!(analysis.points >= HIGH_THRESHOLD);
        assert!(analysis.hints.iter().any(|h| h.contains("regex")));
        assert!(analysis.hints.iter().any(|h| h.starts_with("Window filters")));
        assert!(analysis.hints.iter().any(|h| h.starts_with("Narrow the filter")));
    }

    #[test]
    fn test_unknown_entity() {
        let tree = FilterNode::parse(&json!({})).unwrap();
        let err = analyzer(FilterSettings::default())
            .analyze(&tree, "Missing")
            .unwrap_err();
        assert!(err.to_string().contains("Missing"));
    }

    #[test]
    fn test_unknown_relation_ignored() {
        let analysis = analyze(json!({"ghost_some": {"id": 1}}));
        assert!(!analysis.touches_relations());
    }

    #[test]
    fn test_cost_tiers() {
        assert_eq!(CostTier::from_points(0), CostTier::Low);
        assert_eq!(CostTier::from_points(9), CostTier::Low);
        assert_eq!(CostTier::from_points(10), CostTier::Medium);
        assert_eq!(CostTier::from_points(25), CostTier::High);
        assert!(CostTier::Low < CostTier::High);
    }

    #[test]
    fn test_describe_default_features() {
        let catalog = catalog();
        let product = catalog.entity("Product").unwrap();
        let described = describe_operators(product, &FilterSettings::default());

        assert!(described.field("tags").is_none());
        let status = described.field("status").unwrap();
        assert_eq!(status.choices, Some(vec!["draft".to_string(), "live".to_string()]));
        assert!(status.operators.iter().any(|op| op.name == "icontains"));
        assert!(described.field("created_at").unwrap().extra_keys.is_empty());

        assert_eq!(described.relation("brand").unwrap().keys, vec!["brand", "brand_rel"]);
        assert_eq!(
            described.relation("reviews").unwrap().keys,
            vec!["reviews", "reviews_agg", "reviews_count", "reviews_some", "reviews_every", "reviews_none"]
        );
        assert!(described.has_special_key("_compare"));
        assert!(!described.has_special_key("_window"));
    }

    #[test]
    fn test_describe_all_features() {
        let catalog = catalog();
        let product = catalog.entity("Product").unwrap();
        let described = describe_operators(product, &FilterSettings::all_features());

        assert!(described.field("tags").is_some());
        assert_eq!(
            described.field("created_at").unwrap().extra_keys,
            vec!["created_at_trunc", "created_at_extract"]
        );
        assert!(described.relation("reviews").unwrap().keys.contains(&"reviews_cond_agg".to_string()));
        for key in ["_window", "_subquery", "_exists", "search"] {
            assert!(described.has_special_key(key), "{key}");
        }
    }

    #[test]
    fn test_describe_without_relations() {
        let catalog = catalog();
        let product = catalog.entity("Product").unwrap();
        let settings = FilterSettings::all_features().with_max_relation_depth(0);
        let described = describe_operators(product, &settings);
        assert!(described.relations.is_empty());
        assert!(!described.has_special_key("_exists"));
        assert!(described.has_special_key("search"));
    }

    #[test]
    fn test_describe_serializes() {
        let catalog = catalog();
        let brand = catalog.entity("Brand").unwrap();
        let value = serde_json::to_value(describe_operators(brand, &FilterSettings::default())).unwrap();
        assert_eq!(value["entity"], json!("Brand"));
        assert_eq!(value["relations"][0]["cardinality"], json!("one"));
        assert_eq!(value["fields"][0]["name"], json!("id"));
    }
}
