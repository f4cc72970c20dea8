//! Filter compilation.
//!
//! A filter tree is compiled in two phases against an entity:
//!
//! 1. [`collect_projections`](FilterApplicator::collect_projections) walks the
//!    whole tree and gathers every named projection (aggregates, counts,
//!    subqueries, windows, date parts, search vectors) into a [`ProjectionSet`].
//! 2. [`build_predicate`](FilterApplicator::build_predicate) walks the tree
//!    again and builds the boolean [`Predicate`], referring to projections by
//!    the [`ProjectionRef`](crate::projection::ProjectionRef) handles the set
//!    hands out for the same [`ProjectionKey`].
//!
//! Both phases share the resolution rules in this module, so a key either
//! contributes in both phases or in neither.
//!
//! ```rust
//! use graphfilter_query::applicator::FilterApplicator;
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
//!             .relation(Relation::to_many("reviews", "Review")),
//!     )
//!     .with_entity(
//!         Entity::new("Review")
//!             .field(Field::new("id", FieldKind::Id))
//!             .field(Field::new("rating", FieldKind::Int)),
//!     );
//!
//! let applicator = FilterApplicator::new(Arc::new(catalog), &FilterSettings::default());
//! let tree = FilterNode::parse(&json!({
//!     "reviews_agg": {"field": "rating", "avg": {"gte": 4.0}}
//! })).unwrap();
//!
//! let compiled = applicator.compile(&tree, "Product").unwrap();
//! assert_eq!(compiled.projections.names(), vec!["reviews_agg_rating_avg"]);
//! assert_eq!(
//!     compiled.predicate.unwrap().to_string(),
//!     "reviews_agg_rating_avg >= 4.0"
//! );
//! ```

mod collect;
mod predicate;

use chrono::{DateTime, Utc};
use graphfilter_schema::{Entity, EntityCatalog, FieldKind, Relation};
use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::aggregate::AggregateFunction;
use crate::ast::{
    AggregationFilter, DateExtractFilter, DateTruncFilter, ExistsFilter, FilterNode,
    SearchFilter, SubqueryFilter, WindowFilter,
};
use crate::config::FilterSettings;
use crate::error::{FilterError, FilterResult};
use crate::expr::{FieldPath, Predicate, RelationPath};
use crate::projection::{ProjectionKey, ProjectionSet};
use crate::security::SecurityValidator;

/// The executable result of compiling a filter tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    /// Projections to add to the base query, in first-use order.
    pub projections: ProjectionSet,
    /// The row predicate. `None` means the tree does not constrain the query.
    pub predicate: Option<Predicate>,
}

impl CompiledFilter {
    /// Check if compiling produced nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.projections.is_empty() && self.predicate.is_none()
    }
}

impl fmt::Display for CompiledFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for projection in self.projections.iter() {
            write!(f, "{} = {}", projection.name(), projection.expr)?;
            if projection.scope.is_empty() {
                writeln!(f)?;
            } else {
                writeln!(f, " FOR EACH {}", projection.scope)?;
            }
        }
        match &self.predicate {
            Some(predicate) => write!(f, "WHERE {}", predicate),
            None => write!(f, "WHERE TRUE"),
        }
    }
}

/// The query engine side of compilation.
///
/// `annotate` adds named projections to the query, `filter` restricts its
/// rows. Both consume and return the query, so an adapter can wrap an
/// immutable query builder.
pub trait QueryAdapter: Sized {
    /// Add the projections.
    fn annotate(self, projections: &ProjectionSet) -> Self;

    /// Restrict the rows.
    fn filter(self, predicate: &Predicate) -> Self;
}

/// Compiles filter trees against an entity catalog.
///
/// Shared between requests; holds no per-request state.
#[derive(Clone)]
pub struct FilterApplicator {
    catalog: Arc<dyn EntityCatalog>,
    settings: FilterSettings,
    validator: SecurityValidator,
}

impl fmt::Debug for FilterApplicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterApplicator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl FilterApplicator {
    /// Create an applicator.
    pub fn new(catalog: Arc<dyn EntityCatalog>, settings: &FilterSettings) -> Self {
        Self {
            catalog,
            settings: settings.clone(),
            validator: SecurityValidator::new(&settings.limits),
        }
    }

    /// The settings in use.
    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    /// The catalog in use.
    pub fn catalog(&self) -> &dyn EntityCatalog {
        self.catalog.as_ref()
    }

    /// Validate and compile a tree, resolving temporal shortcuts against the current time.
    pub fn compile(&self, tree: &FilterNode, entity: &str) -> FilterResult<CompiledFilter> {
        self.compile_at(tree, entity, Utc::now())
    }

    /// Validate and compile a tree with a pinned clock.
    pub fn compile_at(
        &self,
        tree: &FilterNode,
        entity: &str,
        now: DateTime<Utc>,
    ) -> FilterResult<CompiledFilter> {
        let base = self
            .catalog
            .entity(entity)
            .ok_or_else(|| FilterError::unknown_entity(entity))?;

        self.validator
            .validate(tree)
            .map_err(|e| FilterError::from(e).with_entity(entity))?;

        let compiler = Compiler::new(self, now);
        trace!(entity, "collecting projections");
        let projections = compiler.collect(tree, base);
        trace!(entity, projections = projections.len(), "building predicate");
        let predicate = compiler.predicate(tree, base, &projections);
        trace!(
            entity,
            nodes = predicate.as_ref().map_or(0, Predicate::node_count),
            "filter compiled"
        );

        Ok(CompiledFilter {
            projections,
            predicate,
        })
    }

    /// Phase one: every projection the tree needs.
    pub fn collect_projections(&self, tree: &FilterNode, entity: &Entity) -> ProjectionSet {
        Compiler::new(self, Utc::now()).collect(tree, entity)
    }

    /// Phase two: the row predicate over projections collected from the same tree.
    pub fn build_predicate(
        &self,
        tree: &FilterNode,
        entity: &Entity,
        projections: &ProjectionSet,
        now: DateTime<Utc>,
    ) -> Option<Predicate> {
        Compiler::new(self, now).predicate(tree, entity, projections)
    }

    /// Compile a tree and apply it to a query.
    pub fn apply<A: QueryAdapter>(
        &self,
        adapter: A,
        tree: &FilterNode,
        entity: &str,
    ) -> FilterResult<A> {
        let compiled = self.compile(tree, entity)?;
        Ok(apply_compiled(adapter, &compiled))
    }
}

/// Apply an already compiled filter: projections first, then the predicate.
pub fn apply_compiled<A: QueryAdapter>(adapter: A, compiled: &CompiledFilter) -> A {
    let mut adapter = adapter;
    if !compiled.projections.is_empty() {
        adapter = adapter.annotate(&compiled.projections);
    }
    if let Some(predicate) = &compiled.predicate {
        adapter = adapter.filter(predicate);
    }
    adapter
}

/// Where a node is being compiled.
///
/// `base_path` is the relation path from the base entity and names
/// projections; `field_prefix` is the path field references are written
/// relative to. `_rel` extends both. A quantifier opens a new row scope, so
/// it extends `base_path` and resets `field_prefix`. `field_prefix` is always
/// a suffix of `base_path`.
#[derive(Debug, Clone)]
pub(crate) struct Scope<'a> {
    pub(crate) entity: &'a Entity,
    pub(crate) base_path: RelationPath,
    pub(crate) field_prefix: RelationPath,
    pub(crate) depth: usize,
}

impl<'a> Scope<'a> {
    fn root(entity: &'a Entity) -> Self {
        Self {
            entity,
            base_path: RelationPath::root(),
            field_prefix: RelationPath::root(),
            depth: 0,
        }
    }

    /// Scope of a `_rel` node.
    fn joined(&self, relation: &str, target: &'a Entity) -> Self {
        Self {
            entity: target,
            base_path: self.base_path.join(relation),
            field_prefix: self.field_prefix.join(relation),
            depth: self.depth + 1,
        }
    }

    /// Scope of a node evaluated per related row.
    fn related_rows(&self, relation: &str, target: &'a Entity) -> Self {
        Self {
            entity: target,
            base_path: self.base_path.join(relation),
            field_prefix: RelationPath::root(),
            depth: self.depth + 1,
        }
    }

    fn field_path(&self, field: &str) -> FieldPath {
        FieldPath::under(&self.field_prefix, field)
    }

    fn relation_path(&self, relation: &str) -> RelationPath {
        self.field_prefix.join(relation)
    }

    /// Path from the base row to the rows this scope tests: `base_path`
    /// without the joined hops in `field_prefix`.
    fn row_path(&self) -> RelationPath {
        self.base_path
            .prefix(self.base_path.len() - self.field_prefix.len())
    }

    /// True until a quantifier or existence scope has been entered.
    fn is_base_row(&self) -> bool {
        self.base_path == self.field_prefix
    }
}

/// A projection a key resolves to, with the kind of its value.
#[derive(Debug, Clone)]
pub(crate) struct Planned {
    pub(crate) key: ProjectionKey,
    pub(crate) kind: FieldKind,
}

/// One compile run. Holds the clock so both phases see the same `now`.
pub(crate) struct Compiler<'a> {
    catalog: &'a dyn EntityCatalog,
    settings: &'a FilterSettings,
    now: DateTime<Utc>,
}

impl<'a> Compiler<'a> {
    fn new(applicator: &'a FilterApplicator, now: DateTime<Utc>) -> Self {
        Self {
            catalog: applicator.catalog.as_ref(),
            settings: &applicator.settings,
            now,
        }
    }

    fn max_depth(&self) -> usize {
        self.settings.schema.max_relation_depth
    }

    /// Resolve a relation of the scope's entity, with a minimum cardinality check.
    fn relation(&self, scope: &Scope<'a>, name: &str) -> Option<(&'a Relation, &'a Entity)> {
        let Some(relation) = scope.entity.get_relation(name) else {
            debug!(entity = %scope.entity.name, relation = name, "unknown relation, skipping");
            return None;
        };
        let Some(target) = self.catalog.entity(&relation.target) else {
            debug!(
                relation = name,
                target = %relation.target,
                "relation target not in catalog, skipping"
            );
            return None;
        };
        Some((relation, target))
    }

    /// A to-many relation usable from this scope (`depth < max`).
    fn to_many(&self, scope: &Scope<'a>, name: &str) -> Option<&'a Entity> {
        if scope.depth >= self.max_depth() {
            debug!(relation = name, depth = scope.depth, "relation depth limit reached, skipping");
            return None;
        }
        let (relation, target) = self.relation(scope, name)?;
        if !relation.is_to_many() {
            debug!(relation = name, "expected a to-many relation, skipping");
            return None;
        }
        Some(target)
    }

    /// Whether a nested scope one relation deeper is allowed.
    fn can_nest(&self, scope: &Scope<'_>, key: &str) -> bool {
        let allowed = scope.depth + 1 < self.max_depth();
        if !allowed {
            debug!(key, depth = scope.depth, "nested filter beyond relation depth limit, skipping");
        }
        allowed
    }

    fn gate(&self, enabled: bool, key: &str) -> bool {
        if !enabled {
            debug!(key, "feature disabled, skipping");
        }
        enabled
    }

    fn plan_aggregate(
        &self,
        scope: &Scope<'a>,
        agg: &AggregationFilter,
        function: AggregateFunction,
    ) -> Option<(Planned, &'a Entity)> {
        let target = self.to_many(scope, &agg.relation)?;
        if agg.condition.is_some()
            && (!self.gate(self.settings.features.conditional_aggregation, "_cond_agg")
                || !self.can_nest(scope, "_cond_agg"))
        {
            return None;
        }

        let field_kind = match &agg.field {
            Some(field) => {
                let Some(field) = target.get_field(field) else {
                    debug!(relation = %agg.relation, field = %field, "unknown aggregate field, skipping");
                    return None;
                };
                if function.requires_numeric() && !field.kind.is_numeric() {
                    debug!(
                        field = %field.name,
                        function = function.as_str(),
                        "aggregate needs a numeric field, skipping"
                    );
                    return None;
                }
                Some(field.kind.clone())
            }
            None if function.allows_no_field() => None,
            None => {
                debug!(function = function.as_str(), "aggregate needs a field, skipping");
                return None;
            }
        };

        let kind = match function {
            f if f.is_count() => FieldKind::Int,
            AggregateFunction::Avg => FieldKind::Float,
            _ => field_kind.unwrap_or(FieldKind::Float),
        };
        let relation = scope.base_path.join(agg.relation.clone());
        let key = match &agg.condition {
            Some(condition) => ProjectionKey::ConditionalAggregate {
                relation,
                field: agg.field.clone(),
                function,
                fingerprint: condition.fingerprint,
            },
            None => ProjectionKey::Aggregate {
                relation,
                field: agg.field.clone(),
                function,
            },
        };
        Some((Planned { key, kind }, target))
    }

    fn plan_count(&self, scope: &Scope<'a>, relation: &str) -> Option<Planned> {
        self.to_many(scope, relation)?;
        Some(Planned {
            key: ProjectionKey::Count {
                relation: scope.base_path.join(relation),
            },
            kind: FieldKind::Int,
        })
    }

    fn plan_window(&self, scope: &Scope<'a>, window: &WindowFilter) -> Option<Planned> {
        if !self.gate(self.settings.features.window, "_window") {
            return None;
        }
        if !scope.base_path.is_empty() {
            debug!("window filters only apply to the base entity, skipping");
            return None;
        }
        let fields = window
            .partition_by
            .iter()
            .chain(window.order_by.iter().map(|key| &key.field));
        for field in fields {
            if !scope.entity.has_field(field) {
                debug!(field = %field, "unknown window field, skipping");
                return None;
            }
        }
        let kind = if window.function.is_fractional() {
            FieldKind::Float
        } else {
            FieldKind::Int
        };
        Some(Planned {
            key: ProjectionKey::Window {
                path: scope.base_path.clone(),
                function: window.function,
                spec: window.spec(),
            },
            kind,
        })
    }

    fn plan_subquery(&self, scope: &Scope<'a>, subquery: &SubqueryFilter) -> Option<Planned> {
        if !self.gate(self.settings.features.subquery, "_subquery") {
            return None;
        }
        let target = self.to_many(scope, &subquery.relation)?;
        let Some(field) = target.get_field(&subquery.field) else {
            debug!(field = %subquery.field, "unknown subquery field, skipping");
            return None;
        };
        if let Some(key) = subquery.order_by.iter().find(|key| !target.has_field(&key.field)) {
            debug!(field = %key.field, "unknown subquery ordering field, skipping");
            return None;
        }
        Some(Planned {
            key: ProjectionKey::Subquery {
                relation: scope.base_path.join(subquery.relation.clone()),
                field: subquery.field.clone(),
                order_by: subquery.order_by.clone(),
            },
            kind: field.kind.clone(),
        })
    }

    /// A temporal field of the scope's entity, readable per base row.
    fn temporal_field(&self, scope: &Scope<'a>, field: &str) -> Option<FieldKind> {
        if !scope.is_base_row() {
            debug!(field, "date functions inside related-row scopes are not supported, skipping");
            return None;
        }
        match scope.entity.get_field(field) {
            Some(f) if f.kind.is_temporal() => Some(f.kind.clone()),
            _ => {
                debug!(field, "expected a date or datetime field, skipping");
                None
            }
        }
    }

    fn plan_trunc(&self, scope: &Scope<'a>, trunc: &DateTruncFilter) -> Option<Planned> {
        if !self.gate(self.settings.features.date_trunc, "_trunc") {
            return None;
        }
        let kind = self.temporal_field(scope, &trunc.field)?;
        Some(Planned {
            key: ProjectionKey::DateTrunc {
                path: scope.base_path.clone(),
                field: trunc.field.clone(),
                kind: trunc.kind,
            },
            kind,
        })
    }

    fn plan_extract(&self, scope: &Scope<'a>, extract: &DateExtractFilter) -> Option<Planned> {
        if !self.gate(self.settings.features.date_extract, "_extract") {
            return None;
        }
        let kind = self.temporal_field(scope, &extract.field)?;
        if extract.part.needs_time() && !kind.has_time() {
            debug!(field = %extract.field, part = extract.part.as_str(), "time part of a date field, skipping");
            return None;
        }
        Some(Planned {
            key: ProjectionKey::DateExtract {
                path: scope.base_path.clone(),
                field: extract.field.clone(),
                part: extract.part,
            },
            kind: FieldKind::Int,
        })
    }

    /// The vector and optional rank projections of a search entry.
    fn plan_search(&self, scope: &Scope<'a>, search: &SearchFilter) -> Option<SearchPlan> {
        if !self.gate(self.settings.features.full_text, "search") {
            return None;
        }
        if !scope.is_base_row() {
            debug!("search inside related-row scopes is not supported, skipping");
            return None;
        }
        if search.query.trim().is_empty() {
            debug!("empty search query, skipping");
            return None;
        }
        let fields: Vec<SmolStr> = if search.fields.is_empty() {
            scope
                .entity
                .full_text_fields()
                .into_iter()
                .map(|f| f.name.clone())
                .collect()
        } else {
            let valid = search
                .fields
                .iter()
                .all(|name| scope.entity.get_field(name).is_some_and(|f| f.kind.is_text()));
            if !valid {
                debug!("search over unknown or non-text fields, skipping");
                return None;
            }
            search.fields.clone()
        };
        if fields.is_empty() {
            debug!(entity = %scope.entity.name, "entity has no searchable fields, skipping");
            return None;
        }

        let config = search
            .config
            .clone()
            .unwrap_or_else(|| self.settings.search.config.clone());
        let vector = ProjectionKey::SearchVector {
            path: scope.base_path.clone(),
            fields: fields.clone(),
            config: SmolStr::new(&config),
        };
        let rank = search.min_rank.map(|_| ProjectionKey::SearchRank {
            path: scope.base_path.clone(),
            query: search.query.clone(),
            mode: search.mode,
        });
        Some(SearchPlan {
            vector,
            rank,
            fields,
            config,
        })
    }

    /// Scope of a `<rel>_rel` node: a to-one relation joined into the current row.
    fn joined_scope(&self, scope: &Scope<'a>, key: &str, relation: &str) -> Option<Scope<'a>> {
        if !self.can_nest(scope, key) {
            return None;
        }
        let (rel, target) = self.relation(scope, relation)?;
        if !rel.is_to_one() {
            debug!(key, "`_rel` needs a to-one relation, skipping");
            return None;
        }
        Some(scope.joined(relation, target))
    }

    /// Scope of a quantified node: one row of a to-many relation.
    fn rows_scope(&self, scope: &Scope<'a>, key: &str, relation: &str) -> Option<Scope<'a>> {
        if !self.can_nest(scope, key) {
            return None;
        }
        let (rel, target) = self.relation(scope, relation)?;
        if !rel.is_to_many() {
            debug!(key, "quantifiers need a to-many relation, skipping");
            return None;
        }
        Some(scope.related_rows(relation, target))
    }

    /// Target of an `_exists` item and the scope of its condition, if any.
    fn exists_scope(
        &self,
        scope: &Scope<'a>,
        item: &ExistsFilter,
    ) -> Option<(&'a Entity, Option<Scope<'a>>)> {
        if !self.gate(self.settings.features.exists, "_exists") {
            return None;
        }
        if scope.depth >= self.max_depth() {
            debug!(relation = %item.relation, "relation depth limit reached, skipping");
            return None;
        }
        let (_, target) = self.relation(scope, &item.relation)?;
        match &item.condition {
            Some(_) if !self.can_nest(scope, "_exists") => None,
            Some(_) => Some((target, Some(scope.related_rows(&item.relation, target)))),
            None => Some((target, None)),
        }
    }
}

/// Projection keys of a search entry.
#[derive(Debug, Clone)]
pub(crate) struct SearchPlan {
    pub(crate) vector: ProjectionKey,
    pub(crate) rank: Option<ProjectionKey>,
    pub(crate) fields: Vec<SmolStr>,
    pub(crate) config: String,
}
