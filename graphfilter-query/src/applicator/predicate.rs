//! Phase two: predicate building.

use graphfilter_schema::{Entity, FieldKind};
use tracing::debug;

use super::{Compiler, Planned, Scope};
use crate::ast::{
    ExistsFilter, FieldComparison, FilterEntry, FilterNode, LeafFilter, Quantifier, SearchFilter,
};
use crate::expr::{CompareOp, FieldPath, Operand, Predicate, TextMatch};
use crate::operators::leaf_predicate;
use crate::projection::ProjectionSet;

impl<'a> Compiler<'a> {
    pub(super) fn predicate(
        &self,
        tree: &FilterNode,
        entity: &'a Entity,
        projections: &ProjectionSet,
    ) -> Option<Predicate> {
        self.predicate_in(tree, &Scope::root(entity), projections)
    }

    /// The predicate of one node: the AND of its entries, widened by `include`.
    pub(super) fn predicate_in(
        &self,
        node: &FilterNode,
        scope: &Scope<'a>,
        projections: &ProjectionSet,
    ) -> Option<Predicate> {
        let mut parts = Vec::with_capacity(node.len());
        let mut include = None;
        for (key, entry) in node.iter() {
            if let FilterEntry::Include(values) = entry {
                include = Some(values);
                continue;
            }
            if let Some(predicate) = self.entry(key, entry, scope, projections) {
                parts.push(predicate);
            }
        }

        let rest = Predicate::and(parts)?;
        match include {
            Some(values) if !values.is_empty() => {
                let pk = Operand::Field(scope.field_path(&scope.entity.primary_key));
                Predicate::or([
                    rest,
                    Predicate::In {
                        operand: pk,
                        values: values.clone(),
                        negated: false,
                    },
                ])
            }
            _ => Some(rest),
        }
    }

    fn entry(
        &self,
        key: &str,
        entry: &FilterEntry,
        scope: &Scope<'a>,
        projections: &ProjectionSet,
    ) -> Option<Predicate> {
        match entry {
            FilterEntry::And(nodes) => Predicate::and(
                nodes
                    .iter()
                    .filter_map(|child| self.predicate_in(child, scope, projections)),
            ),
            FilterEntry::Or(nodes) => Predicate::or(
                nodes
                    .iter()
                    .filter_map(|child| self.predicate_in(child, scope, projections)),
            ),
            FilterEntry::Not(child) => self.predicate_in(child, scope, projections).map(Predicate::not),
            FilterEntry::Id(leaf) => {
                let pk = &scope.entity.primary_key;
                let kind = scope
                    .entity
                    .primary_key_field()
                    .map_or(FieldKind::Id, |f| f.kind.clone());
                leaf_predicate(leaf, &Operand::Field(scope.field_path(pk)), &kind, self.now)
            }
            FilterEntry::Quick(text) => self.quick(scope, text),
            FilterEntry::Include(_) => None,
            FilterEntry::Search(search) => self.search(scope, search, projections),
            FilterEntry::Window(items) => Predicate::and(items.iter().filter_map(|window| {
                let planned = self.plan_window(scope, window)?;
                self.projected(projections, &planned, &window.filter)
            })),
            FilterEntry::Subquery(items) => Predicate::and(items.iter().filter_map(|subquery| {
                let planned = self.plan_subquery(scope, subquery)?;
                self.projected(projections, &planned, &subquery.filter)
            })),
            FilterEntry::Exists(items) => Predicate::and(
                items
                    .iter()
                    .filter_map(|item| self.exists(scope, item, projections)),
            ),
            FilterEntry::Compare(items) => {
                Predicate::and(items.iter().filter_map(|cmp| self.compare(scope, cmp)))
            }
            FilterEntry::Related { relation, node } => {
                let inner = self.joined_scope(scope, key, relation)?;
                self.predicate_in(node, &inner, projections)
            }
            FilterEntry::Quantified {
                relation,
                quantifier,
                node,
            } => {
                let inner = self.rows_scope(scope, key, relation)?;
                let nested = self.predicate_in(node, &inner, projections);
                let path = scope.relation_path(relation);
                let target = inner.entity.name.clone();
                Some(match quantifier {
                    Quantifier::Some => Predicate::exists(path, target, nested),
                    Quantifier::None => Predicate::not(Predicate::exists(path, target, nested)),
                    Quantifier::Every => {
                        let non_empty = Predicate::exists(path.clone(), target.clone(), None);
                        match nested {
                            Some(nested) => non_empty.and_then(Predicate::not(Predicate::exists(
                                path,
                                target,
                                Some(Predicate::not(nested)),
                            ))),
                            None => non_empty,
                        }
                    }
                })
            }
            FilterEntry::Aggregate(agg) => {
                Predicate::and(agg.functions.iter().filter_map(|(function, leaf)| {
                    let (planned, _) = self.plan_aggregate(scope, agg, *function)?;
                    self.projected(projections, &planned, leaf)
                }))
            }
            FilterEntry::Count { relation, leaf } => {
                if scope.entity.has_field(key) {
                    return self.field(scope, key, leaf);
                }
                let planned = self.plan_count(scope, relation)?;
                self.projected(projections, &planned, leaf)
            }
            FilterEntry::DateTrunc(trunc) => {
                let planned = self.plan_trunc(scope, trunc)?;
                self.projected(projections, &planned, &trunc.filter)
            }
            FilterEntry::DateExtract(extract) => {
                let planned = self.plan_extract(scope, extract)?;
                self.projected(projections, &planned, &extract.filter)
            }
            FilterEntry::Field { name, leaf } => self.field(scope, name, leaf),
        }
    }

    /// A leaf on a projection collected in phase one.
    fn projected(
        &self,
        projections: &ProjectionSet,
        planned: &Planned,
        leaf: &LeafFilter,
    ) -> Option<Predicate> {
        let Some(handle) = projections.lookup(&planned.key) else {
            debug!(projection = %planned.key.name(), "projection was not collected, skipping");
            return None;
        };
        leaf_predicate(leaf, &Operand::Projection(handle), &planned.kind, self.now)
    }

    /// A leaf on a scalar field, or the identifier filter of a relation.
    fn field(&self, scope: &Scope<'a>, name: &str, leaf: &LeafFilter) -> Option<Predicate> {
        if let Some(field) = scope.entity.get_field(name) {
            if field.kind.is_array() && !self.gate(self.settings.features.array, name) {
                return None;
            }
            let target = Operand::Field(scope.field_path(name));
            return leaf_predicate(leaf, &target, &field.kind, self.now);
        }

        if scope.entity.get_relation(name).is_none() {
            debug!(entity = %scope.entity.name, key = name, "unknown field, skipping");
            return None;
        }
        if scope.depth >= self.max_depth() {
            debug!(relation = name, depth = scope.depth, "relation depth limit reached, skipping");
            return None;
        }
        let (relation, target) = self.relation(scope, name)?;
        let kind = target
            .primary_key_field()
            .map_or(FieldKind::Id, |f| f.kind.clone());
        let path = scope.relation_path(name);

        if relation.is_to_one() {
            let operand = Operand::Field(FieldPath::under(&path, target.primary_key.clone()));
            leaf_predicate(leaf, &operand, &kind, self.now)
        } else {
            let operand = Operand::field(target.primary_key.clone());
            let inner = leaf_predicate(leaf, &operand, &kind, self.now)?;
            Some(Predicate::exists(path, target.name.clone(), Some(inner)))
        }
    }

    fn quick(&self, scope: &Scope<'a>, text: &str) -> Option<Predicate> {
        let text = text.trim();
        if text.is_empty() {
            debug!("empty quick search, skipping");
            return None;
        }
        let fields = scope.entity.quick_search_fields();
        if fields.is_empty() {
            debug!(entity = %scope.entity.name, "entity has no quick search fields, skipping");
        }
        Predicate::or(fields.into_iter().map(|field| Predicate::Text {
            operand: Operand::Field(scope.field_path(&field.name)),
            kind: TextMatch::Contains,
            value: text.to_string(),
            case_insensitive: true,
        }))
    }

    fn search(
        &self,
        scope: &Scope<'a>,
        search: &SearchFilter,
        projections: &ProjectionSet,
    ) -> Option<Predicate> {
        let plan = self.plan_search(scope, search)?;
        let Some(vector) = projections.lookup(&plan.vector) else {
            debug!("search vector was not collected, skipping");
            return None;
        };
        let matches = Predicate::TextSearch {
            vector,
            query: search.query.clone(),
            mode: search.mode,
            config: plan.config,
        };
        let rank = match (plan.rank, search.min_rank) {
            (Some(key), Some(min_rank)) => match projections.lookup(&key) {
                Some(rank) => Some(Predicate::compare(
                    Operand::Projection(rank),
                    CompareOp::Gte,
                    min_rank,
                )),
                None => {
                    debug!("search rank was not collected, skipping the search");
                    return None;
                }
            },
            _ => None,
        };
        Predicate::and([matches].into_iter().chain(rank))
    }

    fn exists(
        &self,
        scope: &Scope<'a>,
        item: &ExistsFilter,
        projections: &ProjectionSet,
    ) -> Option<Predicate> {
        let (target, inner) = self.exists_scope(scope, item)?;
        let nested = match (&item.condition, inner) {
            (Some(condition), Some(inner)) => self.predicate_in(condition, &inner, projections),
            _ => None,
        };
        let exists = Predicate::exists(scope.relation_path(&item.relation), target.name.clone(), nested);
        Some(if item.exists {
            exists
        } else {
            Predicate::not(exists)
        })
    }

    fn compare(&self, scope: &Scope<'a>, cmp: &FieldComparison) -> Option<Predicate> {
        let (Some(left), Some(right)) = (
            scope.entity.get_field(&cmp.left),
            scope.entity.get_field(&cmp.right),
        ) else {
            debug!(left = %cmp.left, right = %cmp.right, "unknown comparison field, skipping");
            return None;
        };
        if !left
            .kind
            .operator_family()
            .is_comparable_with(&right.kind.operator_family())
        {
            debug!(left = %cmp.left, right = %cmp.right, "fields are not comparable, skipping");
            return None;
        }
        Some(Predicate::CompareOperands {
            left: Operand::Field(scope.field_path(&cmp.left)),
            op: cmp.op,
            right: Operand::Field(scope.field_path(&cmp.right)),
        })
    }
}
