//! Phase one: projection collection.

use graphfilter_schema::Entity;
use tracing::debug;

use super::{Compiler, Scope};
use crate::ast::{FilterEntry, FilterNode};
use crate::projection::{ProjectionExpr, ProjectionKey, ProjectionRef, ProjectionSet};

impl<'a> Compiler<'a> {
    pub(super) fn collect(&self, tree: &FilterNode, entity: &'a Entity) -> ProjectionSet {
        let mut set = ProjectionSet::new();
        self.collect_node(tree, &Scope::root(entity), &mut set);
        set
    }

    fn collect_node(&self, node: &FilterNode, scope: &Scope<'a>, set: &mut ProjectionSet) {
        for (key, entry) in node.iter() {
            match entry {
                FilterEntry::And(nodes) | FilterEntry::Or(nodes) => {
                    for child in nodes {
                        self.collect_node(child, scope, set);
                    }
                }
                FilterEntry::Not(child) => self.collect_node(child, scope, set),
                FilterEntry::Related { relation, node } => {
                    if let Some(inner) = self.joined_scope(scope, key, relation) {
                        self.collect_node(node, &inner, set);
                    }
                }
                FilterEntry::Quantified { relation, node, .. } => {
                    if let Some(inner) = self.rows_scope(scope, key, relation) {
                        self.collect_node(node, &inner, set);
                    }
                }
                FilterEntry::Exists(items) => {
                    for item in items {
                        if let (Some(condition), Some((_, Some(inner)))) =
                            (&item.condition, self.exists_scope(scope, item))
                        {
                            self.collect_node(condition, &inner, set);
                        }
                    }
                }
                FilterEntry::Aggregate(agg) => {
                    for (function, _) in &agg.functions {
                        let Some((planned, target)) = self.plan_aggregate(scope, agg, *function) else {
                            continue;
                        };
                        // Condition projections have nowhere to live inside an
                        // aggregate filter, so the condition sees an empty set.
                        let filter = agg.condition.as_ref().and_then(|condition| {
                            let rows = scope.related_rows(&agg.relation, target);
                            self.predicate_in(&condition.node, &rows, &ProjectionSet::new())
                        });
                        let expr = ProjectionExpr::Aggregate {
                            function: *function,
                            relation: scope.relation_path(&agg.relation),
                            field: agg.field.clone(),
                            filter,
                        };
                        insert(set, scope, key, planned.key, expr);
                    }
                }
                FilterEntry::Count { relation, .. } => {
                    if scope.entity.has_field(key) {
                        continue;
                    }
                    if let Some(planned) = self.plan_count(scope, relation) {
                        let expr = ProjectionExpr::Count {
                            relation: scope.relation_path(relation),
                        };
                        insert(set, scope, key, planned.key, expr);
                    }
                }
                FilterEntry::Window(items) => {
                    for window in items {
                        if let Some(planned) = self.plan_window(scope, window) {
                            let expr = ProjectionExpr::Window {
                                function: window.function,
                                spec: window.spec(),
                            };
                            insert(set, scope, key, planned.key, expr);
                        }
                    }
                }
                FilterEntry::Subquery(items) => {
                    for subquery in items {
                        if let Some(planned) = self.plan_subquery(scope, subquery) {
                            let expr = ProjectionExpr::Subquery {
                                relation: scope.relation_path(&subquery.relation),
                                field: subquery.field.clone(),
                                order_by: subquery.order_by.clone(),
                            };
                            insert(set, scope, key, planned.key, expr);
                        }
                    }
                }
                FilterEntry::DateTrunc(trunc) => {
                    if let Some(planned) = self.plan_trunc(scope, trunc) {
                        let expr = ProjectionExpr::DateTrunc {
                            field: scope.field_path(&trunc.field),
                            kind: trunc.kind,
                        };
                        insert(set, scope, key, planned.key, expr);
                    }
                }
                FilterEntry::DateExtract(extract) => {
                    if let Some(planned) = self.plan_extract(scope, extract) {
                        let expr = ProjectionExpr::DateExtract {
                            field: scope.field_path(&extract.field),
                            part: extract.part,
                        };
                        insert(set, scope, key, planned.key, expr);
                    }
                }
                FilterEntry::Search(search) => {
                    let Some(plan) = self.plan_search(scope, search) else {
                        continue;
                    };
                    let expr = ProjectionExpr::SearchVector {
                        fields: plan.fields.iter().map(|f| scope.field_path(f)).collect(),
                        config: plan.config.clone(),
                    };
                    let Some(vector) = insert(set, scope, key, plan.vector, expr) else {
                        continue;
                    };
                    if let Some(rank) = plan.rank {
                        let expr = ProjectionExpr::SearchRank {
                            vector,
                            query: search.query.clone(),
                            mode: search.mode,
                            config: plan.config,
                        };
                        insert(set, scope, key, rank, expr);
                    }
                }
                FilterEntry::Id(_)
                | FilterEntry::Quick(_)
                | FilterEntry::Include(_)
                | FilterEntry::Compare(_)
                | FilterEntry::Field { .. } => {}
            }
        }
    }
}

fn insert(
    set: &mut ProjectionSet,
    scope: &Scope<'_>,
    key: &str,
    projection: ProjectionKey,
    expr: ProjectionExpr,
) -> Option<ProjectionRef> {
    let handle = set.insert_scoped(scope.row_path(), projection, expr);
    if handle.is_none() {
        debug!(key, "projection conflicts with an earlier one, skipping");
    }
    handle
}

#[cfg(test)]
mod tests {
    use super::super::FilterApplicator;
    use crate::ast::FilterNode;
    use crate::config::FilterSettings;
    use graphfilter_schema::{Catalog, Entity, EntityCatalog, Field, FieldKind, Relation};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_entity(
                Entity::new("Author")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("name", FieldKind::Text))
                    .field(Field::new("born", FieldKind::Date))
                    .relation(Relation::to_many("books", "Book"))
                    .relation(Relation::to_one("publisher", "Publisher")),
            )
            .with_entity(
                Entity::new("Book")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("title", FieldKind::Text))
                    .field(Field::new("pages", FieldKind::Int))
                    .relation(Relation::to_one("author", "Author")),
            )
            .with_entity(
                Entity::new("Publisher")
                    .field(Field::new("id", FieldKind::Id))
                    .relation(Relation::to_many("authors", "Author")),
            )
    }

    fn names(settings: FilterSettings, tree: serde_json::Value, entity: &str) -> Vec<String> {
        let catalog = catalog();
        let base = catalog.entity(entity).unwrap().clone();
        let applicator = FilterApplicator::new(Arc::new(catalog), &settings);
        let tree = FilterNode::parse(&tree).unwrap();
        applicator
            .collect_projections(&tree, &base)
            .names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_collects_inside_combinators_and_relations() {
        let tree = json!({
            "OR": [
                {"books_agg": {"field": "pages", "sum": {"gt": 100}}},
                {"NOT": {"books_count": {"lt": 2}}}
            ],
            "publisher_rel": {"authors_count": {"gte": 1}}
        });
        assert_eq!(
            names(FilterSettings::default(), tree, "Author"),
            vec!["books_agg_pages_sum", "books_count", "publisher__authors_count"]
        );
    }

    #[test]
    fn test_quantified_scope_uses_full_path() {
        let tree = json!({"books_some": {"author_rel": {"books_count": {"gt": 3}}}});
        assert_eq!(
            names(FilterSettings::default(), tree, "Author"),
            vec!["books__author__books_count"]
        );
    }

    #[test]
    fn test_quantified_projection_scope() {
        let catalog = catalog();
        let base = catalog.entity("Author").unwrap().clone();
        let applicator = FilterApplicator::new(Arc::new(catalog), &FilterSettings::default());
        let tree = json!({
            "books_some": {"author_rel": {"books_count": {"gt": 3}}},
            "publisher_rel": {"authors_count": {"gte": 1}}
        });
        let set = applicator.collect_projections(&FilterNode::parse(&tree).unwrap(), &base);

        let nested = set.by_name("books__author__books_count").unwrap();
        assert_eq!(nested.scope.to_string(), "books");
        assert_eq!(nested.expr.to_string(), "COUNT(author.books)");

        let joined = set.by_name("publisher__authors_count").unwrap();
        assert!(joined.scope.is_empty());
        assert_eq!(joined.expr.to_string(), "COUNT(publisher.authors)");
    }

    #[test]
    fn test_invalid_aggregates_skipped() {
        let tree = json!({
            "books_agg": {"field": "title", "avg": {"gt": 1}, "max": {"eq": "Z"}},
            "publisher_agg": {"field": "id", "count": {"gt": 1}},
            "books_count": 3
        });
        assert_eq!(
            names(FilterSettings::default(), tree, "Author"),
            vec!["books_agg_title_max", "books_count"]
        );
    }

    #[test]
    fn test_gated_keys_skipped() {
        let tree = json!({
            "born_extract": {"part": "year", "filter": {"gte": 1900}},
            "_window": {"function": "rank", "order_by": ["name"], "filter": {"lte": 3}}
        });
        assert!(names(FilterSettings::default(), tree.clone(), "Author").is_empty());
        assert_eq!(
            names(FilterSettings::all_features(), tree, "Author"),
            vec!["born_extract_year", "window_rank_order_name"]
        );
    }

    #[test]
    fn test_conditional_aggregate_projection() {
        let tree = json!({"books_cond_agg": {
            "field": "pages",
            "sum": {"gt": 500},
            "condition": {"title": {"icontains": "rust"}, "books_count": 1}
        }});
        let catalog = catalog();
        let base = catalog.entity("Author").unwrap().clone();
        let applicator = FilterApplicator::new(Arc::new(catalog), &FilterSettings::all_features());
        let set = applicator.collect_projections(&FilterNode::parse(&tree).unwrap(), &base);
        assert_eq!(set.len(), 1);
        let projection = set.iter().next().unwrap();
        assert!(projection.name().starts_with("books_cond_agg_pages_sum_"));
        assert_eq!(
            projection.expr.to_string(),
            "SUM(books.pages) FILTER (WHERE title ILIKE '%rust%')"
        );
    }
}
