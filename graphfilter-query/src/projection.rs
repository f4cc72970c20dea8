//! Named projections collected by the applicator's first phase.
//!
//! Each projection is identified by a [`ProjectionKey`]. The key's
//! [`name`](ProjectionKey::name) is a pure function of the relation path,
//! target and kind, so the predicate phase finds the same projection by
//! rebuilding the key rather than by sharing state with the collector.
//!
//! ```rust
//! use graphfilter_query::aggregate::AggregateFunction;
//! use graphfilter_query::expr::RelationPath;
//! use graphfilter_query::projection::ProjectionKey;
//!
//! let key = ProjectionKey::Aggregate {
//!     relation: RelationPath::new("author").join("books"),
//!     field: Some("pages".into()),
//!     function: AggregateFunction::Sum,
//! };
//! assert_eq!(key.name(), "author__books_agg_pages_sum");
//! ```

use indexmap::IndexMap;
use smol_str::SmolStr;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::debug;

use crate::aggregate::AggregateFunction;
use crate::expr::{FieldPath, Predicate, RelationPath};
use crate::search::SearchMode;
use crate::temporal::{DatePart, TruncKind};
use crate::types::{OrderKey, order_fragment};
use crate::window::{WindowFunction, WindowSpec};

/// Identity of a projection. Equal keys always describe the same expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProjectionKey {
    /// Aggregate over a to-many relation.
    Aggregate {
        relation: RelationPath,
        field: Option<SmolStr>,
        function: AggregateFunction,
    },
    /// Aggregate over the related rows matching a condition.
    ConditionalAggregate {
        relation: RelationPath,
        field: Option<SmolStr>,
        function: AggregateFunction,
        fingerprint: u32,
    },
    /// Number of related rows.
    Count { relation: RelationPath },
    /// Ranking window over the rows of a scope.
    Window {
        path: RelationPath,
        function: WindowFunction,
        spec: WindowSpec,
    },
    /// First value of a related field in some order.
    Subquery {
        relation: RelationPath,
        field: SmolStr,
        order_by: Vec<OrderKey>,
    },
    /// A truncated temporal field.
    DateTrunc {
        path: RelationPath,
        field: SmolStr,
        kind: TruncKind,
    },
    /// A part extracted from a temporal field.
    DateExtract {
        path: RelationPath,
        field: SmolStr,
        part: DatePart,
    },
    /// Full-text document vector.
    SearchVector {
        path: RelationPath,
        fields: Vec<SmolStr>,
        config: SmolStr,
    },
    /// Full-text rank against a query.
    SearchRank {
        path: RelationPath,
        query: String,
        mode: SearchMode,
    },
}

fn with_prefix(path: &RelationPath, name: String) -> String {
    if path.is_empty() {
        name
    } else {
        format!("{}__{}", path.lookup_name(), name)
    }
}

impl ProjectionKey {
    /// The projection name.
    pub fn name(&self) -> SmolStr {
        let name = match self {
            Self::Aggregate {
                relation,
                field,
                function,
            } => match field {
                Some(field) => format!("{}_agg_{}_{}", relation.lookup_name(), field, function.as_str()),
                None => format!("{}_agg_{}", relation.lookup_name(), function.as_str()),
            },
            Self::ConditionalAggregate {
                relation,
                field,
                function,
                fingerprint,
            } => match field {
                Some(field) => format!(
                    "{}_cond_agg_{}_{}_{:08x}",
                    relation.lookup_name(),
                    field,
                    function.as_str(),
                    fingerprint
                ),
                None => format!(
                    "{}_cond_agg_{}_{:08x}",
                    relation.lookup_name(),
                    function.as_str(),
                    fingerprint
                ),
            },
            Self::Count { relation } => format!("{}_count", relation.lookup_name()),
            Self::Window {
                path,
                function,
                spec,
            } => with_prefix(
                path,
                format!("window_{}{}", function.as_str(), spec.name_suffix()),
            ),
            Self::Subquery {
                relation,
                field,
                order_by,
            } => {
                let mut name = format!("{}_subquery_{}", relation.lookup_name(), field);
                if !order_by.is_empty() {
                    name.push_str("_by_");
                    name.push_str(&order_fragment(order_by));
                }
                name
            }
            Self::DateTrunc { path, field, kind } => {
                with_prefix(path, format!("{}_trunc_{}", field, kind.as_str()))
            }
            Self::DateExtract { path, field, part } => {
                with_prefix(path, format!("{}_extract_{}", field, part.as_str()))
            }
            Self::SearchVector { path, .. } => with_prefix(path, "search_vector".to_string()),
            Self::SearchRank { path, .. } => with_prefix(path, "search_rank".to_string()),
        };
        SmolStr::new(name)
    }

    /// Fingerprint of a conditional aggregation condition.
    ///
    /// Computed over the JSON text of the condition with object keys sorted
    /// at every level, so key order in the input never changes the name.
    pub fn fingerprint(condition: &serde_json::Value) -> u32 {
        let mut hasher = DefaultHasher::new();
        canonical(condition).to_string().hash(&mut hasher);
        (hasher.finish() & 0xffff_ffff) as u32
    }
}

fn canonical(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical(v)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonical).collect())
        }
        other => other.clone(),
    }
}

/// How a projection is computed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionExpr {
    /// Aggregate of a related field (or of related rows for a bare count).
    Aggregate {
        function: AggregateFunction,
        relation: RelationPath,
        field: Option<SmolStr>,
        /// Only rows matching this predicate (scoped to the related entity).
        filter: Option<Predicate>,
    },
    /// Count of related rows.
    Count { relation: RelationPath },
    /// First value of a related field.
    Subquery {
        relation: RelationPath,
        field: SmolStr,
        order_by: Vec<OrderKey>,
    },
    /// Ranking window.
    Window {
        function: WindowFunction,
        spec: WindowSpec,
    },
    /// Truncated temporal field.
    DateTrunc { field: FieldPath, kind: TruncKind },
    /// Extracted date part.
    DateExtract { field: FieldPath, part: DatePart },
    /// Document vector over text fields.
    SearchVector { fields: Vec<FieldPath>, config: String },
    /// Rank of the document vector against a query.
    SearchRank {
        vector: ProjectionRef,
        query: String,
        mode: SearchMode,
        config: String,
    },
}

impl fmt::Display for ProjectionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate {
                function,
                relation,
                field,
                filter,
            } => {
                let distinct = if *function == AggregateFunction::CountDistinct {
                    "DISTINCT "
                } else {
                    ""
                };
                match field {
                    Some(field) => write!(f, "{}({}{}.{})", function.as_sql(), distinct, relation, field)?,
                    None => write!(f, "{}({})", function.as_sql(), relation)?,
                }
                if let Some(filter) = filter {
                    write!(f, " FILTER (WHERE {})", filter)?;
                }
                Ok(())
            }
            Self::Count { relation } => write!(f, "COUNT({})", relation),
            Self::Subquery {
                relation,
                field,
                order_by,
            } => {
                write!(f, "(SELECT {} FROM {}", field, relation)?;
                if !order_by.is_empty() {
                    let keys: Vec<String> = order_by.iter().map(ToString::to_string).collect();
                    write!(f, " ORDER BY {}", keys.join(", "))?;
                }
                write!(f, " LIMIT 1)")
            }
            Self::Window { function, spec } => write!(f, "{}() {}", function.as_sql(), spec),
            Self::DateTrunc { field, kind } => write!(f, "DATE_TRUNC('{}', {})", kind.as_str(), field),
            Self::DateExtract { field, part } => {
                write!(f, "EXTRACT({} FROM {})", part.as_str().to_uppercase(), field)
            }
            Self::SearchVector { fields, config } => {
                let fields: Vec<String> = fields.iter().map(ToString::to_string).collect();
                write!(f, "to_tsvector('{}', {})", config, fields.join(" || ' ' || "))
            }
            Self::SearchRank {
                vector,
                query,
                mode,
                config,
            } => write!(
                f,
                "ts_rank({}, {}('{}', '{}'))",
                vector.name(),
                mode.to_postgres_function(),
                config,
                query.replace('\'', "''")
            ),
        }
    }
}

/// A projection in a [`ProjectionSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// The identity of the projection.
    pub key: ProjectionKey,
    /// How to compute it. Relation and field paths start at the scope rows.
    pub expr: ProjectionExpr,
    /// Rows the projection is computed for, as a path from the base row.
    ///
    /// Empty for the base row. Inside a quantifier or `_exists` condition it
    /// is the path to the related rows being tested, and the projection has
    /// one value per related row.
    pub scope: RelationPath,
}

impl Projection {
    /// The projection name.
    pub fn name(&self) -> SmolStr {
        self.key.name()
    }
}

/// Typed handle to a projection in a [`ProjectionSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectionRef {
    index: usize,
    name: SmolStr,
}

impl ProjectionRef {
    /// The projection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the projection in its set.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Ordered, name-unique set of projections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionSet {
    projections: IndexMap<SmolStr, Projection>,
}

impl ProjectionSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a projection, returning its handle.
    ///
    /// Adding an equal key again returns the existing handle. A different key
    /// that maps to a name already in the set is rejected.
    pub fn insert(&mut self, key: ProjectionKey, expr: ProjectionExpr) -> Option<ProjectionRef> {
        self.insert_scoped(RelationPath::root(), key, expr)
    }

    /// Add a projection computed per row of `scope`.
    pub fn insert_scoped(
        &mut self,
        scope: RelationPath,
        key: ProjectionKey,
        expr: ProjectionExpr,
    ) -> Option<ProjectionRef> {
        let name = key.name();
        if let Some((index, _, existing)) = self.projections.get_full(&name) {
            if existing.key == key {
                return Some(ProjectionRef { index, name });
            }
            debug!(projection = %name, "projection name already bound to a different expression");
            return None;
        }

        let projection = Projection { key, expr, scope };
        let (index, _) = self.projections.insert_full(name.clone(), projection);
        Some(ProjectionRef { index, name })
    }

    /// Find the handle for a key.
    pub fn lookup(&self, key: &ProjectionKey) -> Option<ProjectionRef> {
        let name = key.name();
        let (index, _, projection) = self.projections.get_full(&name)?;
        (projection.key == *key).then_some(ProjectionRef { index, name })
    }

    /// Resolve a handle.
    pub fn get(&self, projection: &ProjectionRef) -> Option<&Projection> {
        self.projections.get_index(projection.index).map(|(_, p)| p)
    }

    /// Get a projection by name.
    pub fn by_name(&self, name: &str) -> Option<&Projection> {
        self.projections.get(name)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Projection> {
        self.projections.values()
    }

    /// Names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.projections.keys().map(SmolStr::as_str).collect()
    }

    /// Number of projections.
    pub fn len(&self) -> usize {
        self.projections.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn avg_rating() -> ProjectionKey {
        ProjectionKey::Aggregate {
            relation: RelationPath::new("reviews"),
            field: Some("rating".into()),
            function: AggregateFunction::Avg,
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(avg_rating().name(), "reviews_agg_rating_avg");
        assert_eq!(
            ProjectionKey::Count {
                relation: RelationPath::new("reviews")
            }
            .name(),
            "reviews_count"
        );
        assert_eq!(
            ProjectionKey::Subquery {
                relation: RelationPath::new("reviews"),
                field: "rating".into(),
                order_by: vec![OrderKey::desc("created_at")],
            }
            .name(),
            "reviews_subquery_rating_by_created_at_desc"
        );
        assert_eq!(
            ProjectionKey::DateExtract {
                path: RelationPath::root(),
                field: "created_at".into(),
                part: DatePart::Year,
            }
            .name(),
            "created_at_extract_year"
        );
        assert_eq!(
            ProjectionKey::SearchRank {
                path: RelationPath::new("brand"),
                query: "lamp".into(),
                mode: SearchMode::Plain,
            }
            .name(),
            "brand__search_rank"
        );
    }

    #[test]
    fn test_window_name() {
        let key = ProjectionKey::Window {
            path: RelationPath::root(),
            function: WindowFunction::Rank,
            spec: WindowSpec::new()
                .partition_by(["category"])
                .order_by(OrderKey::desc("price")),
        };
        assert_eq!(key.name(), "window_rank_by_category_order_price_desc");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = ProjectionKey::fingerprint(&json!({"rating": {"gte": 4}, "verified": true}));
        let b = ProjectionKey::fingerprint(&json!({"verified": true, "rating": {"gte": 4}}));
        let c = ProjectionKey::fingerprint(&json!({"verified": false}));
        assert_eq!(a, b);
        assert_ne!(a, c);

        let key = ProjectionKey::ConditionalAggregate {
            relation: RelationPath::new("reviews"),
            field: Some("rating".into()),
            function: AggregateFunction::Avg,
            fingerprint: a,
        };
        let name = key.name();
        assert!(name.starts_with("reviews_cond_agg_rating_avg_"));
        assert_eq!(name.len(), "reviews_cond_agg_rating_avg_".len() + 8);
    }

    #[test]
    fn test_fingerprint_ignores_nested_key_order() {
        let a = ProjectionKey::fingerprint(&json!({
            "author_rel": {"name": "x", "active": true},
            "OR": [{"rating": {"lt": 2, "gt": 0}}, {"verified": false}]
        }));
        let b = ProjectionKey::fingerprint(&json!({
            "OR": [{"rating": {"gt": 0, "lt": 2}}, {"verified": false}],
            "author_rel": {"active": true, "name": "x"}
        }));
        assert_eq!(a, b);

        // List order is meaningful and stays part of the fingerprint.
        let c = ProjectionKey::fingerprint(&json!({
            "OR": [{"verified": false}, {"rating": {"gt": 0, "lt": 2}}],
            "author_rel": {"active": true, "name": "x"}
        }));
        assert_ne!(a, c);
    }

    #[test]
    fn test_set_dedupes() {
        let mut set = ProjectionSet::new();
        let expr = ProjectionExpr::Aggregate {
            function: AggregateFunction::Avg,
            relation: RelationPath::new("reviews"),
            field: Some("rating".into()),
            filter: None,
        };
        let first = set.insert(avg_rating(), expr.clone()).unwrap();
        let second = set.insert(avg_rating(), expr).unwrap();
        assert_eq!(first, second);
        assert_eq!(set.len(), 1);
        assert_eq!(set.lookup(&avg_rating()), Some(first.clone()));
        assert_eq!(set.get(&first).unwrap().expr.to_string(), "AVG(reviews.rating)");
    }

    #[test]
    fn test_name_conflict_rejected() {
        let vector = |field: &str| ProjectionKey::SearchVector {
            path: RelationPath::root(),
            fields: vec![SmolStr::new(field)],
            config: "english".into(),
        };
        let expr = |field: &str| ProjectionExpr::SearchVector {
            fields: vec![FieldPath::new(field)],
            config: "english".into(),
        };
        let mut set = ProjectionSet::new();
        assert!(set.insert(vector("name"), expr("name")).is_some());
        assert!(set.insert(vector("body"), expr("body")).is_none());
        assert!(set.lookup(&vector("body")).is_none());
        assert_eq!(set.names(), vec!["search_vector"]);
    }

    #[test]
    fn test_lookup_missing() {
        let set = ProjectionSet::new();
        assert!(set.lookup(&avg_rating()).is_none());
    }
}
