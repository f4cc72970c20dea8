//! Where-input type generation.
//!
//! [`TypeGenerator`] turns an entity and a relation depth into a
//! [`FilterSchema`] describing every key a filter over that entity may use.
//! Generated schemas are cached per `(scope, entity, depth)` for the life of
//! the generator and shared between threads.
//!
//! ```rust
//! use graphfilter_query::typegen::TypeGenerator;
//! use graphfilter_query::FilterSettings;
//! use graphfilter_schema::{Catalog, Entity, Field, FieldKind, Relation};
//! use std::sync::Arc;
//!
//! let catalog = Catalog::new()
//!     .with_entity(
//!         Entity::new("Product")
//!             .field(Field::new("id", FieldKind::Id))
//!             .field(Field::new("name", FieldKind::Text))
//!             .relation(Relation::to_many("reviews", "Review")),
//!     )
//!     .with_entity(
//!         Entity::new("Review")
//!             .field(Field::new("id", FieldKind::Id))
//!             .field(Field::new("rating", FieldKind::Int)),
//!     );
//!
//! let generator = TypeGenerator::new(Arc::new(catalog), &FilterSettings::default());
//! let schema = generator.generate_filter_schema("Product", 0).unwrap();
//!
//! let root = schema.root_type();
//! assert_eq!(root.name, "ProductWhereInput");
//! assert!(root.has_field("reviews_some"));
//! assert!(root.has_field("reviews_agg"));
//! assert!(schema.by_name("ReviewWhereInputDepth1").is_some());
//! ```

use graphfilter_schema::{Entity, EntityCatalog, FieldKind, Relation};
use indexmap::IndexMap;
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::aggregate::AggregateFunction;
use crate::config::{FeatureFlags, FilterSettings};
use crate::operators::{OperandShape, operators_for};
use crate::schema_types::{
    InputField, InputObject, ScalarType, SchemaBuilder, TypeHandle, TypeId, TypeRef,
};
use crate::temporal::{DatePart, TruncKind};
use crate::window::WindowFunction;

type CacheKey = (SmolStr, SmolStr, usize);

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    /// Requests answered from the cache.
    pub hits: u64,
    /// Requests that generated a schema.
    pub misses: u64,
    /// Entries removed by eviction.
    pub evictions: u64,
}

impl GeneratorStats {
    /// Fraction of requests answered from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Generates and caches where-input schemas.
pub struct TypeGenerator {
    catalog: Arc<dyn EntityCatalog>,
    max_relation_depth: usize,
    cache_max_size: usize,
    features: FeatureFlags,
    cache: RwLock<HashMap<CacheKey, TypeHandle>>,
    stats: RwLock<GeneratorStats>,
}

impl std::fmt::Debug for TypeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeGenerator")
            .field("max_relation_depth", &self.max_relation_depth)
            .field("cache_max_size", &self.cache_max_size)
            .field("features", &self.features)
            .field("cached", &self.cache_len())
            .finish()
    }
}

impl TypeGenerator {
    /// Create a generator over a catalog.
    pub fn new(catalog: Arc<dyn EntityCatalog>, settings: &FilterSettings) -> Self {
        Self {
            catalog,
            max_relation_depth: settings.schema.max_relation_depth,
            cache_max_size: settings.schema.cache_max_size,
            features: settings.features,
            cache: RwLock::new(HashMap::new()),
            stats: RwLock::new(GeneratorStats::default()),
        }
    }

    /// Generate the unscoped where-input for an entity at a relation depth.
    pub fn generate_filter_schema(&self, entity: &str, depth: usize) -> Option<TypeHandle> {
        self.generate_scoped("", entity, depth)
    }

    /// Generate a where-input whose type names carry a scope prefix.
    ///
    /// Returns `None`, with a warning, when the entity is not in the catalog.
    pub fn generate_scoped(&self, scope: &str, entity: &str, depth: usize) -> Option<TypeHandle> {
        let key: CacheKey = (SmolStr::new(scope), SmolStr::new(entity), depth);

        if let Some(handle) = self.cache.read().get(&key) {
            self.stats.write().hits += 1;
            return Some(Arc::clone(handle));
        }
        self.stats.write().misses += 1;

        let Some(root_entity) = self.catalog.entity(entity) else {
            warn!(entity, "cannot generate filter schema for unknown entity");
            return None;
        };

        let mut generation = Generation {
            generator: self,
            scope,
            builder: SchemaBuilder::default(),
            memo: HashMap::new(),
            in_progress: HashMap::new(),
        };
        let root = generation.where_type(root_entity, depth);
        let handle: TypeHandle = Arc::new(generation.builder.build(root));
        debug!(scope, entity, depth, types = handle.len(), "generated filter schema");

        let mut cache = self.cache.write();
        let winner = Arc::clone(cache.entry(key).or_insert(handle));
        if cache.len() > self.cache_max_size {
            let to_evict = cache.len().div_ceil(10);
            let victims: Vec<CacheKey> = cache.keys().take(to_evict).cloned().collect();
            for victim in &victims {
                cache.remove(victim);
            }
            self.stats.write().evictions += victims.len() as u64;
            debug!(evicted = victims.len(), "evicted filter schemas");
        }
        Some(winner)
    }

    /// Number of cached schemas.
    pub fn cache_len(&self) -> usize {
        self.cache.read().len()
    }

    /// Drop every cached schema.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    /// Cache statistics.
    pub fn stats(&self) -> GeneratorStats {
        *self.stats.read()
    }

    /// The where-type name for an entity at a depth.
    pub fn type_name(scope: &str, entity: &str, depth: usize) -> String {
        if depth == 0 {
            format!("{}{}WhereInput", scope, entity)
        } else {
            format!("{}{}WhereInputDepth{}", scope, entity, depth)
        }
    }
}

/// State of one generation call. Never shared between calls.
struct Generation<'g> {
    generator: &'g TypeGenerator,
    scope: &'g str,
    builder: SchemaBuilder,
    memo: HashMap<(SmolStr, usize), TypeId>,
    /// Where-types whose fields are being built, with their reserved ids.
    in_progress: HashMap<(SmolStr, usize), TypeId>,
}

impl Generation<'_> {
    fn where_type(&mut self, entity: &Entity, depth: usize) -> TypeId {
        let key = (entity.name.clone(), depth);
        if let Some(id) = self.memo.get(&key) {
            return *id;
        }
        if let Some(id) = self.in_progress.get(&key) {
            debug!(entity = %entity.name, depth, "re-entered where-type, using its placeholder");
            return *id;
        }

        let name = TypeGenerator::type_name(self.scope, &entity.name, depth);
        let id = self.builder.reserve(name);
        self.in_progress.insert(key.clone(), id);
        let fields = self.where_fields(entity, depth);
        self.builder.finish(id, fields);
        self.in_progress.remove(&key);
        self.memo.insert(key, id);
        id
    }

    fn where_fields(&mut self, entity: &Entity, depth: usize) -> IndexMap<SmolStr, InputField> {
        let generator = self.generator;
        let features = generator.features;
        let max = generator.max_relation_depth;
        let mut fields = IndexMap::new();
        let mut add = |field: InputField| {
            fields.insert(field.name.clone(), field);
        };

        for field in entity.fields.values() {
            let Some(filter) = self.operator_type(&field.kind) else {
                debug!(field = %field.name, "array operators disabled, skipping field");
                continue;
            };
            let mut input = InputField::new(field.name.clone(), TypeRef::Input(filter));
            if let Some(doc) = &field.documentation {
                input = input.describe(doc.text.clone());
            } else if let Some(choices) = &field.choices {
                input = input.describe(format!("One of: {}", choices.join(", ")));
            }
            add(input);

            if field.kind.is_temporal() {
                if features.date_trunc {
                    let trunc = self.trunc_type(&field.kind);
                    add(InputField::new(format!("{}_trunc", field.name), TypeRef::Input(trunc)));
                }
                if features.date_extract {
                    let extract = self.extract_type();
                    add(InputField::new(
                        format!("{}_extract", field.name),
                        TypeRef::Input(extract),
                    ));
                }
            }
        }

        if depth < max {
            for relation in entity.relations.values() {
                let Some(target) = generator.catalog.entity(&relation.target) else {
                    warn!(
                        entity = %entity.name,
                        relation = %relation.name,
                        target = %relation.target,
                        "skipping relation with unresolvable target"
                    );
                    continue;
                };
                for field in self.relation_fields(entity, relation, target, depth) {
                    add(field);
                }
            }
        }

        let id_type = self.operator_type(&primary_key_kind(entity)).map(TypeRef::Input);
        if let Some(id_type) = id_type {
            add(InputField::new("id", id_type).describe("Filter on the primary key"));
        }
        add(InputField::new("quick", TypeRef::Scalar(ScalarType::String))
            .describe("Case-insensitive text match across the quick-search fields"));
        add(InputField::new("include", TypeRef::list(TypeRef::Scalar(ScalarType::Id)))
            .describe("Identifiers always part of the result"));
        let own = self.where_type(entity, depth);
        add(InputField::new("AND", TypeRef::list(TypeRef::Input(own))));
        add(InputField::new("OR", TypeRef::list(TypeRef::Input(own))));
        add(InputField::new("NOT", TypeRef::Input(own)));

        let compare = self.compare_type();
        add(InputField::new("_compare", TypeRef::list(TypeRef::Input(compare))));
        if features.window {
            let window = self.window_type();
            add(InputField::new("_window", TypeRef::list(TypeRef::Input(window))));
        }
        if depth < max && features.subquery {
            let subquery = self.subquery_type();
            add(InputField::new("_subquery", TypeRef::list(TypeRef::Input(subquery))));
        }
        if depth < max && features.exists {
            let exists = self.exists_type();
            add(InputField::new("_exists", TypeRef::list(TypeRef::Input(exists))));
        }
        if features.full_text {
            let search = self.search_type();
            add(InputField::new("search", TypeRef::Input(search)));
        }

        fields
    }

    fn relation_fields(
        &mut self,
        entity: &Entity,
        relation: &Relation,
        target: &Entity,
        depth: usize,
    ) -> Vec<InputField> {
        let max = self.generator.max_relation_depth;
        let features = self.generator.features;
        let name = &relation.name;
        let mut out = Vec::new();

        if let Some(id_filter) = self.operator_type(&primary_key_kind(target)) {
            out.push(
                InputField::new(name.clone(), TypeRef::Input(id_filter))
                    .describe(format!("Filter on the identifiers of {}", target.name)),
            );
        }

        let nested = depth + 1 < max;
        if relation.is_to_one() {
            if nested {
                let target_where = self.where_type(target, depth + 1);
                out.push(InputField::new(format!("{}_rel", name), TypeRef::Input(target_where)));
            }
            return out;
        }

        let aggregate = self.aggregate_type();
        out.push(InputField::new(format!("{}_agg", name), TypeRef::Input(aggregate)));

        let count_key = format!("{}_count", name);
        if !entity.has_field(&count_key) {
            if let Some(int_filter) = self.operator_type(&FieldKind::Int) {
                out.push(InputField::new(count_key, TypeRef::Input(int_filter)));
            }
        }

        if nested {
            let target_where = self.where_type(target, depth + 1);
            if features.conditional_aggregation {
                let cond = self.conditional_aggregate_type(target, depth + 1, target_where);
                out.push(InputField::new(format!("{}_cond_agg", name), TypeRef::Input(cond)));
            }
            out.push(
                InputField::new(format!("{}_some", name), TypeRef::Input(target_where))
                    .describe("At least one related row matches"),
            );
            out.push(
                InputField::new(format!("{}_every", name), TypeRef::Input(target_where))
                    .describe("There are related rows and every one matches"),
            );
            out.push(
                InputField::new(format!("{}_none", name), TypeRef::Input(target_where))
                    .describe("No related row matches"),
            );
        }
        out
    }

    /// The operator-set type for a field kind. `None` for arrays when the
    /// array family is disabled.
    fn operator_type(&mut self, kind: &FieldKind) -> Option<TypeId> {
        if kind.is_array() && !self.generator.features.array {
            return None;
        }
        let name = operator_type_name(kind);
        Some(self.builder.named(name, |builder| {
            let mut object = InputObject::new(name);
            for info in operators_for(kind) {
                let ty = operand_type(builder, kind, info.operand);
                object = object.with_field(InputField::new(info.name, ty).describe(info.description));
            }
            object
        }))
    }

    fn trunc_type(&mut self, kind: &FieldKind) -> TypeId {
        let filter = self.operator_type(kind);
        let name = if kind.has_time() {
            "DateTimeTruncFilter"
        } else {
            "DateTruncFilter"
        };
        let kinds: Vec<&str> = TruncKind::ALL.iter().map(TruncKind::as_str).collect();
        self.builder.named(name, |_| {
            let mut object = InputObject::new(name).with_field(
                InputField::new("kind", TypeRef::Scalar(ScalarType::String))
                    .describe(format!("One of: {}", kinds.join(", "))),
            );
            if let Some(filter) = filter {
                object = object.with_field(InputField::new("filter", TypeRef::Input(filter)));
            }
            object
        })
    }

    fn extract_type(&mut self) -> TypeId {
        let int_filter = self.operator_type(&FieldKind::Int);
        let parts: Vec<&str> = DatePart::ALL.iter().map(DatePart::as_str).collect();
        self.builder.named("DateExtractFilter", |_| {
            let mut object = InputObject::new("DateExtractFilter").with_field(
                InputField::new("part", TypeRef::Scalar(ScalarType::String))
                    .describe(format!("One of: {}", parts.join(", "))),
            );
            if let Some(int_filter) = int_filter {
                object = object.with_field(InputField::new("filter", TypeRef::Input(int_filter)));
            }
            object
        })
    }

    fn aggregate_type(&mut self) -> TypeId {
        let int_filter = self.operator_type(&FieldKind::Int);
        let float_filter = self.operator_type(&FieldKind::Float);
        self.builder.named("AggregateFilter", |_| {
            aggregate_object(InputObject::new("AggregateFilter"), int_filter, float_filter)
        })
    }

    fn conditional_aggregate_type(&mut self, target: &Entity, depth: usize, condition: TypeId) -> TypeId {
        let int_filter = self.operator_type(&FieldKind::Int);
        let float_filter = self.operator_type(&FieldKind::Float);
        let name = format!(
            "{}ConditionalAggregateFilter",
            TypeGenerator::type_name(self.scope, &target.name, depth)
        );
        self.builder.named(&name, |_| {
            aggregate_object(InputObject::new(name.as_str()), int_filter, float_filter).with_field(
                InputField::new("condition", TypeRef::Input(condition))
                    .describe("Only related rows matching this filter are aggregated"),
            )
        })
    }

    fn compare_type(&mut self) -> TypeId {
        self.builder.named("FieldComparison", |_| {
            InputObject::new("FieldComparison")
                .with_field(InputField::new("left", TypeRef::Scalar(ScalarType::String)))
                .with_field(
                    InputField::new("op", TypeRef::Scalar(ScalarType::String))
                        .describe("One of: eq, neq, gt, gte, lt, lte"),
                )
                .with_field(InputField::new("right", TypeRef::Scalar(ScalarType::String)))
        })
    }

    fn window_type(&mut self) -> TypeId {
        let float_filter = self.operator_type(&FieldKind::Float);
        let functions: Vec<&str> = WindowFunction::ALL.iter().map(WindowFunction::as_str).collect();
        self.builder.named("WindowFilter", |_| {
            let mut object = InputObject::new("WindowFilter")
                .with_field(
                    InputField::new("function", TypeRef::Scalar(ScalarType::String))
                        .describe(format!("One of: {}", functions.join(", "))),
                )
                .with_field(InputField::new(
                    "partition_by",
                    TypeRef::list(TypeRef::Scalar(ScalarType::String)),
                ))
                .with_field(
                    InputField::new("order_by", TypeRef::list(TypeRef::Scalar(ScalarType::String)))
                        .describe("Field names, `-` prefix for descending"),
                );
            if let Some(float_filter) = float_filter {
                object = object.with_field(InputField::new("filter", TypeRef::Input(float_filter)));
            }
            object
        })
    }

    fn subquery_type(&mut self) -> TypeId {
        self.builder.named("SubqueryFilter", |_| {
            InputObject::new("SubqueryFilter")
                .with_field(InputField::new("relation", TypeRef::Scalar(ScalarType::String)))
                .with_field(InputField::new("field", TypeRef::Scalar(ScalarType::String)))
                .with_field(InputField::new(
                    "order_by",
                    TypeRef::list(TypeRef::Scalar(ScalarType::String)),
                ))
                .with_field(
                    InputField::new("filter", TypeRef::Scalar(ScalarType::Json))
                        .describe("Operators of the selected field's kind"),
                )
        })
    }

    fn exists_type(&mut self) -> TypeId {
        self.builder.named("ExistsFilter", |_| {
            InputObject::new("ExistsFilter")
                .with_field(InputField::new("relation", TypeRef::Scalar(ScalarType::String)))
                .with_field(
                    InputField::new("condition", TypeRef::Scalar(ScalarType::Json))
                        .describe("Filter over the related entity"),
                )
                .with_field(InputField::new("exists", TypeRef::Scalar(ScalarType::Boolean)))
        })
    }

    fn search_type(&mut self) -> TypeId {
        self.builder.named("SearchFilter", |_| {
            InputObject::new("SearchFilter")
                .with_field(InputField::new("query", TypeRef::Scalar(ScalarType::String)))
                .with_field(InputField::new(
                    "fields",
                    TypeRef::list(TypeRef::Scalar(ScalarType::String)),
                ))
                .with_field(
                    InputField::new("mode", TypeRef::Scalar(ScalarType::String))
                        .describe("One of: plain, phrase, websearch, raw"),
                )
                .with_field(InputField::new("min_rank", TypeRef::Scalar(ScalarType::Float)))
                .with_field(InputField::new("config", TypeRef::Scalar(ScalarType::String)))
        })
    }
}

fn aggregate_object(
    object: InputObject,
    int_filter: Option<TypeId>,
    float_filter: Option<TypeId>,
) -> InputObject {
    let mut object = object.with_field(
        InputField::new("field", TypeRef::Scalar(ScalarType::String))
            .describe("Related field to aggregate; omit to count rows"),
    );
    for function in AggregateFunction::ALL {
        let filter = if function.is_count() { int_filter } else { float_filter };
        if let Some(filter) = filter {
            object = object.with_field(InputField::new(function.as_str(), TypeRef::Input(filter)));
        }
    }
    object
}

fn primary_key_kind(entity: &Entity) -> FieldKind {
    entity
        .primary_key_field()
        .map(|f| f.kind.clone())
        .unwrap_or(FieldKind::Id)
}

fn operator_type_name(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "StringFilter",
        FieldKind::Int | FieldKind::BigInt => "IntFilter",
        FieldKind::Float | FieldKind::Decimal => "FloatFilter",
        FieldKind::Boolean => "BooleanFilter",
        FieldKind::Date => "DateFilter",
        FieldKind::DateTime => "DateTimeFilter",
        FieldKind::Id => "IdFilter",
        FieldKind::Uuid => "UuidFilter",
        FieldKind::Json => "JsonFilter",
        FieldKind::Array(_) => "ArrayFilter",
    }
}

fn scalar_of(kind: &FieldKind) -> ScalarType {
    match kind {
        FieldKind::Text => ScalarType::String,
        FieldKind::Int | FieldKind::BigInt => ScalarType::Int,
        FieldKind::Float | FieldKind::Decimal => ScalarType::Float,
        FieldKind::Boolean => ScalarType::Boolean,
        FieldKind::Date => ScalarType::Date,
        FieldKind::DateTime => ScalarType::DateTime,
        FieldKind::Id => ScalarType::Id,
        FieldKind::Uuid => ScalarType::Uuid,
        FieldKind::Json | FieldKind::Array(_) => ScalarType::Json,
    }
}

fn operand_type(builder: &mut SchemaBuilder, kind: &FieldKind, shape: OperandShape) -> TypeRef {
    let element = kind.element_kind().unwrap_or(kind);
    match shape {
        OperandShape::Value | OperandShape::Ordered => TypeRef::Scalar(scalar_of(kind)),
        OperandShape::List | OperandShape::Range => TypeRef::list(TypeRef::Scalar(scalar_of(element))),
        OperandShape::Flag => TypeRef::Scalar(ScalarType::Boolean),
        OperandShape::Pattern | OperandShape::Key => TypeRef::Scalar(ScalarType::String),
        OperandShape::Keys => TypeRef::list(TypeRef::Scalar(ScalarType::String)),
        OperandShape::Integer => {
            let int_filter = builder.named("IntFilter", |builder| {
                let mut object = InputObject::new("IntFilter");
                for info in operators_for(&FieldKind::Int) {
                    let ty = operand_type(builder, &FieldKind::Int, info.operand);
                    object = object.with_field(InputField::new(info.name, ty).describe(info.description));
                }
                object
            });
            TypeRef::Input(int_filter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphfilter_schema::{Catalog, Field};
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_entity(
                Entity::new("Product")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("name", FieldKind::Text))
                    .field(Field::new("created", FieldKind::Date))
                    .field(Field::new("tags", FieldKind::Array(Box::new(FieldKind::Text))))
                    .relation(Relation::to_one("brand", "Brand"))
                    .relation(Relation::to_many("reviews", "Review"))
                    .relation(Relation::to_many("ghosts", "Missing")),
            )
            .with_entity(
                Entity::new("Brand")
                    .field(Field::new("id", FieldKind::Uuid))
                    .relation(Relation::to_many("products", "Product")),
            )
            .with_entity(
                Entity::new("Review")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("rating", FieldKind::Int))
                    .relation(Relation::to_one("product", "Product")),
            )
    }

    fn generator(settings: FilterSettings) -> TypeGenerator {
        TypeGenerator::new(Arc::new(catalog()), &settings)
    }

    #[test]
    fn test_type_names() {
        assert_eq!(TypeGenerator::type_name("", "Product", 0), "ProductWhereInput");
        assert_eq!(
            TypeGenerator::type_name("Admin", "Product", 2),
            "AdminProductWhereInputDepth2"
        );
    }

    #[test]
    fn test_relation_fields_by_depth() {
        let generator = generator(FilterSettings::default());
        let schema = generator.generate_filter_schema("Product", 0).unwrap();
        let root = schema.root_type();

        assert!(root.has_field("brand"));
        assert!(root.has_field("brand_rel"));
        assert!(root.has_field("reviews_every"));
        assert!(root.has_field("reviews_count"));
        assert!(!root.has_field("reviews_cond_agg"));
        assert!(!root.has_field("ghosts"));
        assert!(!root.has_field("tags"));
        assert!(!root.has_field("created_trunc"));

        let brand_filter = root.field("brand").unwrap();
        assert_eq!(schema.render_type(&brand_filter.ty), "UuidFilter");

        // max_relation_depth 3: depth 2 types allow identifier keys but no further nesting
        let deep = schema.by_name("ProductWhereInputDepth2").unwrap();
        assert!(deep.has_field("brand"));
        assert!(deep.has_field("reviews_agg"));
        assert!(!deep.has_field("brand_rel"));
        assert!(!deep.has_field("reviews_some"));
        assert!(schema.by_name("BrandWhereInputDepth3").is_none());
    }

    #[test]
    fn test_feature_gated_fields() {
        let generator = generator(FilterSettings::all_features());
        let schema = generator.generate_filter_schema("Product", 0).unwrap();
        let root = schema.root_type();
        for key in [
            "tags",
            "created_trunc",
            "created_extract",
            "reviews_cond_agg",
            "_window",
            "_subquery",
            "_exists",
            "search",
        ] {
            assert!(root.has_field(key), "missing {}", key);
        }
        let date = schema.by_name("DateFilter").unwrap();
        assert!(date.has_field("week_day"));
        assert!(!date.has_field("hour"));
    }

    #[test]
    fn test_combinators_refer_to_own_type() {
        let generator = generator(FilterSettings::default());
        let schema = generator.generate_filter_schema("Review", 1).unwrap();
        let root = schema.root_type();
        assert_eq!(root.name, "ReviewWhereInputDepth1");
        assert_eq!(root.field("NOT").unwrap().ty, TypeRef::Input(schema.root()));
        assert_eq!(schema.render_type(&root.field("OR").unwrap().ty), "[ReviewWhereInputDepth1]");
    }

    #[test]
    fn test_real_count_field_wins() {
        let catalog = Catalog::new()
            .with_entity(
                Entity::new("Post")
                    .field(Field::new("id", FieldKind::Id))
                    .field(Field::new("comments_count", FieldKind::Text))
                    .relation(Relation::to_many("comments", "Comment")),
            )
            .with_entity(Entity::new("Comment").field(Field::new("id", FieldKind::Id)));
        let generator = TypeGenerator::new(Arc::new(catalog), &FilterSettings::default());
        let schema = generator.generate_filter_schema("Post", 0).unwrap();
        let count = schema.root_type().field("comments_count").unwrap();
        assert_eq!(schema.render_type(&count.ty), "StringFilter");
    }

    #[test]
    fn test_reentry_returns_placeholder() {
        let generator = generator(FilterSettings::default());
        let catalog = catalog();
        let product = catalog.entity("Product").unwrap();
        let mut generation = Generation {
            generator: &generator,
            scope: "",
            builder: SchemaBuilder::default(),
            memo: HashMap::new(),
            in_progress: HashMap::new(),
        };
        let reserved = generation.builder.reserve("ProductWhereInputDepth1");
        generation.in_progress.insert((SmolStr::new("Product"), 1), reserved);

        assert_eq!(generation.where_type(product, 1), reserved);
        let schema = generation.builder.build(reserved);
        assert_eq!(schema.root_type().name, "ProductWhereInputDepth1");
        assert!(schema.root_type().placeholder);
        assert!(schema.root_type().fields.is_empty());
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn test_placeholder_resolved_after_build() {
        let generator = generator(FilterSettings::default());
        let catalog = catalog();
        let product = catalog.entity("Product").unwrap();
        let mut generation = Generation {
            generator: &generator,
            scope: "",
            builder: SchemaBuilder::default(),
            memo: HashMap::new(),
            in_progress: HashMap::new(),
        };
        let id = generation.where_type(product, 0);
        assert!(generation.in_progress.is_empty());

        let schema = generation.builder.build(id);
        assert_eq!(schema.placeholder_count(), 0);
        let root = schema.root_type();
        assert!(!root.fields.is_empty());
        assert_eq!(root.field("NOT").unwrap().ty, TypeRef::Input(id));
    }

    #[test]
    fn test_cache_hits_and_eviction() {
        let mut settings = FilterSettings::default();
        settings.schema.cache_max_size = 2;
        let generator = generator(settings);

        let first = generator.generate_filter_schema("Product", 0).unwrap();
        let again = generator.generate_filter_schema("Product", 0).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(generator.stats().hits, 1);

        generator.generate_filter_schema("Review", 0).unwrap();
        generator.generate_filter_schema("Brand", 0).unwrap();
        assert_eq!(generator.cache_len(), 2);
        assert_eq!(generator.stats().evictions, 1);

        generator.clear_cache();
        assert_eq!(generator.cache_len(), 0);
    }

    #[test]
    fn test_unknown_entity() {
        let generator = generator(FilterSettings::default());
        assert!(generator.generate_filter_schema("Nope", 0).is_none());
    }
}
