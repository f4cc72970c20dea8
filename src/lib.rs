//! # graphfilter
//!
//! A declarative, strongly-typed filter language over an entity graph.
//!
//! graphfilter provides:
//! - An entity catalog describing fields and relations, loadable from TOML
//! - A recursive type generator producing the "where-input" schema per entity
//! - A security validator guarding regex patterns, depth and clause count
//! - A two-phase compiler turning a filter tree into projections and a predicate
//! - An in-memory evaluator for running compiled filters over JSON rows
//!
//! ## Quick Start
//!
//! ```rust
//! use graphfilter::prelude::*;
//! use graphfilter::schema::{Catalog, Entity, Field, FieldKind, Relation};
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
//! let applicator = FilterApplicator::new(Arc::new(catalog), &FilterSettings::default());
//!
//! let tree = FilterNode::parse(&json!({"reviews_some": {"rating": 5}})).unwrap();
//! let rows = MemoryAdapter::new(vec![
//!     json!({"id": 1, "reviews": [{"id": 10, "rating": 5}]}),
//!     json!({"id": 2, "reviews": [{"id": 11, "rating": 2}]}),
//! ]);
//!
//! let matched = applicator.apply(rows, &tree, "Product").unwrap();
//! assert_eq!(matched.ids("id"), vec![json!(1)]);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Entity catalog types.
pub mod schema {
    pub use graphfilter_schema::*;
}

/// Filter compiler, type generator and evaluator.
pub mod query {
    pub use graphfilter_query::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use graphfilter_query::prelude::*;
    pub use graphfilter_schema::{Catalog, EntityCatalog};
}

// Re-export key types at the crate root
pub use graphfilter_query::{
    CompiledFilter, FilterApplicator, FilterError, FilterNode, FilterResult, FilterSettings,
    MemoryAdapter, TypeGenerator,
};
pub use graphfilter_schema::{Catalog, EntityCatalog, SchemaError};
