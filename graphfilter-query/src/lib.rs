//! # graphfilter-query
//!
//! Nested filter compiler for the graphfilter query language.
//!
//! This crate provides:
//! - The filter AST, parsed from JSON filter trees
//! - A closed operator catalog per field family
//! - A security validator (regex length and shape, depth, clause count)
//! - A type generator producing the typed "where-input" schema per entity
//! - A two-phase applicator compiling a tree into projections and a predicate
//! - An analyzer reporting joins, prefetches and a rough cost
//! - An in-memory evaluator over JSON rows
//!
//! ## Compiling a filter
//!
//! ```rust
//! use graphfilter_query::{FilterApplicator, FilterNode, FilterSettings};
//! use graphfilter_schema::{Catalog, Entity, Field, FieldKind};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let catalog = Catalog::new().with_entity(
//!     Entity::new("Product")
//!         .field(Field::new("id", FieldKind::Id))
//!         .field(Field::new("price", FieldKind::Float)),
//! );
//! let applicator = FilterApplicator::new(Arc::new(catalog), &FilterSettings::default());
//!
//! let tree = FilterNode::parse(&json!({"price": {"between": [5, 10]}})).unwrap();
//! let compiled = applicator.compile(&tree, "Product").unwrap();
//! assert!(compiled.projections.is_empty());
//! assert_eq!(compiled.predicate.unwrap().to_string(), "(price >= 5 AND price <= 10)");
//! ```
//!
//! ## Generating filter types
//!
//! ```rust
//! use graphfilter_query::{FilterSettings, TypeGenerator};
//! use graphfilter_schema::{Catalog, Entity, Field, FieldKind, Relation};
//! use std::sync::Arc;
//!
//! let catalog = Catalog::new()
//!     .with_entity(
//!         Entity::new("User")
//!             .field(Field::new("id", FieldKind::Id))
//!             .relation(Relation::to_many("friends", "User")),
//!     );
//! let generator = TypeGenerator::new(Arc::new(catalog), &FilterSettings::default());
//! let schema = generator.generate_filter_schema("User", 0).unwrap();
//! assert!(schema.root_type().has_field("friends_some"));
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use graphfilter_query::{ErrorCode, FilterError, SecurityError};
//!
//! let err: FilterError = SecurityError::TooManyClauses { count: 51, max: 50 }.into();
//! assert!(err.is_security());
//! assert_eq!(err.code, ErrorCode::TooManyClauses);
//! ```

pub mod aggregate;
pub mod analyzer;
pub mod applicator;
pub mod ast;
pub mod config;
pub mod error;
pub mod eval;
pub mod expr;
pub mod logging;
pub mod operators;
pub mod projection;
pub mod schema_types;
pub mod search;
pub mod security;
pub mod temporal;
pub mod typegen;
pub mod types;
pub mod value;
pub mod window;

pub use aggregate::AggregateFunction;
pub use analyzer::{CostTier, FilterAnalysis, FilterAnalyzer, OperatorCatalog, describe_operators};
pub use applicator::{CompiledFilter, FilterApplicator, QueryAdapter, apply_compiled};
pub use ast::{FilterEntry, FilterNode, LeafFilter, Quantifier};
pub use config::{FeatureFlags, FilterSettings, SchemaSettings, SearchSettings, SecurityLimits};
pub use error::{ErrorCode, ErrorContext, FilterError, FilterResult, SecurityError, Suggestion};
pub use eval::MemoryAdapter;
pub use expr::{CompareOp, FieldPath, Operand, Predicate, RelationPath};
pub use operators::{OperandShape, OperatorInfo, operators_for};
pub use projection::{Projection, ProjectionExpr, ProjectionKey, ProjectionRef, ProjectionSet};
pub use schema_types::{FilterSchema, InputField, InputObject, ScalarType, TypeHandle, TypeId, TypeRef};
pub use security::SecurityValidator;
pub use typegen::{GeneratorStats, TypeGenerator};
pub use types::{OrderKey, SortOrder};
pub use value::FilterValue;

// Re-export logging utilities
pub use logging::{
    LogFormat, LogSettings, get_log_format, get_log_level, init as init_logging, init_debug,
    init_with, init_with_level, is_debug_enabled,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::analyzer::{FilterAnalyzer, describe_operators};
    pub use crate::applicator::{CompiledFilter, FilterApplicator, QueryAdapter};
    pub use crate::ast::FilterNode;
    pub use crate::config::FilterSettings;
    pub use crate::error::{FilterError, FilterResult};
    pub use crate::eval::MemoryAdapter;
    pub use crate::typegen::TypeGenerator;
    pub use crate::value::FilterValue;
}
