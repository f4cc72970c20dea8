//! # graphfilter-schema
//!
//! Entity catalog for the graphfilter compiler.
//!
//! This crate provides:
//! - Catalog types: entities, scalar fields with their [`FieldKind`], relations
//! - The [`EntityCatalog`] trait the filter compiler reads metadata through
//! - A `catalog.toml` loader with `${ENV_VAR}` expansion
//! - Catalog validation with `miette` diagnostics
//!
//! ## Example
//!
//! ```rust
//! use graphfilter_schema::{Catalog, Entity, EntityCatalog, Field, FieldKind, Relation};
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
//! assert!(catalog.validate().is_ok());
//! assert!(catalog.entity("Product").unwrap().get_relation("reviews").is_some());
//! ```

pub mod ast;
pub mod catalog;
pub mod error;

pub use ast::*;
pub use catalog::{Catalog, EntityCatalog, expand_env_vars};
pub use error::{SchemaError, SchemaResult};
