//! Catalog types describing entities, their fields and relations.

mod entity;
mod field;
mod relation;
mod types;

pub use entity::*;
pub use field::*;
pub use relation::*;
pub use types::*;
