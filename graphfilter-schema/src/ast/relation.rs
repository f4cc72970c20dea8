//! Relation definitions for the entity catalog.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::Documentation;

/// How many related rows a relation yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// At most one related row (many-to-one, one-to-one).
    #[serde(rename = "one", alias = "to_one")]
    ToOne,
    /// Any number of related rows (one-to-many, many-to-many).
    #[serde(rename = "many", alias = "to_many")]
    ToMany,
}

impl Cardinality {
    /// Check if this is a "to-one" relation.
    pub fn is_to_one(&self) -> bool {
        matches!(self, Self::ToOne)
    }

    /// Check if this is a "to-many" relation.
    pub fn is_to_many(&self) -> bool {
        matches!(self, Self::ToMany)
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToOne => write!(f, "n:1"),
            Self::ToMany => write!(f, "1:n"),
        }
    }
}

/// A relation from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Relation name. Filled from the map key when loaded from TOML.
    #[serde(default, skip_serializing)]
    pub name: SmolStr,
    /// How many rows the relation yields.
    pub cardinality: Cardinality,
    /// Name of the target entity.
    pub target: SmolStr,
    /// The field on the target pointing back at the owner.
    #[serde(default)]
    pub back_reference: Option<SmolStr>,
    /// Documentation comment.
    #[serde(default)]
    pub documentation: Option<Documentation>,
}

impl Relation {
    /// Create a new relation.
    pub fn new(
        name: impl Into<SmolStr>,
        cardinality: Cardinality,
        target: impl Into<SmolStr>,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality,
            target: target.into(),
            back_reference: None,
            documentation: None,
        }
    }

    /// Create a to-one relation.
    pub fn to_one(name: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        Self::new(name, Cardinality::ToOne, target)
    }

    /// Create a to-many relation.
    pub fn to_many(name: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        Self::new(name, Cardinality::ToMany, target)
    }

    /// Set the back-reference field.
    pub fn with_back_reference(mut self, field: impl Into<SmolStr>) -> Self {
        self.back_reference = Some(field.into());
        self
    }

    /// Set documentation.
    pub fn with_documentation(mut self, doc: impl Into<String>) -> Self {
        self.documentation = Some(Documentation::new(doc));
        self
    }

    /// Get the relation name as a string.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if this is a "to-one" relation.
    pub fn is_to_one(&self) -> bool {
        self.cardinality.is_to_one()
    }

    /// Check if this is a "to-many" relation.
    pub fn is_to_many(&self) -> bool {
        self.cardinality.is_to_many()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_builders() {
        let rel = Relation::to_many("reviews", "Review").with_back_reference("product");
        assert!(rel.is_to_many());
        assert_eq!(rel.target, "Review");
        assert_eq!(rel.back_reference.as_deref(), Some("product"));

        let rel = Relation::to_one("author", "User");
        assert!(rel.is_to_one());
        assert!(rel.back_reference.is_none());
    }

    #[test]
    fn test_cardinality_display() {
        assert_eq!(Cardinality::ToOne.to_string(), "n:1");
        assert_eq!(Cardinality::ToMany.to_string(), "1:n");
    }
}
