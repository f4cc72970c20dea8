//! Field definitions for the entity catalog.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::{Documentation, FieldKind};

/// A scalar field of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name. Filled from the map key when loaded from TOML.
    #[serde(default, skip_serializing)]
    pub name: SmolStr,
    /// Storage kind.
    pub kind: FieldKind,
    /// Whether the field may hold NULL.
    #[serde(default)]
    pub nullable: bool,
    /// Closed set of allowed values, if any.
    #[serde(default)]
    pub choices: Option<Vec<String>>,
    /// Documentation comment.
    #[serde(default)]
    pub documentation: Option<Documentation>,
}

impl Field {
    /// Create a new non-nullable field.
    pub fn new(name: impl Into<SmolStr>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            choices: None,
            documentation: None,
        }
    }

    /// Get the field name as a string.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mark the field as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Restrict the field to a set of values.
    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    /// Set documentation.
    pub fn with_documentation(mut self, doc: impl Into<String>) -> Self {
        self.documentation = Some(Documentation::new(doc));
        self
    }

    /// Check if the field has a closed choice set.
    pub fn has_choices(&self) -> bool {
        self.choices.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Check if the field is free text suitable for quick search.
    pub fn is_searchable_text(&self) -> bool {
        self.kind.is_text() && !self.has_choices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_builder() {
        let field = Field::new("status", FieldKind::Text)
            .nullable()
            .with_choices(["draft", "published"])
            .with_documentation("Publication state");

        assert_eq!(field.name(), "status");
        assert!(field.nullable);
        assert!(field.has_choices());
        assert!(!field.is_searchable_text());
        assert_eq!(field.documentation.unwrap().text, "Publication state");
    }

    #[test]
    fn test_searchable_text() {
        assert!(Field::new("title", FieldKind::Text).is_searchable_text());
        assert!(!Field::new("views", FieldKind::Int).is_searchable_text());
    }
}
