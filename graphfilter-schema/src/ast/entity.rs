//! Entity definitions for the catalog.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::{Documentation, Field, Relation};

fn default_primary_key() -> SmolStr {
    SmolStr::new_static("id")
}

/// An entity (a table or document collection) with its fields and relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name. Filled from the map key when loaded from TOML.
    #[serde(default, skip_serializing)]
    pub name: SmolStr,
    /// Name of the primary key field.
    #[serde(default = "default_primary_key")]
    pub primary_key: SmolStr,
    /// Scalar fields.
    #[serde(default)]
    pub fields: IndexMap<SmolStr, Field>,
    /// Relations to other entities.
    #[serde(default)]
    pub relations: IndexMap<SmolStr, Relation>,
    /// Fields searched by the `quick` filter. Empty means auto-detect.
    #[serde(default)]
    pub quick_fields: Vec<SmolStr>,
    /// Fields indexed for full-text search. Empty means auto-detect.
    #[serde(default)]
    pub search_fields: Vec<SmolStr>,
    /// Documentation comment.
    #[serde(default)]
    pub documentation: Option<Documentation>,
}

impl Entity {
    /// Create a new entity with an `id` primary key.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            primary_key: default_primary_key(),
            fields: IndexMap::new(),
            relations: IndexMap::new(),
            quick_fields: vec![],
            search_fields: vec![],
            documentation: None,
        }
    }

    /// Get the entity name as a string.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the primary key field name.
    pub fn primary_key(mut self, name: impl Into<SmolStr>) -> Self {
        self.primary_key = name.into();
        self
    }

    /// Add a field.
    pub fn field(mut self, field: Field) -> Self {
        self.add_field(field);
        self
    }

    /// Add a relation.
    pub fn relation(mut self, relation: Relation) -> Self {
        self.add_relation(relation);
        self
    }

    /// Configure the quick-search fields.
    pub fn quick_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.quick_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Configure the full-text search fields.
    pub fn search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set documentation.
    pub fn with_documentation(mut self, doc: impl Into<String>) -> Self {
        self.documentation = Some(Documentation::new(doc));
        self
    }

    /// Add a field in place.
    pub fn add_field(&mut self, field: Field) {
        self.fields.insert(field.name.clone(), field);
    }

    /// Add a relation in place.
    pub fn add_relation(&mut self, relation: Relation) {
        self.relations.insert(relation.name.clone(), relation);
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Get a relation by name.
    pub fn get_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    /// Check whether a real field with this name exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Get the primary key field, if declared.
    pub fn primary_key_field(&self) -> Option<&Field> {
        self.fields.get(self.primary_key.as_str())
    }

    /// Fields used by the `quick` filter: the configured list, or every free-text field.
    pub fn quick_search_fields(&self) -> Vec<&Field> {
        if self.quick_fields.is_empty() {
            self.fields.values().filter(|f| f.is_searchable_text()).collect()
        } else {
            self.quick_fields
                .iter()
                .filter_map(|name| self.fields.get(name.as_str()))
                .collect()
        }
    }

    /// Fields used by full-text search: the configured list, or every free-text field.
    pub fn full_text_fields(&self) -> Vec<&Field> {
        if self.search_fields.is_empty() {
            self.fields.values().filter(|f| f.is_searchable_text()).collect()
        } else {
            self.search_fields
                .iter()
                .filter_map(|name| self.fields.get(name.as_str()))
                .collect()
        }
    }

    /// Get all date and datetime fields.
    pub fn temporal_fields(&self) -> Vec<&Field> {
        self.fields.values().filter(|f| f.kind.is_temporal()).collect()
    }

    /// Get all to-one relations.
    pub fn to_one_relations(&self) -> Vec<&Relation> {
        self.relations.values().filter(|r| r.is_to_one()).collect()
    }

    /// Get all to-many relations.
    pub fn to_many_relations(&self) -> Vec<&Relation> {
        self.relations.values().filter(|r| r.is_to_many()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FieldKind;

    fn product() -> Entity {
        Entity::new("Product")
            .field(Field::new("id", FieldKind::Id))
            .field(Field::new("name", FieldKind::Text))
            .field(Field::new("status", FieldKind::Text).with_choices(["active", "retired"]))
            .field(Field::new("released", FieldKind::Date))
            .relation(Relation::to_many("reviews", "Review"))
            .relation(Relation::to_one("brand", "Brand"))
    }

    #[test]
    fn test_entity_lookups() {
        let entity = product();
        assert_eq!(entity.name(), "Product");
        assert!(entity.has_field("name"));
        assert!(!entity.has_field("reviews"));
        assert_eq!(entity.primary_key_field().unwrap().kind, FieldKind::Id);
        assert_eq!(entity.to_many_relations().len(), 1);
        assert_eq!(entity.to_one_relations().len(), 1);
        assert_eq!(entity.temporal_fields().len(), 1);
    }

    #[test]
    fn test_quick_fields_auto_detected() {
        let entity = product();
        let names: Vec<_> = entity.quick_search_fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["name"]);
    }

    #[test]
    fn test_quick_fields_configured() {
        let entity = product().quick_fields(["status", "missing"]);
        let names: Vec<_> = entity.quick_search_fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["status"]);
    }
}
