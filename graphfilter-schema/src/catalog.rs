//! The entity catalog and its `catalog.toml` loader.

use indexmap::IndexMap;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::path::Path;
use std::sync::LazyLock;

use crate::ast::Entity;
use crate::error::{SchemaError, SchemaResult};

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier pattern"));

/// Source of entity metadata.
///
/// The filter compiler only ever reads metadata through this trait, so any
/// registry (an ORM model index, a database introspection snapshot) can back it.
pub trait EntityCatalog: Send + Sync {
    /// Look up an entity by name.
    fn entity(&self, name: &str) -> Option<&Entity>;

    /// Iterate over the names of all known entities.
    fn entity_names(&self) -> Vec<&str>;
}

/// An in-memory entity catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    /// Entities keyed by name.
    #[serde(default)]
    pub entities: IndexMap<SmolStr, Entity>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity.
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.add_entity(entity);
        self
    }

    /// Add an entity in place.
    pub fn add_entity(&mut self, entity: Entity) {
        self.entities.insert(entity.name.clone(), entity);
    }

    /// Get an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Load a catalog from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&content)
    }

    /// Parse a catalog from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> SchemaResult<Self> {
        let expanded = expand_env_vars(content);

        let mut catalog: Catalog =
            toml::from_str(&expanded).map_err(|e| SchemaError::TomlError { source: e })?;
        catalog.fill_names();
        Ok(catalog)
    }

    /// Copy map keys into the `name` fields left empty by deserialization.
    fn fill_names(&mut self) {
        for (entity_name, entity) in self.entities.iter_mut() {
            entity.name = entity_name.clone();
            for (field_name, field) in entity.fields.iter_mut() {
                field.name = field_name.clone();
            }
            for (relation_name, relation) in entity.relations.iter_mut() {
                relation.name = relation_name.clone();
            }
        }
    }

    /// Check the catalog for malformed metadata.
    ///
    /// The compiler tolerates every issue reported here by skipping the
    /// offending field or relation; validation is for catching them early.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut errors = Vec::new();

        for entity in self.entities.values() {
            if !IDENTIFIER.is_match(entity.name()) {
                errors.push(SchemaError::invalid_entity(entity.name(), "invalid identifier"));
            }

            if entity.primary_key_field().is_none() {
                errors.push(SchemaError::invalid_entity(
                    entity.name(),
                    format!("primary key `{}` is not a declared field", entity.primary_key),
                ));
            }

            for field in entity.fields.values() {
                if !IDENTIFIER.is_match(field.name()) {
                    errors.push(SchemaError::invalid_field(
                        entity.name(),
                        field.name(),
                        "invalid identifier",
                    ));
                }
            }

            for relation in entity.relations.values() {
                if !IDENTIFIER.is_match(relation.name()) {
                    errors.push(SchemaError::invalid_relation(
                        entity.name(),
                        relation.name(),
                        "invalid identifier",
                    ));
                }
                if entity.has_field(relation.name()) {
                    errors.push(SchemaError::invalid_relation(
                        entity.name(),
                        relation.name(),
                        "name collides with a field",
                    ));
                }
                if !self.entities.contains_key(relation.target.as_str()) {
                    errors.push(SchemaError::invalid_relation(
                        entity.name(),
                        relation.name(),
                        format!("unknown target `{}`", relation.target),
                    ));
                }
            }
        }

        match SchemaError::from_many(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl EntityCatalog for Catalog {
    fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(SmolStr::as_str).collect()
    }
}

impl<C: EntityCatalog + ?Sized> EntityCatalog for std::sync::Arc<C> {
    fn entity(&self, name: &str) -> Option<&Entity> {
        (**self).entity(name)
    }

    fn entity_names(&self) -> Vec<&str> {
        (**self).entity_names()
    }
}

/// Expand `${VAR}` references using the process environment.
///
/// Unset variables are left untouched.
pub fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    for cap in ENV_VAR.captures_iter(content) {
        let var_name = &cap[1];
        let full_match = &cap[0];

        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(full_match, &value);
        }
    }

    result
}
