//! Error types for catalog loading and validation.

// These warnings are false positives - the fields are used by derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Result type for catalog operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while loading or validating an entity catalog.
#[derive(Error, Debug, Diagnostic)]
pub enum SchemaError {
    /// Error reading a file.
    #[error("failed to read file: {path}")]
    #[diagnostic(code(graphfilter::schema::io_error))]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML")]
    #[diagnostic(code(graphfilter::schema::toml_error))]
    TomlError {
        #[source]
        source: toml::de::Error,
    },

    /// Invalid entity definition.
    #[error("invalid entity `{name}`: {message}")]
    #[diagnostic(code(graphfilter::schema::invalid_entity))]
    InvalidEntity { name: String, message: String },

    /// Invalid field definition.
    #[error("invalid field `{entity}.{field}`: {message}")]
    #[diagnostic(code(graphfilter::schema::invalid_field))]
    InvalidField {
        entity: String,
        field: String,
        message: String,
    },

    /// Invalid relation definition.
    #[error("invalid relation `{entity}.{relation}`: {message}")]
    #[diagnostic(
        code(graphfilter::schema::invalid_relation),
        help("declare the target entity in the catalog or remove the relation")
    )]
    InvalidRelation {
        entity: String,
        relation: String,
        message: String,
    },

    /// Unknown entity reference.
    #[error("unknown entity `{name}`")]
    #[diagnostic(code(graphfilter::schema::unknown_entity))]
    UnknownEntity { name: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    #[diagnostic(code(graphfilter::schema::config_error))]
    ConfigError { message: String },

    /// Validation error with multiple issues.
    #[error("catalog validation failed with {count} error(s)")]
    #[diagnostic(code(graphfilter::schema::validation_failed))]
    ValidationFailed {
        count: usize,
        #[related]
        errors: Vec<SchemaError>,
    },
}

impl SchemaError {
    /// Create an invalid entity error.
    pub fn invalid_entity(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEntity {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid field error.
    pub fn invalid_field(
        entity: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            entity: entity.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an invalid relation error.
    pub fn invalid_relation(
        entity: impl Into<String>,
        relation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidRelation {
            entity: entity.into(),
            relation: relation.into(),
            message: message.into(),
        }
    }

    /// Create an unknown entity error.
    pub fn unknown_entity(name: impl Into<String>) -> Self {
        Self::UnknownEntity { name: name.into() }
    }

    /// Collapse a list of errors into a single validation error.
    pub fn from_many(mut errors: Vec<SchemaError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            count => Some(Self::ValidationFailed { count, errors }),
        }
    }
}
