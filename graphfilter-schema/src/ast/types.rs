//! Type definitions for the entity catalog.

use serde::{Deserialize, Serialize};

/// The storage kind of an entity field.
///
/// The kind fully determines which filter operators a field accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text (maps to VARCHAR/TEXT).
    #[serde(alias = "string")]
    Text,
    /// Integer.
    #[serde(alias = "integer")]
    Int,
    /// Big integer.
    BigInt,
    /// Floating point number.
    Float,
    /// Fixed precision decimal.
    Decimal,
    /// Boolean.
    #[serde(alias = "bool")]
    Boolean,
    /// Calendar date without time.
    Date,
    /// Timestamp.
    #[serde(alias = "timestamp")]
    DateTime,
    /// Opaque identifier (primary and foreign keys).
    Id,
    /// UUID identifier.
    Uuid,
    /// JSON document.
    Json,
    /// Homogeneous array of another kind.
    Array(Box<FieldKind>),
}

impl FieldKind {
    /// Parse a kind from its lowercase name. Arrays use the `name[]` form.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        if let Some(inner) = s.strip_suffix("[]") {
            return Self::from_str(inner).map(|k| Self::Array(Box::new(k)));
        }
        match s {
            "text" | "string" => Some(Self::Text),
            "int" | "integer" => Some(Self::Int),
            "big_int" | "bigint" => Some(Self::BigInt),
            "float" => Some(Self::Float),
            "decimal" => Some(Self::Decimal),
            "boolean" | "bool" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "date_time" | "datetime" | "timestamp" => Some(Self::DateTime),
            "id" => Some(Self::Id),
            "uuid" => Some(Self::Uuid),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Get the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Int => "int",
            Self::BigInt => "big_int",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "date_time",
            Self::Id => "id",
            Self::Uuid => "uuid",
            Self::Json => "json",
            Self::Array(_) => "array",
        }
    }

    /// Check if this is a text kind.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }

    /// Check if this is a numeric kind.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::BigInt | Self::Float | Self::Decimal)
    }

    /// Check if this is an integral numeric kind.
    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Int | Self::BigInt)
    }

    /// Check if this is a date or datetime kind.
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime)
    }

    /// Check if this kind carries a time of day.
    pub fn has_time(&self) -> bool {
        matches!(self, Self::DateTime)
    }

    /// Check if this is an identifier kind.
    pub fn is_identifier(&self) -> bool {
        matches!(self, Self::Id | Self::Uuid)
    }

    /// Check if this is an array kind.
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Get the element kind of an array.
    pub fn element_kind(&self) -> Option<&FieldKind> {
        match self {
            Self::Array(inner) => Some(inner),
            _ => None,
        }
    }

    /// Get the operator family that filters on this kind use.
    pub fn operator_family(&self) -> OperatorFamily {
        match self {
            Self::Text => OperatorFamily::Text,
            Self::Int | Self::BigInt | Self::Float | Self::Decimal => OperatorFamily::Numeric,
            Self::Boolean => OperatorFamily::Boolean,
            Self::Date | Self::DateTime => OperatorFamily::Temporal,
            Self::Id | Self::Uuid => OperatorFamily::Identifier,
            Self::Json => OperatorFamily::Json,
            Self::Array(_) => OperatorFamily::Array,
        }
    }
}

/// Groups of field kinds sharing one operator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorFamily {
    /// Text fields.
    Text,
    /// Integer, float and decimal fields.
    Numeric,
    /// Boolean fields.
    Boolean,
    /// Date and datetime fields.
    Temporal,
    /// Id and UUID fields.
    Identifier,
    /// JSON documents.
    Json,
    /// Array fields.
    Array,
}

impl OperatorFamily {
    /// Get the family name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
            Self::Temporal => "temporal",
            Self::Identifier => "identifier",
            Self::Json => "json",
            Self::Array => "array",
        }
    }

    /// Check whether two families can be compared operand to operand.
    pub fn is_comparable_with(&self, other: &OperatorFamily) -> bool {
        self == other && !matches!(self, Self::Json | Self::Array)
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Array(inner) => write!(f, "{}[]", inner),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Documentation attached to a catalog element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Documentation {
    /// The documentation text.
    pub text: String,
}

impl Documentation {
    /// Create new documentation.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
