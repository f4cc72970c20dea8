//! Predicate IR produced by the applicator's second phase.
//!
//! A compiled filter is a [`Predicate`] tree over [`Operand`]s. Operands name
//! either a field reached through a dotted [`FieldPath`] or a projection
//! collected in the first phase. "No constraint" is `Option::None`; there is
//! no always-true variant.
//!
//! ```rust
//! use graphfilter_query::expr::{CompareOp, Operand, Predicate};
//!
//! let price = Predicate::compare(Operand::field("price"), CompareOp::Gte, 10);
//! let stock = Predicate::is_null(Operand::field("stock"), false);
//!
//! let both = Predicate::and([price, stock]).unwrap();
//! assert_eq!(both.to_string(), "(price >= 10 AND stock IS NOT NULL)");
//! assert!(Predicate::and([]).is_none());
//! ```

use smallvec::SmallVec;
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::fmt;

use crate::projection::ProjectionRef;
use crate::search::SearchMode;
use crate::temporal::DatePart;
use crate::value::FilterValue;

/// A dotted path from the current scope to a field (`brand.name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldPath {
    segments: SmallVec<[SmolStr; 4]>,
}

impl FieldPath {
    /// A path with a single segment.
    pub fn new(field: impl Into<SmolStr>) -> Self {
        let mut segments = SmallVec::new();
        segments.push(field.into());
        Self { segments }
    }

    /// Build a path under a relation prefix.
    pub fn under(prefix: &RelationPath, field: impl Into<SmolStr>) -> Self {
        let mut segments: SmallVec<[SmolStr; 4]> = prefix.segments().iter().cloned().collect();
        segments.push(field.into());
        Self { segments }
    }

    /// Path segments.
    pub fn segments(&self) -> &[SmolStr] {
        &self.segments
    }

    /// The final segment (the field name).
    pub fn field(&self) -> &str {
        self.segments.last().map(SmolStr::as_str).unwrap_or_default()
    }

    /// The relation segments leading to the field.
    pub fn relations(&self) -> &[SmolStr] {
        &self.segments[..self.segments.len().saturating_sub(1)]
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// A chain of relation names from some scope (`brand.products`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RelationPath {
    segments: SmallVec<[SmolStr; 4]>,
}

impl RelationPath {
    /// The empty path (the current scope itself).
    pub fn root() -> Self {
        Self::default()
    }

    /// A single relation.
    pub fn new(relation: impl Into<SmolStr>) -> Self {
        Self::root().join(relation)
    }

    /// Extend the path with one more relation.
    pub fn join(&self, relation: impl Into<SmolStr>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(relation.into());
        Self { segments }
    }

    /// Path segments.
    pub fn segments(&self) -> &[SmolStr] {
        &self.segments
    }

    /// The first `len` hops.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            segments: self.segments.iter().take(len).cloned().collect(),
        }
    }

    /// Number of relation hops.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if the path has no hops.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The `__`-joined form used in projection names and analyzer output.
    pub fn lookup_name(&self) -> String {
        self.segments.join("__")
    }
}

impl fmt::Display for RelationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    Neq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl CompareOp {
    /// Get the operator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Check whether an ordering between left and right satisfies the operator.
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Neq => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}

/// Pattern match kind for text predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextMatch {
    /// Substring match.
    Contains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
}

/// Key presence test for JSON predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyMatch {
    /// Every key must be present.
    All,
    /// At least one key must be present.
    Any,
}

/// Array containment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayMatch {
    /// The array contains every listed value.
    Contains,
    /// Every array element is in the listed values.
    ContainedBy,
    /// The array shares at least one value with the list.
    Overlaps,
}

/// A value a predicate tests.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A field in the current scope.
    Field(FieldPath),
    /// A projection collected in phase one.
    Projection(ProjectionRef),
    /// A date part of a temporal field.
    DatePart {
        /// The temporal field.
        field: FieldPath,
        /// The part to extract.
        part: DatePart,
    },
    /// The number of elements of an array field.
    ArrayLength(FieldPath),
}

impl Operand {
    /// A field operand with a single-segment path.
    pub fn field(name: impl Into<SmolStr>) -> Self {
        Self::Field(FieldPath::new(name))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(path) => write!(f, "{}", path),
            Self::Projection(projection) => write!(f, "{}", projection.name()),
            Self::DatePart { field, part } => {
                write!(f, "EXTRACT({} FROM {})", part.as_str().to_uppercase(), field)
            }
            Self::ArrayLength(path) => write!(f, "CARDINALITY({})", path),
        }
    }
}

/// A compiled boolean condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Compare an operand with a literal.
    Compare {
        left: Operand,
        op: CompareOp,
        value: FilterValue,
    },
    /// Compare two operands.
    CompareOperands {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    /// List membership.
    In {
        operand: Operand,
        values: Vec<FilterValue>,
        negated: bool,
    },
    /// Null test. `negated` means IS NOT NULL.
    IsNull { operand: Operand, negated: bool },
    /// Text pattern match.
    Text {
        operand: Operand,
        kind: TextMatch,
        value: String,
        case_insensitive: bool,
    },
    /// Regular expression match.
    Regex {
        operand: Operand,
        pattern: String,
        case_insensitive: bool,
    },
    /// JSON key presence.
    JsonKeys {
        operand: Operand,
        keys: Vec<String>,
        mode: KeyMatch,
    },
    /// Array containment.
    Array {
        operand: Operand,
        kind: ArrayMatch,
        values: Vec<FilterValue>,
    },
    /// Some related row exists (matching the predicate, when present).
    /// The nested predicate is scoped to the related entity.
    Exists {
        relation: RelationPath,
        entity: SmolStr,
        predicate: Option<Box<Predicate>>,
    },
    /// Full-text match of a search vector projection.
    TextSearch {
        vector: ProjectionRef,
        query: String,
        mode: SearchMode,
        config: String,
    },
    /// All must hold.
    And(Vec<Predicate>),
    /// At least one must hold.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Compare an operand with a literal.
    pub fn compare(left: Operand, op: CompareOp, value: impl Into<FilterValue>) -> Self {
        Self::Compare {
            left,
            op,
            value: value.into(),
        }
    }

    /// Null test.
    pub fn is_null(operand: Operand, is_null: bool) -> Self {
        Self::IsNull {
            operand,
            negated: !is_null,
        }
    }

    /// Existence of related rows.
    pub fn exists(
        relation: RelationPath,
        entity: impl Into<SmolStr>,
        predicate: Option<Predicate>,
    ) -> Self {
        Self::Exists {
            relation,
            entity: entity.into(),
            predicate: predicate.map(Box::new),
        }
    }

    /// Conjunction. Empty input is no constraint, a single predicate is returned as is.
    pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Option<Self> {
        let mut flat = Vec::new();
        for predicate in predicates {
            match predicate {
                Self::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Self::And(flat)),
        }
    }

    /// Disjunction. Empty input is no constraint, a single predicate is returned as is.
    pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Option<Self> {
        let mut flat = Vec::new();
        for predicate in predicates {
            match predicate {
                Self::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Self::Or(flat)),
        }
    }

    /// Negation. Double negation cancels.
    #[allow(clippy::should_implement_trait)]
    pub fn not(predicate: Predicate) -> Self {
        match predicate {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Combine with another predicate using AND.
    pub fn and_then(self, other: Predicate) -> Self {
        let mut items = match self {
            Self::And(items) => items,
            single => vec![single],
        };
        match other {
            Self::And(more) => items.extend(more),
            single => items.push(single),
        }
        Self::And(items)
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        match self {
            Self::And(items) | Self::Or(items) => {
                1 + items.iter().map(Predicate::node_count).sum::<usize>()
            }
            Self::Not(inner) => 1 + inner.node_count(),
            Self::Exists {
                predicate: Some(inner),
                ..
            } => 1 + inner.node_count(),
            _ => 1,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, values: &[FilterValue]) -> fmt::Result {
    write!(f, "{}", FilterValue::List(values.to_vec()))
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", sep)?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, ")")
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { left, op, value } => write!(f, "{} {} {}", left, op.symbol(), value),
            Self::CompareOperands { left, op, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            Self::In {
                operand,
                values,
                negated,
            } => {
                write!(f, "{} {} ", operand, if *negated { "NOT IN" } else { "IN" })?;
                write_list(f, values)
            }
            Self::IsNull { operand, negated } => {
                write!(f, "{} IS {}NULL", operand, if *negated { "NOT " } else { "" })
            }
            Self::Text {
                operand,
                kind,
                value,
                case_insensitive,
            } => {
                let pattern = match kind {
                    TextMatch::Contains => format!("%{}%", value),
                    TextMatch::StartsWith => format!("{}%", value),
                    TextMatch::EndsWith => format!("%{}", value),
                };
                let op = if *case_insensitive { "ILIKE" } else { "LIKE" };
                write!(f, "{} {} {}", operand, op, FilterValue::String(pattern))
            }
            Self::Regex {
                operand,
                pattern,
                case_insensitive,
            } => {
                let op = if *case_insensitive { "~*" } else { "~" };
                write!(f, "{} {} {}", operand, op, FilterValue::String(pattern.clone()))
            }
            Self::JsonKeys {
                operand,
                keys,
                mode,
            } => {
                let op = match mode {
                    KeyMatch::All => "?&",
                    KeyMatch::Any => "?|",
                };
                let keys: Vec<FilterValue> = keys.iter().map(|k| FilterValue::from(k.as_str())).collect();
                write!(f, "{} {} ", operand, op)?;
                write_list(f, &keys)
            }
            Self::Array {
                operand,
                kind,
                values,
            } => {
                let op = match kind {
                    ArrayMatch::Contains => "@>",
                    ArrayMatch::ContainedBy => "<@",
                    ArrayMatch::Overlaps => "&&",
                };
                write!(f, "{} {} ", operand, op)?;
                write_list(f, values)
            }
            Self::Exists {
                relation,
                predicate,
                ..
            } => match predicate {
                Some(inner) => write!(f, "EXISTS({} WHERE {})", relation, inner),
                None => write!(f, "EXISTS({})", relation),
            },
            Self::TextSearch {
                vector,
                query,
                mode,
                config,
            } => write!(
                f,
                "{} @@ {}('{}', {})",
                vector.name(),
                mode.to_postgres_function(),
                config,
                FilterValue::String(query.clone())
            ),
            Self::And(items) => write_joined(f, items, "AND"),
            Self::Or(items) => write_joined(f, items, "OR"),
            Self::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}
