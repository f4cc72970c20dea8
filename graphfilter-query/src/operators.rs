//! The operator catalog.
//!
//! Each field family has a closed operator enum. A leaf's operators are parsed
//! into [`Condition`]s against the target field's family; unknown names and
//! operands of the wrong shape are skipped, never errors.
//!
//! ```rust
//! use graphfilter_query::operators::{Condition, NumericOp};
//! use graphfilter_query::FilterValue;
//! use graphfilter_schema::OperatorFamily;
//!
//! let between = FilterValue::from(vec![5, 10]);
//! assert_eq!(
//!     Condition::parse(OperatorFamily::Numeric, "between", &between),
//!     Some(Condition::Numeric(NumericOp::Between, between.clone()))
//! );
//! assert_eq!(Condition::parse(OperatorFamily::Numeric, "icontains", &between), None);
//! assert_eq!(Condition::parse(OperatorFamily::Numeric, "between", &FilterValue::from(5)), None);
//! ```

use chrono::{DateTime, Utc};
use graphfilter_schema::{FieldKind, OperatorFamily};
use serde::Serialize;
use tracing::debug;

use crate::ast::LeafFilter;
use crate::expr::{ArrayMatch, CompareOp, KeyMatch, Operand, Predicate, TextMatch};
use crate::temporal::{DatePart, TemporalShortcut};
use crate::value::FilterValue;

/// What an operator expects as its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandShape {
    /// A value of the field's kind, or null.
    Value,
    /// A non-null value of the field's kind.
    Ordered,
    /// A list of values (a scalar is a one-element list).
    List,
    /// A two-element `[low, high]` list.
    Range,
    /// `true` or `false`.
    Flag,
    /// A text pattern.
    Pattern,
    /// An integer, or a numeric leaf object.
    Integer,
    /// A single key name.
    Key,
    /// A list of key names.
    Keys,
}

impl OperandShape {
    /// Short description for catalogs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Ordered => "value",
            Self::List => "list",
            Self::Range => "[low, high]",
            Self::Flag => "boolean",
            Self::Pattern => "string",
            Self::Integer => "integer or numeric filter",
            Self::Key => "string",
            Self::Keys => "list of strings",
        }
    }
}

/// Description of one operator, for catalogs and schema generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorInfo {
    /// Operator name.
    pub name: &'static str,
    /// Operand shape.
    pub operand: OperandShape,
    /// Human-readable description.
    pub description: &'static str,
}

macro_rules! operator_set {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $wire:literal, $shape:ident, $desc:literal;)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[doc = $desc]
                $variant,
            )+
        }

        impl $name {
            /// Every operator of the family.
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            /// Parse an operator name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Get the operator name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            /// The operand the operator expects.
            pub fn operand(&self) -> OperandShape {
                match self {
                    $(Self::$variant => OperandShape::$shape,)+
                }
            }

            /// Catalog entry.
            pub fn info(&self) -> OperatorInfo {
                let description = match self {
                    $(Self::$variant => $desc,)+
                };
                OperatorInfo {
                    name: self.as_str(),
                    operand: self.operand(),
                    description,
                }
            }
        }
    };
}

operator_set! {
    /// Operators on text fields.
    TextOp {
        Eq => "eq", Value, "Equal to";
        Neq => "neq", Value, "Not equal to";
        Contains => "contains", Pattern, "Contains the substring";
        IContains => "icontains", Pattern, "Contains the substring, ignoring case";
        StartsWith => "starts_with", Pattern, "Starts with the prefix";
        IStartsWith => "istarts_with", Pattern, "Starts with the prefix, ignoring case";
        EndsWith => "ends_with", Pattern, "Ends with the suffix";
        IEndsWith => "iends_with", Pattern, "Ends with the suffix, ignoring case";
        In => "in", List, "Equal to one of the values";
        NotIn => "not_in", List, "Equal to none of the values";
        IsNull => "is_null", Flag, "Is (or is not) null";
        Regex => "regex", Pattern, "Matches the regular expression";
        IRegex => "iregex", Pattern, "Matches the regular expression, ignoring case";
    }
}

operator_set! {
    /// Operators on integer, float and decimal fields.
    NumericOp {
        Eq => "eq", Value, "Equal to";
        Neq => "neq", Value, "Not equal to";
        Gt => "gt", Ordered, "Greater than";
        Gte => "gte", Ordered, "Greater than or equal to";
        Lt => "lt", Ordered, "Less than";
        Lte => "lte", Ordered, "Less than or equal to";
        In => "in", List, "Equal to one of the values";
        NotIn => "not_in", List, "Equal to none of the values";
        Between => "between", Range, "Between low and high, inclusive";
        IsNull => "is_null", Flag, "Is (or is not) null";
    }
}

operator_set! {
    /// Operators on boolean fields.
    BooleanOp {
        Eq => "eq", Value, "Equal to";
        IsNull => "is_null", Flag, "Is (or is not) null";
    }
}

operator_set! {
    /// Operators on date and datetime fields.
    TemporalOp {
        Eq => "eq", Value, "Equal to";
        Neq => "neq", Value, "Not equal to";
        Gt => "gt", Ordered, "After";
        Gte => "gte", Ordered, "On or after";
        Lt => "lt", Ordered, "Before";
        Lte => "lte", Ordered, "On or before";
        Between => "between", Range, "Between low and high, inclusive";
        IsNull => "is_null", Flag, "Is (or is not) null";
        Year => "year", Integer, "Calendar year";
        Month => "month", Integer, "Month, 1-12";
        Day => "day", Integer, "Day of month";
        WeekDay => "week_day", Integer, "Day of week, 1 (Sunday) to 7 (Saturday)";
        Hour => "hour", Integer, "Hour of day (datetime only)";
        Today => "today", Flag, "Within (or outside) the current day";
        Yesterday => "yesterday", Flag, "Within (or outside) the previous day";
        ThisWeek => "this_week", Flag, "Within (or outside) the current week";
        PastWeek => "past_week", Flag, "Within (or outside) the last 7 days";
        ThisMonth => "this_month", Flag, "Within (or outside) the current month";
        PastMonth => "past_month", Flag, "Within (or outside) the last 30 days";
        ThisYear => "this_year", Flag, "Within (or outside) the current year";
        PastYear => "past_year", Flag, "Within (or outside) the last 365 days";
    }
}

impl TemporalOp {
    /// The date part a part operator extracts.
    pub fn date_part(&self) -> Option<DatePart> {
        match self {
            Self::Year => Some(DatePart::Year),
            Self::Month => Some(DatePart::Month),
            Self::Day => Some(DatePart::Day),
            Self::WeekDay => Some(DatePart::WeekDay),
            Self::Hour => Some(DatePart::Hour),
            _ => None,
        }
    }

    /// The named period a shortcut operator tests.
    pub fn shortcut(&self) -> Option<TemporalShortcut> {
        TemporalShortcut::from_name(self.as_str())
    }
}

operator_set! {
    /// Operators on id and uuid fields.
    IdentifierOp {
        Eq => "eq", Value, "Equal to";
        Neq => "neq", Value, "Not equal to";
        In => "in", List, "Equal to one of the values";
        NotIn => "not_in", List, "Equal to none of the values";
        IsNull => "is_null", Flag, "Is (or is not) null";
    }
}

operator_set! {
    /// Operators on JSON fields.
    JsonOp {
        Eq => "eq", Value, "Equal to the document";
        IsNull => "is_null", Flag, "Is (or is not) null";
        HasKey => "has_key", Key, "Has the top-level key";
        HasKeys => "has_keys", Keys, "Has every listed top-level key";
        HasAnyKeys => "has_any_keys", Keys, "Has at least one listed top-level key";
    }
}

operator_set! {
    /// Operators on array fields.
    ArrayOp {
        Contains => "contains", List, "Contains every listed value";
        ContainedBy => "contained_by", List, "Every element is one of the listed values";
        Overlaps => "overlaps", List, "Shares at least one value with the list";
        Length => "length", Integer, "Number of elements";
        IsNull => "is_null", Flag, "Is (or is not) null";
    }
}

/// Operators available on a field of the given kind.
pub fn operators_for(kind: &FieldKind) -> Vec<OperatorInfo> {
    match kind.operator_family() {
        OperatorFamily::Text => TextOp::ALL.iter().map(TextOp::info).collect(),
        OperatorFamily::Numeric => NumericOp::ALL.iter().map(NumericOp::info).collect(),
        OperatorFamily::Boolean => BooleanOp::ALL.iter().map(BooleanOp::info).collect(),
        OperatorFamily::Temporal => TemporalOp::ALL
            .iter()
            .filter(|op| kind.has_time() || **op != TemporalOp::Hour)
            .map(TemporalOp::info)
            .collect(),
        OperatorFamily::Identifier => IdentifierOp::ALL.iter().map(IdentifierOp::info).collect(),
        OperatorFamily::Json => JsonOp::ALL.iter().map(JsonOp::info).collect(),
        OperatorFamily::Array => ArrayOp::ALL.iter().map(ArrayOp::info).collect(),
    }
}

/// A parsed operator with a shape-checked operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Text operator.
    Text(TextOp, FilterValue),
    /// Numeric operator.
    Numeric(NumericOp, FilterValue),
    /// Boolean operator.
    Boolean(BooleanOp, FilterValue),
    /// Date or datetime operator.
    Temporal(TemporalOp, FilterValue),
    /// Identifier operator.
    Identifier(IdentifierOp, FilterValue),
    /// JSON operator.
    Json(JsonOp, FilterValue),
    /// Array operator.
    Array(ArrayOp, FilterValue),
}

impl Condition {
    /// Parse one operator of a leaf. Returns `None` for unknown operators and
    /// operands of the wrong shape. List operands are normalized.
    pub fn parse(family: OperatorFamily, name: &str, operand: &FilterValue) -> Option<Self> {
        let check = |shape: OperandShape| normalize(family, shape, operand);
        match family {
            OperatorFamily::Text => {
                let op = TextOp::from_name(name)?;
                Some(Self::Text(op, check(op.operand())?))
            }
            OperatorFamily::Numeric => {
                let op = NumericOp::from_name(name)?;
                Some(Self::Numeric(op, check(op.operand())?))
            }
            OperatorFamily::Boolean => {
                let op = BooleanOp::from_name(name)?;
                Some(Self::Boolean(op, check(op.operand())?))
            }
            OperatorFamily::Temporal => {
                let op = TemporalOp::from_name(name)?;
                Some(Self::Temporal(op, check(op.operand())?))
            }
            OperatorFamily::Identifier => {
                let op = IdentifierOp::from_name(name)?;
                Some(Self::Identifier(op, check(op.operand())?))
            }
            OperatorFamily::Json => {
                let op = JsonOp::from_name(name)?;
                Some(Self::Json(op, check(op.operand())?))
            }
            OperatorFamily::Array => {
                let op = ArrayOp::from_name(name)?;
                Some(Self::Array(op, check(op.operand())?))
            }
        }
    }

    /// Get the operator name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text(op, _) => op.as_str(),
            Self::Numeric(op, _) => op.as_str(),
            Self::Boolean(op, _) => op.as_str(),
            Self::Temporal(op, _) => op.as_str(),
            Self::Identifier(op, _) => op.as_str(),
            Self::Json(op, _) => op.as_str(),
            Self::Array(op, _) => op.as_str(),
        }
    }

    /// Lower to a predicate over `target`, a value of kind `kind`.
    ///
    /// Temporal shortcuts resolve against `now`. Returns `None` when the
    /// operator cannot apply to the target (a date part of a projection, an
    /// hour of a date).
    pub fn to_predicate(
        &self,
        target: &Operand,
        kind: &FieldKind,
        now: DateTime<Utc>,
    ) -> Option<Predicate> {
        match self {
            Self::Text(op, value) => Some(match op {
                TextOp::Eq => equality(target, CompareOp::Eq, value),
                TextOp::Neq => equality(target, CompareOp::Neq, value),
                TextOp::Contains => text(target, TextMatch::Contains, value, false)?,
                TextOp::IContains => text(target, TextMatch::Contains, value, true)?,
                TextOp::StartsWith => text(target, TextMatch::StartsWith, value, false)?,
                TextOp::IStartsWith => text(target, TextMatch::StartsWith, value, true)?,
                TextOp::EndsWith => text(target, TextMatch::EndsWith, value, false)?,
                TextOp::IEndsWith => text(target, TextMatch::EndsWith, value, true)?,
                TextOp::In => membership(target, value, false),
                TextOp::NotIn => membership(target, value, true),
                TextOp::IsNull => null_test(target, value)?,
                TextOp::Regex => regex(target, value, false)?,
                TextOp::IRegex => regex(target, value, true)?,
            }),
            Self::Numeric(op, value) => Some(match op {
                NumericOp::Eq => equality(target, CompareOp::Eq, value),
                NumericOp::Neq => equality(target, CompareOp::Neq, value),
                NumericOp::Gt => compare(target, CompareOp::Gt, value),
                NumericOp::Gte => compare(target, CompareOp::Gte, value),
                NumericOp::Lt => compare(target, CompareOp::Lt, value),
                NumericOp::Lte => compare(target, CompareOp::Lte, value),
                NumericOp::In => membership(target, value, false),
                NumericOp::NotIn => membership(target, value, true),
                NumericOp::Between => between(target, value)?,
                NumericOp::IsNull => null_test(target, value)?,
            }),
            Self::Boolean(op, value) => Some(match op {
                BooleanOp::Eq => equality(target, CompareOp::Eq, value),
                BooleanOp::IsNull => null_test(target, value)?,
            }),
            Self::Temporal(op, value) => {
                let coerced = coerce_temporal(value.clone(), kind);
                match op {
                    TemporalOp::Eq => Some(equality(target, CompareOp::Eq, &coerced)),
                    TemporalOp::Neq => Some(equality(target, CompareOp::Neq, &coerced)),
                    TemporalOp::Gt => Some(compare(target, CompareOp::Gt, &coerced)),
                    TemporalOp::Gte => Some(compare(target, CompareOp::Gte, &coerced)),
                    TemporalOp::Lt => Some(compare(target, CompareOp::Lt, &coerced)),
                    TemporalOp::Lte => Some(compare(target, CompareOp::Lte, &coerced)),
                    TemporalOp::Between => between(target, &coerced),
                    TemporalOp::IsNull => null_test(target, value),
                    TemporalOp::Year
                    | TemporalOp::Month
                    | TemporalOp::Day
                    | TemporalOp::WeekDay
                    | TemporalOp::Hour => {
                        let part = op.date_part()?;
                        if part.needs_time() && !kind.has_time() {
                            debug!(operator = op.as_str(), "time part on a date field");
                            return None;
                        }
                        let Operand::Field(field) = target else {
                            return None;
                        };
                        let operand = Operand::DatePart {
                            field: field.clone(),
                            part,
                        };
                        integer_leaf(&operand, value, now)
                    }
                    TemporalOp::Today
                    | TemporalOp::Yesterday
                    | TemporalOp::ThisWeek
                    | TemporalOp::PastWeek
                    | TemporalOp::ThisMonth
                    | TemporalOp::PastMonth
                    | TemporalOp::ThisYear
                    | TemporalOp::PastYear => {
                        let period = op.shortcut()?.period(now);
                        let (start, end) = period.bounds(kind.has_time());
                        let end_op = if period.end_inclusive {
                            CompareOp::Lte
                        } else {
                            CompareOp::Lt
                        };
                        let inside = Predicate::And(vec![
                            Predicate::compare(target.clone(), CompareOp::Gte, start),
                            Predicate::compare(target.clone(), end_op, end),
                        ]);
                        match value.as_bool()? {
                            true => Some(inside),
                            false => Some(Predicate::not(inside)),
                        }
                    }
                }
            }
            Self::Identifier(op, value) => Some(match op {
                IdentifierOp::Eq => equality(target, CompareOp::Eq, value),
                IdentifierOp::Neq => equality(target, CompareOp::Neq, value),
                IdentifierOp::In => membership(target, value, false),
                IdentifierOp::NotIn => membership(target, value, true),
                IdentifierOp::IsNull => null_test(target, value)?,
            }),
            Self::Json(op, value) => Some(match op {
                JsonOp::Eq => equality(target, CompareOp::Eq, value),
                JsonOp::IsNull => null_test(target, value)?,
                JsonOp::HasKey => json_keys(target, value, KeyMatch::All)?,
                JsonOp::HasKeys => json_keys(target, value, KeyMatch::All)?,
                JsonOp::HasAnyKeys => json_keys(target, value, KeyMatch::Any)?,
            }),
            Self::Array(op, value) => match op {
                ArrayOp::Contains => Some(array(target, ArrayMatch::Contains, value)),
                ArrayOp::ContainedBy => Some(array(target, ArrayMatch::ContainedBy, value)),
                ArrayOp::Overlaps => Some(array(target, ArrayMatch::Overlaps, value)),
                ArrayOp::IsNull => null_test(target, value),
                ArrayOp::Length => {
                    let Operand::Field(field) = target else {
                        return None;
                    };
                    integer_leaf(&Operand::ArrayLength(field.clone()), value, now)
                }
            },
        }
    }
}

/// Parse a leaf against a family, skipping unknown operators with a debug log.
pub fn parse_leaf(family: OperatorFamily, leaf: &LeafFilter) -> Vec<Condition> {
    leaf.iter()
        .filter_map(|(name, operand)| {
            let condition = Condition::parse(family, name, operand);
            if condition.is_none() {
                debug!(
                    operator = name,
                    family = family.as_str(),
                    "skipping unknown operator or malformed operand"
                );
            }
            condition
        })
        .collect()
}

/// Lower a whole leaf: the AND of its conditions, or `None` if nothing applies.
pub fn leaf_predicate(
    leaf: &LeafFilter,
    target: &Operand,
    kind: &FieldKind,
    now: DateTime<Utc>,
) -> Option<Predicate> {
    let predicates = parse_leaf(kind.operator_family(), leaf)
        .iter()
        .filter_map(|condition| condition.to_predicate(target, kind, now))
        .collect::<Vec<_>>();
    Predicate::and(predicates)
}

fn scalar_fits(family: OperatorFamily, value: &FilterValue) -> bool {
    match family {
        OperatorFamily::Text => matches!(value, FilterValue::String(_)),
        OperatorFamily::Numeric => value.is_numeric(),
        OperatorFamily::Boolean => matches!(value, FilterValue::Bool(_)),
        OperatorFamily::Temporal => matches!(
            value,
            FilterValue::String(_) | FilterValue::Date(_) | FilterValue::DateTime(_)
        ),
        OperatorFamily::Identifier => {
            matches!(value, FilterValue::Int(_) | FilterValue::String(_))
        }
        OperatorFamily::Json => !matches!(value, FilterValue::List(_)),
        OperatorFamily::Array => !matches!(value, FilterValue::List(_) | FilterValue::Json(_)),
    }
}

fn normalize(family: OperatorFamily, shape: OperandShape, operand: &FilterValue) -> Option<FilterValue> {
    let fits = |v: &FilterValue| scalar_fits(family, v);
    match shape {
        OperandShape::Value => match operand {
            FilterValue::Null => Some(FilterValue::Null),
            FilterValue::List(_) if family == OperatorFamily::Json => {
                Some(FilterValue::Json(operand.to_json()))
            }
            v if fits(v) => Some(v.clone()),
            _ => None,
        },
        OperandShape::Ordered => fits(operand).then(|| operand.clone()),
        OperandShape::List => {
            let items = operand.clone().into_list();
            items
                .iter()
                .all(fits)
                .then_some(FilterValue::List(items))
        }
        OperandShape::Range => match operand.as_list() {
            Some([low, high]) if fits(low) && fits(high) => Some(operand.clone()),
            _ => None,
        },
        OperandShape::Flag => operand.as_bool().map(FilterValue::Bool),
        OperandShape::Pattern | OperandShape::Key => {
            operand.as_str().map(|s| FilterValue::String(s.to_string()))
        }
        OperandShape::Integer => match operand {
            FilterValue::Json(serde_json::Value::Object(_)) => Some(operand.clone()),
            v => v.as_i64().map(FilterValue::Int),
        },
        OperandShape::Keys => {
            let items = operand.clone().into_list();
            items
                .iter()
                .all(|item| item.as_str().is_some())
                .then_some(FilterValue::List(items))
        }
    }
}

fn coerce_temporal(value: FilterValue, kind: &FieldKind) -> FilterValue {
    if kind.has_time() {
        value.coerce_datetime()
    } else {
        value.coerce_date()
    }
}

fn equality(target: &Operand, op: CompareOp, value: &FilterValue) -> Predicate {
    if value.is_null() {
        return Predicate::is_null(target.clone(), op == CompareOp::Eq);
    }
    compare(target, op, value)
}

fn compare(target: &Operand, op: CompareOp, value: &FilterValue) -> Predicate {
    Predicate::compare(target.clone(), op, value.clone())
}

fn membership(target: &Operand, value: &FilterValue, negated: bool) -> Predicate {
    Predicate::In {
        operand: target.clone(),
        values: value.clone().into_list(),
        negated,
    }
}

fn between(target: &Operand, value: &FilterValue) -> Option<Predicate> {
    let [low, high] = value.as_list()? else {
        return None;
    };
    Some(Predicate::And(vec![
        compare(target, CompareOp::Gte, low),
        compare(target, CompareOp::Lte, high),
    ]))
}

fn null_test(target: &Operand, value: &FilterValue) -> Option<Predicate> {
    Some(Predicate::is_null(target.clone(), value.as_bool()?))
}

fn text(target: &Operand, kind: TextMatch, value: &FilterValue, case_insensitive: bool) -> Option<Predicate> {
    Some(Predicate::Text {
        operand: target.clone(),
        kind,
        value: value.as_str()?.to_string(),
        case_insensitive,
    })
}

fn regex(target: &Operand, value: &FilterValue, case_insensitive: bool) -> Option<Predicate> {
    Some(Predicate::Regex {
        operand: target.clone(),
        pattern: value.as_str()?.to_string(),
        case_insensitive,
    })
}

fn json_keys(target: &Operand, value: &FilterValue, mode: KeyMatch) -> Option<Predicate> {
    let keys = value
        .clone()
        .into_list()
        .iter()
        .map(|key| key.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()?;
    Some(Predicate::JsonKeys {
        operand: target.clone(),
        keys,
        mode,
    })
}

fn array(target: &Operand, kind: ArrayMatch, value: &FilterValue) -> Predicate {
    Predicate::Array {
        operand: target.clone(),
        kind,
        values: value.clone().into_list(),
    }
}

/// An integer operand is equality; an object is a numeric leaf.
fn integer_leaf(operand: &Operand, value: &FilterValue, now: DateTime<Utc>) -> Option<Predicate> {
    match value {
        FilterValue::Int(_) => Some(compare(operand, CompareOp::Eq, value)),
        FilterValue::Json(json) => {
            leaf_predicate(&LeafFilter::from_json(json), operand, &FieldKind::Int, now)
        }
        _ => None,
    }
}
