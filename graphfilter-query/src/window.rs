//! Ranking window functions used by `_window` filters.
//!
//! A `_window` entry ranks every base row inside its partition and then
//! filters on the rank:
//!
//! ```rust
//! use graphfilter_query::window::{WindowFunction, WindowSpec};
//! use graphfilter_query::types::OrderKey;
//!
//! let spec = WindowSpec::new()
//!     .partition_by(["category"])
//!     .order_by(OrderKey::desc("price"));
//!
//! assert_eq!(
//!     format!("{}() {}", WindowFunction::Rank.as_sql(), spec),
//!     "RANK() OVER (PARTITION BY category ORDER BY price DESC)"
//! );
//! ```

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

use crate::types::{OrderKey, order_fragment};

/// Available ranking functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    /// RANK() - Rank with gaps.
    Rank,
    /// DENSE_RANK() - Rank without gaps.
    DenseRank,
    /// ROW_NUMBER() - Sequential row number.
    RowNumber,
    /// PERCENT_RANK() - Relative rank (0 to 1).
    PercentRank,
}

impl WindowFunction {
    /// Every ranking function.
    pub const ALL: [WindowFunction; 4] = [
        Self::Rank,
        Self::DenseRank,
        Self::RowNumber,
        Self::PercentRank,
    ];

    /// Get the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rank => "rank",
            Self::DenseRank => "dense_rank",
            Self::RowNumber => "row_number",
            Self::PercentRank => "percent_rank",
        }
    }

    /// Get the SQL function name.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Rank => "RANK",
            Self::DenseRank => "DENSE_RANK",
            Self::RowNumber => "ROW_NUMBER",
            Self::PercentRank => "PERCENT_RANK",
        }
    }

    /// Check if the function yields a fraction rather than an integer.
    pub fn is_fractional(&self) -> bool {
        matches!(self, Self::PercentRank)
    }
}

/// The OVER clause of a window projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSpec {
    /// PARTITION BY fields.
    pub partition_by: Vec<SmolStr>,
    /// ORDER BY keys.
    pub order_by: Vec<OrderKey>,
}

impl WindowSpec {
    /// Create an empty window specification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add partition fields.
    pub fn partition_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        self.partition_by.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Add an ordering key.
    pub fn order_by(mut self, key: OrderKey) -> Self {
        self.order_by.push(key);
        self
    }

    /// Name suffix for the projection (`_by_<partition>_order_<order>`).
    pub fn name_suffix(&self) -> String {
        let mut suffix = String::new();
        if !self.partition_by.is_empty() {
            suffix.push_str("_by_");
            suffix.push_str(&self.partition_by.join("_"));
        }
        if !self.order_by.is_empty() {
            suffix.push_str("_order_");
            suffix.push_str(&order_fragment(&self.order_by));
        }
        suffix
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OVER (")?;
        let mut wrote = false;
        if !self.partition_by.is_empty() {
            write!(f, "PARTITION BY {}", self.partition_by.join(", "))?;
            wrote = true;
        }
        if !self.order_by.is_empty() {
            if wrote {
                write!(f, " ")?;
            }
            let keys: Vec<String> = self.order_by.iter().map(ToString::to_string).collect();
            write!(f, "ORDER BY {}", keys.join(", "))?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_function_serde() {
        let f: WindowFunction = serde_json::from_str(r#""dense_rank""#).unwrap();
        assert_eq!(f, WindowFunction::DenseRank);
        assert!(serde_json::from_str::<WindowFunction>(r#""ntile""#).is_err());
    }

    #[test]
    fn test_name_suffix() {
        let spec = WindowSpec::new()
            .partition_by(["category"])
            .order_by(OrderKey::desc("price"));
        assert_eq!(spec.name_suffix(), "_by_category_order_price_desc");
        assert_eq!(WindowSpec::new().name_suffix(), "");
    }

    #[test]
    fn test_display_without_partition() {
        let spec = WindowSpec::new().order_by(OrderKey::asc("created_at"));
        assert_eq!(spec.to_string(), "OVER (ORDER BY created_at ASC)");
    }
}
