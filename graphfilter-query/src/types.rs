//! Ordering types shared by window and subquery filters.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// Sort order for an ordering key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending order (A-Z, 0-9, oldest first).
    #[default]
    Asc,
    /// Descending order (Z-A, 9-0, newest first).
    Desc,
}

impl SortOrder {
    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// A single ordering key, written `"price"` or `"-price"` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderKey {
    /// The field to order by.
    pub field: SmolStr,
    /// The sort order.
    pub order: SortOrder,
}

impl OrderKey {
    /// Ascending order on a field.
    pub fn asc(field: impl Into<SmolStr>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    /// Descending order on a field.
    pub fn desc(field: impl Into<SmolStr>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }

    /// Parse the wire form. A leading `-` means descending.
    pub fn parse(s: &str) -> Option<Self> {
        let (field, order) = match s.strip_prefix('-') {
            Some(rest) => (rest, SortOrder::Desc),
            None => (s.strip_prefix('+').unwrap_or(s), SortOrder::Asc),
        };
        if field.is_empty() {
            return None;
        }
        Some(Self {
            field: SmolStr::new(field),
            order,
        })
    }

    /// Name fragment used when naming projections (`price` or `price_desc`).
    pub fn name_fragment(&self) -> String {
        match self.order {
            SortOrder::Asc => self.field.to_string(),
            SortOrder::Desc => format!("{}_desc", self.field),
        }
    }
}

impl TryFrom<String> for OrderKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid ordering key `{}`", value))
    }
}

impl From<OrderKey> for String {
    fn from(key: OrderKey) -> Self {
        match key.order {
            SortOrder::Asc => key.field.to_string(),
            SortOrder::Desc => format!("-{}", key.field),
        }
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.order)
    }
}

/// Join ordering keys into a projection name fragment.
pub(crate) fn order_fragment(keys: &[OrderKey]) -> String {
    keys.iter()
        .map(OrderKey::name_fragment)
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_key_parse() {
        assert_eq!(OrderKey::parse("-price"), Some(OrderKey::desc("price")));
        assert_eq!(OrderKey::parse("name"), Some(OrderKey::asc("name")));
        assert_eq!(OrderKey::parse("+name"), Some(OrderKey::asc("name")));
        assert_eq!(OrderKey::parse("-"), None);
        assert_eq!(OrderKey::parse(""), None);
    }

    #[test]
    fn test_order_key_serde() {
        let keys: Vec<OrderKey> = serde_json::from_str(r#"["-created_at", "id"]"#).unwrap();
        assert_eq!(keys, vec![OrderKey::desc("created_at"), OrderKey::asc("id")]);
        assert_eq!(serde_json::to_string(&keys).unwrap(), r#"["-created_at","id"]"#);
    }

    #[test]
    fn test_order_fragment() {
        let keys = vec![OrderKey::desc("price"), OrderKey::asc("name")];
        assert_eq!(order_fragment(&keys), "price_desc_name");
        assert_eq!(keys[0].to_string(), "price DESC");
    }
}
