//! Compiler settings, loaded from `graphfilter.toml` or built in code.
//!
//! ```rust
//! use graphfilter_query::FilterSettings;
//!
//! let settings = FilterSettings::from_str(r#"
//!     [limits]
//!     max_clauses = 20
//!
//!     [features]
//!     window = true
//! "#).unwrap();
//!
//! assert_eq!(settings.limits.max_clauses, 20);
//! assert_eq!(settings.limits.max_filter_depth, 10);
//! assert!(settings.features.window);
//! assert!(!settings.features.full_text);
//! ```

use graphfilter_schema::expand_env_vars;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ErrorCode, FilterError, FilterResult};

/// Top-level compiler settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSettings {
    /// Security limits applied before compilation.
    #[serde(default)]
    pub limits: SecurityLimits,

    /// Type generation settings.
    #[serde(default)]
    pub schema: SchemaSettings,

    /// Advanced operator families.
    #[serde(default)]
    pub features: FeatureFlags,

    /// Full-text search settings.
    #[serde(default)]
    pub search: SearchSettings,
}

impl FilterSettings {
    /// Settings with every advanced operator family enabled.
    pub fn all_features() -> Self {
        Self {
            features: FeatureFlags::all(),
            ..Self::default()
        }
    }

    /// Load settings from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> FilterResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FilterError::new(
                ErrorCode::ConfigurationLoad,
                format!("failed to read {}", path.display()),
            )
            .with_source(e)
        })?;

        Self::from_str(&content)
    }

    /// Parse settings from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> FilterResult<Self> {
        let expanded = expand_env_vars(content);

        let settings: Self = toml::from_str(&expanded).map_err(|e| {
            FilterError::new(ErrorCode::ConfigurationLoad, "failed to parse TOML").with_source(e)
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would make every filter fail.
    pub fn validate(&self) -> FilterResult<()> {
        if self.limits.max_regex_length == 0 {
            return Err(FilterError::invalid_configuration(
                "limits.max_regex_length must be greater than zero",
            ));
        }
        if self.limits.max_clauses == 0 {
            return Err(FilterError::invalid_configuration(
                "limits.max_clauses must be greater than zero",
            ));
        }
        if self.schema.cache_max_size == 0 {
            return Err(FilterError::invalid_configuration(
                "schema.cache_max_size must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Set the relation depth limit.
    pub fn with_max_relation_depth(mut self, depth: usize) -> Self {
        self.schema.max_relation_depth = depth;
        self
    }

    /// Replace the security limits.
    pub fn with_limits(mut self, limits: SecurityLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the feature flags.
    pub fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }
}

/// Limits enforced by the security validator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityLimits {
    /// Maximum length of a regex operand.
    #[serde(default = "default_max_regex_length")]
    pub max_regex_length: usize,

    /// Maximum combinator and relation nesting depth.
    #[serde(default = "default_max_filter_depth")]
    pub max_filter_depth: usize,

    /// Maximum number of clauses across the whole tree.
    #[serde(default = "default_max_clauses")]
    pub max_clauses: usize,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_regex_length: default_max_regex_length(),
            max_filter_depth: default_max_filter_depth(),
            max_clauses: default_max_clauses(),
        }
    }
}

fn default_max_regex_length() -> usize {
    500
}

fn default_max_filter_depth() -> usize {
    10
}

fn default_max_clauses() -> usize {
    50
}

/// Type generation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSettings {
    /// Maximum number of relation hops a filter may traverse.
    #[serde(default = "default_max_relation_depth")]
    pub max_relation_depth: usize,

    /// Number of generated schemas kept before eviction starts.
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            max_relation_depth: default_max_relation_depth(),
            cache_max_size: default_cache_max_size(),
        }
    }
}

fn default_max_relation_depth() -> usize {
    3
}

fn default_cache_max_size() -> usize {
    1000
}

/// Switches for the advanced operator families. All off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureFlags {
    /// `_window` ranking filters.
    #[serde(default)]
    pub window: bool,
    /// `_subquery` correlated lookups.
    #[serde(default)]
    pub subquery: bool,
    /// `_exists` filters.
    #[serde(default)]
    pub exists: bool,
    /// Array field operators.
    #[serde(default)]
    pub array: bool,
    /// `<field>_trunc` filters.
    #[serde(default)]
    pub date_trunc: bool,
    /// `<field>_extract` filters.
    #[serde(default)]
    pub date_extract: bool,
    /// `search` full-text filters.
    #[serde(default)]
    pub full_text: bool,
    /// `<relation>_cond_agg` filters.
    #[serde(default)]
    pub conditional_aggregation: bool,
}

impl FeatureFlags {
    /// Every family enabled.
    pub fn all() -> Self {
        Self {
            window: true,
            subquery: true,
            exists: true,
            array: true,
            date_trunc: true,
            date_extract: true,
            full_text: true,
            conditional_aggregation: true,
        }
    }
}

/// Full-text search settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SearchSettings {
    /// Default text search configuration (language).
    #[serde(default = "default_search_config")]
    pub config: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            config: default_search_config(),
        }
    }
}

fn default_search_config() -> String {
    "english".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = FilterSettings::default();
        assert_eq!(settings.limits.max_regex_length, 500);
        assert_eq!(settings.limits.max_filter_depth, 10);
        assert_eq!(settings.limits.max_clauses, 50);
        assert_eq!(settings.schema.max_relation_depth, 3);
        assert_eq!(settings.features, FeatureFlags::default());
        assert_eq!(settings.search.config, "english");
    }

    #[test]
    fn test_parse_settings() {
        let settings = FilterSettings::from_str(
            r#"
            [schema]
            max_relation_depth = 2

            [features]
            conditional_aggregation = true
            date_trunc = true

            [search]
            config = "simple"
        "#,
        )
        .unwrap();

        assert_eq!(settings.schema.max_relation_depth, 2);
        assert_eq!(settings.schema.cache_max_size, 1000);
        assert!(settings.features.conditional_aggregation);
        assert!(settings.features.date_trunc);
        assert!(!settings.features.window);
        assert_eq!(settings.search.config, "simple");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = FilterSettings::from_str("[limits]\nmax_things = 3\n").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigurationLoad);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = FilterSettings::from_str("[limits]\nmax_clauses = 0\n").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfiguration);
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: Test runs in isolation
        unsafe {
            std::env::set_var("GRAPHFILTER_TEST_MAX_DEPTH", "4");
        }
        let settings =
            FilterSettings::from_str("[limits]\nmax_filter_depth = ${GRAPHFILTER_TEST_MAX_DEPTH}\n")
                .unwrap();
        assert_eq!(settings.limits.max_filter_depth, 4);
    }

    #[test]
    fn test_all_features() {
        let settings = FilterSettings::all_features();
        assert!(settings.features.window);
        assert!(settings.features.array);
        assert_eq!(settings.limits, SecurityLimits::default());
    }
}
