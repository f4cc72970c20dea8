//! Error types for filter validation and compilation.
//!
//! Only two things can fail a compile: a filter tree rejected by the
//! [`SecurityValidator`](crate::security::SecurityValidator) and a root value
//! that is not a filter object at all. Everything else (unknown operators,
//! unresolvable fields or relations, disabled feature keys) is skipped per key
//! with a debug log.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: F{category}{number}
//! - 1xxx: Filter shape errors
//! - 2xxx: Security limit violations
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use graphfilter_query::{ErrorCode, FilterError, SecurityError};
//!
//! let err: FilterError = SecurityError::TooManyClauses { count: 51, max: 50 }.into();
//! assert_eq!(err.code, ErrorCode::TooManyClauses);
//! assert_eq!(err.code.code(), "F2004");
//! ```

use std::fmt;
use thiserror::Error;

/// Result type for filter operations.
pub type FilterResult<T> = Result<T, FilterError>;

/// A filter tree rejected by the security validator.
///
/// Always fatal to the request. Each variant reports the offending metric.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// A regex operand is longer than allowed.
    #[error("regex pattern is {length} characters long, maximum is {max}")]
    PatternTooLong { length: usize, max: usize },

    /// A regex operand does not compile or has a catastrophic-backtracking shape.
    #[error("unsafe regex pattern `{pattern}`: {reason}")]
    UnsafePattern { pattern: String, reason: String },

    /// The filter tree nests deeper than allowed.
    #[error("filter depth {depth} exceeds maximum of {max}")]
    DepthExceeded { depth: usize, max: usize },

    /// The filter tree has more clauses than allowed.
    #[error("filter has {count} clauses, maximum is {max}")]
    TooManyClauses { count: usize, max: usize },
}

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Filter errors (1xxx)
    /// Invalid filter tree (F1001).
    InvalidFilter = 1001,
    /// Unknown entity (F1002).
    UnknownEntity = 1002,

    // Security errors (2xxx)
    /// Regex pattern too long (F2001).
    PatternTooLong = 2001,
    /// Unsafe regex pattern (F2002).
    UnsafePattern = 2002,
    /// Filter nested too deeply (F2003).
    DepthExceeded = 2003,
    /// Too many clauses (F2004).
    TooManyClauses = 2004,

    // Configuration errors (7xxx)
    /// Invalid configuration (F7001).
    InvalidConfiguration = 7001,
    /// Configuration file could not be loaded (F7002).
    ConfigurationLoad = 7002,

    // Internal errors (9xxx)
    /// Internal error (F9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "F1001").
    pub fn code(&self) -> String {
        format!("F{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidFilter => "Invalid filter",
            Self::UnknownEntity => "Unknown entity",
            Self::PatternTooLong => "Regex pattern too long",
            Self::UnsafePattern => "Unsafe regex pattern",
            Self::DepthExceeded => "Filter too deeply nested",
            Self::TooManyClauses => "Too many filter clauses",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::ConfigurationLoad => "Configuration could not be loaded",
            Self::Internal => "Internal error",
        }
    }

    /// Check if this code reports a security limit violation.
    pub fn is_security(&self) -> bool {
        (2000..3000).contains(&(*self as u16))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Suggestion for fixing an error.
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The suggestion text.
    pub text: String,
}

impl Suggestion {
    /// Create a new suggestion.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The entity the filter targets.
    pub entity: Option<String>,
    /// The filter key involved.
    pub key: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<Suggestion>,
}

/// Errors that can occur while validating or compiling a filter.
#[derive(Error, Debug)]
pub struct FilterError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl FilterError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Set the entity.
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.context.entity = Some(entity.into());
        self
    }

    /// Set the filter key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.context.key = Some(key.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(suggestion));
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create an invalid filter error.
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFilter, message)
            .with_suggestion("Pass a JSON object mapping filter keys to conditions")
    }

    /// Create an unknown entity error.
    pub fn unknown_entity(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self::new(ErrorCode::UnknownEntity, format!("Entity `{}` is not in the catalog", entity))
            .with_entity(entity)
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Check if this error is a security limit violation.
    pub fn is_security(&self) -> bool {
        self.code.is_security()
    }

    /// Get the security error this error was created from, if any.
    pub fn security_error(&self) -> Option<&SecurityError> {
        self.source.as_ref()?.downcast_ref::<SecurityError>()
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref entity) = self.context.entity {
            output.push_str(&format!("  → Entity: {}\n", entity));
        }
        if let Some(ref key) = self.context.key {
            output.push_str(&format!("  → Key: {}\n", key));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion.text));
            }
        }

        output
    }
}

impl From<SecurityError> for FilterError {
    fn from(err: SecurityError) -> Self {
        let (code, suggestion) = match &err {
            SecurityError::PatternTooLong { .. } => {
                (ErrorCode::PatternTooLong, "Shorten the regex pattern")
            }
            SecurityError::UnsafePattern { .. } => (
                ErrorCode::UnsafePattern,
                "Avoid nested quantifiers such as `(a+)+` and quantified alternations",
            ),
            SecurityError::DepthExceeded { .. } => {
                (ErrorCode::DepthExceeded, "Flatten nested AND/OR/NOT groups or relation filters")
            }
            SecurityError::TooManyClauses { .. } => {
                (ErrorCode::TooManyClauses, "Split the filter into fewer conditions")
            }
        };
        Self::new(code, err.to_string())
            .with_suggestion(suggestion)
            .with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::InvalidFilter.code(), "F1001");
        assert_eq!(ErrorCode::DepthExceeded.code(), "F2003");
        assert_eq!(ErrorCode::InvalidConfiguration.to_string(), "F7001");
    }

    #[test]
    fn test_security_error_conversion() {
        let err: FilterError = SecurityError::DepthExceeded { depth: 12, max: 10 }.into();
        assert_eq!(err.code, ErrorCode::DepthExceeded);
        assert!(err.is_security());
        assert_eq!(err.message, "filter depth 12 exceeds maximum of 10");
        assert_eq!(
            err.security_error(),
            Some(&SecurityError::DepthExceeded { depth: 12, max: 10 })
        );
    }

    #[test]
    fn test_pattern_errors_have_distinct_codes() {
        let long: FilterError = SecurityError::PatternTooLong { length: 501, max: 500 }.into();
        let unsafe_pattern: FilterError = SecurityError::UnsafePattern {
            pattern: "(a+)+".into(),
            reason: "nested quantifier".into(),
        }
        .into();
        assert_ne!(long.code, unsafe_pattern.code);
    }

    #[test]
    fn test_display_full() {
        let err = FilterError::invalid_filter("root must be an object")
            .with_entity("Product")
            .with_key("AND");
        let output = err.display_full();
        assert!(output.contains("F1001"));
        assert!(output.contains("Entity: Product"));
        assert!(output.contains("Key: AND"));
        assert!(output.contains("Suggestions:"));
    }

    #[test]
    fn test_unknown_entity() {
        let err = FilterError::unknown_entity("Widget");
        assert_eq!(err.code, ErrorCode::UnknownEntity);
        assert!(!err.is_security());
        assert_eq!(err.context.entity.as_deref(), Some("Widget"));
    }
}
