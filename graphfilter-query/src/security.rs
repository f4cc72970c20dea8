//! Filter tree limits: regex safety, nesting depth and clause count.
//!
//! Every filter passes through [`SecurityValidator::validate`] before the
//! applicator compiles it. A violation is fatal to the request.
//!
//! ```rust
//! use graphfilter_query::ast::FilterNode;
//! use graphfilter_query::config::SecurityLimits;
//! use graphfilter_query::security::SecurityValidator;
//! use graphfilter_query::SecurityError;
//! use serde_json::json;
//!
//! let validator = SecurityValidator::new(&SecurityLimits::default());
//!
//! let safe = FilterNode::parse(&json!({"name": {"regex": "^lamp"}})).unwrap();
//! assert!(validator.validate(&safe).is_ok());
//!
//! let nested = FilterNode::parse(&json!({"name": {"regex": "(a+)+"}})).unwrap();
//! assert!(matches!(
//!     validator.validate(&nested),
//!     Err(SecurityError::UnsafePattern { .. })
//! ));
//! ```

use regex_lite::Regex;
use std::iter::Peekable;
use std::str::Chars;
use tracing::debug;

use crate::ast::FilterNode;
use crate::config::SecurityLimits;
use crate::error::SecurityError;

/// Summary of a group body seen by [`backtracking_shape`].
#[derive(Debug, Default, Clone, Copy)]
struct Group {
    /// The body repeats something without an upper bound.
    unbounded: bool,
    /// The body has an alternation.
    alternation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repetition {
    /// `?`, `{n}`, `{n,1}`.
    Bounded,
    /// `{n,m}` with `m > 1`.
    Counted,
    /// `*`, `+`, `{n,}`.
    Unbounded,
}

/// Find a shape prone to catastrophic backtracking: a repeated group whose
/// body, at any nesting level, repeats without bound or alternates.
///
/// The pattern must already compile.
fn backtracking_shape(pattern: &str) -> Option<&'static str> {
    let mut chars = pattern.chars().peekable();
    let mut stack = vec![Group::default()];
    let mut closed: Option<Group> = None;

    while let Some(c) = chars.next() {
        let repetition = match c {
            '*' | '+' => Some(Repetition::Unbounded),
            '?' => Some(Repetition::Bounded),
            '{' => counted_repetition(&mut chars),
            _ => None,
        };
        if let Some(repetition) = repetition {
            if let Some(group) = closed.take() {
                match repetition {
                    Repetition::Unbounded if group.unbounded => {
                        return Some("nested unbounded quantifiers");
                    }
                    Repetition::Unbounded if group.alternation => {
                        return Some("alternation under an unbounded quantifier");
                    }
                    Repetition::Counted if group.unbounded => {
                        return Some("quantified group under a counted repetition");
                    }
                    _ => {}
                }
            }
            if repetition == Repetition::Unbounded {
                if let Some(top) = stack.last_mut() {
                    top.unbounded = true;
                }
            }
            continue;
        }

        closed = None;
        match c {
            '\\' => skip_escape(&mut chars),
            '[' => skip_class(&mut chars),
            '(' => {
                skip_group_prefix(&mut chars);
                stack.push(Group::default());
            }
            ')' if stack.len() > 1 => {
                if let Some(group) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.unbounded |= group.unbounded;
                        parent.alternation |= group.alternation;
                    }
                    closed = Some(group);
                }
            }
            '|' => {
                if let Some(top) = stack.last_mut() {
                    top.alternation = true;
                }
            }
            _ => {}
        }
    }
    None
}

type PatternChars<'p> = Peekable<Chars<'p>>;

/// Parse the rest of `{n}`, `{n,}` or `{n,m}`. A brace that does not open a
/// repetition is left alone and reads as a literal.
fn counted_repetition(chars: &mut PatternChars<'_>) -> Option<Repetition> {
    let mut probe = chars.clone();
    let mut body = String::new();
    loop {
        match probe.next()? {
            '}' => break,
            c => body.push(c),
        }
    }
    let (min, max) = match body.split_once(',') {
        Some((min, max)) => (min, Some(max.trim())),
        None => (body.as_str(), None),
    };
    min.trim().parse::<u32>().ok()?;
    let repetition = match max {
        None => Repetition::Bounded,
        Some("") => Repetition::Unbounded,
        Some(max) => match max.parse::<u32>().ok()? {
            0 | 1 => Repetition::Bounded,
            _ => Repetition::Counted,
        },
    };
    *chars = probe;
    Some(repetition)
}

fn skip_escape(chars: &mut PatternChars<'_>) {
    if let Some(c) = chars.next() {
        if matches!(c, 'p' | 'P' | 'x' | 'u' | 'U') && chars.peek() == Some(&'{') {
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
            }
        }
    }
}

fn skip_class(chars: &mut PatternChars<'_>) {
    if chars.peek() == Some(&'^') {
        chars.next();
    }
    if chars.peek() == Some(&']') {
        chars.next();
    }
    let mut depth = 1usize;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
            _ => {}
        }
    }
}

/// Skip `?:`, `?i:`, `?P<name>` and the like after an opening parenthesis.
/// A bare flag group such as `(?i)` keeps its closing parenthesis.
fn skip_group_prefix(chars: &mut PatternChars<'_>) {
    if chars.peek() != Some(&'?') {
        return;
    }
    chars.next();
    while let Some(&c) = chars.peek() {
        match c {
            ':' | '>' => {
                chars.next();
                return;
            }
            ')' => return,
            _ => {
                chars.next();
            }
        }
    }
}

/// Validates filter trees against [`SecurityLimits`].
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    limits: SecurityLimits,
}

impl SecurityValidator {
    /// Create a validator.
    pub fn new(limits: &SecurityLimits) -> Self {
        Self {
            limits: limits.clone(),
        }
    }

    /// The limits enforced.
    pub fn limits(&self) -> &SecurityLimits {
        &self.limits
    }

    /// Validate a tree. Patterns are checked first, then depth, then clause count.
    pub fn validate(&self, node: &FilterNode) -> Result<(), SecurityError> {
        self.check_patterns(node)?;

        let depth = max_depth(node);
        if depth > self.limits.max_filter_depth {
            return Err(SecurityError::DepthExceeded {
                depth,
                max: self.limits.max_filter_depth,
            });
        }

        let count = clause_count(node);
        if count > self.limits.max_clauses {
            return Err(SecurityError::TooManyClauses {
                count,
                max: self.limits.max_clauses,
            });
        }

        debug!(depth, clauses = count, "filter passed security validation");
        Ok(())
    }

    /// Check a single regex operand.
    pub fn check_pattern(&self, pattern: &str) -> Result<(), SecurityError> {
        let length = pattern.chars().count();
        if length > self.limits.max_regex_length {
            return Err(SecurityError::PatternTooLong {
                length,
                max: self.limits.max_regex_length,
            });
        }

        if let Err(e) = Regex::new(pattern) {
            return Err(SecurityError::UnsafePattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            });
        }

        if let Some(reason) = backtracking_shape(pattern) {
            return Err(SecurityError::UnsafePattern {
                pattern: pattern.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(())
    }

    fn check_patterns(&self, node: &FilterNode) -> Result<(), SecurityError> {
        for (_, entry) in node.iter() {
            for leaf in entry.leaves() {
                for pattern in leaf.regex_patterns() {
                    self.check_pattern(pattern)?;
                }
            }
            for child in entry.children() {
                self.check_patterns(child)?;
            }
        }
        Ok(())
    }
}

/// Deepest nesting level. The root is level 0, every nested node one more.
pub fn max_depth(node: &FilterNode) -> usize {
    node.iter()
        .flat_map(|(_, entry)| entry.children())
        .map(|child| 1 + max_depth(child))
        .max()
        .unwrap_or(0)
}

/// Number of entries across the whole tree.
pub fn clause_count(node: &FilterNode) -> usize {
    node.iter()
        .map(|(_, entry)| 1 + entry.children().into_iter().map(clause_count).sum::<usize>())
        .sum()
}

/// Regex operands anywhere in the tree.
pub(crate) fn count_patterns(node: &FilterNode) -> usize {
    node.iter()
        .map(|(_, entry)| {
            let own: usize = entry.leaves().iter().map(|l| l.regex_patterns().len()).sum();
            own + entry.children().into_iter().map(count_patterns).sum::<usize>()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn validator() -> SecurityValidator {
        SecurityValidator::new(&SecurityLimits::default())
    }

    fn node(value: serde_json::Value) -> FilterNode {
        FilterNode::parse(&value).unwrap()
    }

    #[test]
    fn test_denylisted_shapes() {
        let v = validator();
        for pattern in [
            "(a+)+",
            "(.*)+",
            "(.+)+",
            "(.*)*",
            "(a*){2,}",
            "(a*){2,5}",
            "(a|b)+",
            "((a+))+",
            "((ab)*)*",
            "((a|aa))+",
            "(a{1,})+",
            "(?:a+)+",
            r"(?P<word>\w+)*",
            "x(y(z+)w)*",
        ] {
            assert!(
                matches!(v.check_pattern(pattern), Err(SecurityError::UnsafePattern { .. })),
                "{} should be rejected",
                pattern
            );
        }
        for pattern in [
            "^abc$",
            "[a-z]+",
            "a{2,5}",
            "(ab)c",
            "(?:ab)+",
            "(a+)b",
            "(a*){3}",
            "[(a+)]+",
            r"\(a+\)+",
            r"(?i)lamp\d{2,}",
        ] {
            assert_eq!(v.check_pattern(pattern), Ok(()));
        }
    }

    #[test]
    fn test_uncompilable_pattern() {
        assert!(matches!(
            validator().check_pattern("(unclosed"),
            Err(SecurityError::UnsafePattern { .. })
        ));
    }

    #[test]
    fn test_pattern_length_checked_first() {
        let long = "(a+)+".repeat(200);
        assert_eq!(
            validator().check_pattern(&long),
            Err(SecurityError::PatternTooLong {
                length: 1000,
                max: 500
            })
        );
    }

    #[test]
    fn test_patterns_found_in_nested_scopes() {
        let v = validator();
        let trees = [
            json!({"OR": [{"name": {"iregex": "(a+)+"}}]}),
            json!({"reviews_some": {"body": {"regex": "(a+)+"}}}),
            json!({"_exists": {"relation": "reviews", "condition": {"body": {"regex": "(.*)*"}}}}),
            json!({"reviews_cond_agg": {
                "field": "rating",
                "avg": {"gte": 4},
                "condition": {"body": {"regex": "(x|y)+"}}
            }}),
            json!({"created_extract": {"part": "year", "filter": {"regex": "(a+)+"}}}),
        ];
        for tree in trees {
            assert!(v.validate(&node(tree.clone())).is_err(), "{} should be rejected", tree);
        }
    }

    #[test]
    fn test_depth() {
        let tree = node(json!({"NOT": {"AND": [{"reviews_some": {"rating": 5}}]}}));
        assert_eq!(max_depth(&tree), 3);

        let limits = SecurityLimits {
            max_filter_depth: 2,
            ..SecurityLimits::default()
        };
        assert_eq!(
            SecurityValidator::new(&limits).validate(&tree),
            Err(SecurityError::DepthExceeded { depth: 3, max: 2 })
        );
    }

    #[test]
    fn test_clause_count_boundary() {
        let limits = SecurityLimits {
            max_clauses: 3,
            ..SecurityLimits::default()
        };
        let v = SecurityValidator::new(&limits);

        let at_max = node(json!({"a": 1, "OR": [{"b": 2}]}));
        assert_eq!(clause_count(&at_max), 3);
        assert_eq!(v.validate(&at_max), Ok(()));

        let over = node(json!({"a": 1, "OR": [{"b": 2}, {"c": 3}]}));
        assert_eq!(
            v.validate(&over),
            Err(SecurityError::TooManyClauses { count: 4, max: 3 })
        );
    }

    #[test]
    fn test_leaf_operators_do_not_count() {
        let tree = node(json!({"price": {"gt": 1, "lt": 10, "neq": 5}}));
        assert_eq!(clause_count(&tree), 1);
        assert_eq!(count_patterns(&tree), 0);
    }
}
