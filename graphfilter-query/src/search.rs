//! Full-text search modes and query matching.
//!
//! A `search` filter builds a `search_vector` projection over the entity's
//! search fields, matches it against the query and optionally filters on
//! `search_rank`.

use serde::{Deserialize, Serialize};

/// How the search query text is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Match all words (plainto_tsquery).
    #[default]
    Plain,
    /// Match the exact phrase (phraseto_tsquery).
    Phrase,
    /// Web-search syntax with quotes, `or` and `-` (websearch_to_tsquery).
    Websearch,
    /// Raw tsquery syntax (to_tsquery).
    Raw,
}

impl SearchMode {
    /// Get the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Phrase => "phrase",
            Self::Websearch => "websearch",
            Self::Raw => "raw",
        }
    }

    /// Get the PostgreSQL query constructor.
    pub fn to_postgres_function(&self) -> &'static str {
        match self {
            Self::Plain => "plainto_tsquery",
            Self::Phrase => "phraseto_tsquery",
            Self::Websearch => "websearch_to_tsquery",
            Self::Raw => "to_tsquery",
        }
    }

    /// Match a query against a document with simple word semantics.
    ///
    /// Used by in-memory evaluation; stemming and ranking are not modelled.
    pub fn matches(&self, document: &str, query: &str) -> bool {
        let document = document.to_lowercase();
        let query = query.to_lowercase();
        let words: Vec<&str> = document.split(|c: char| !c.is_alphanumeric()).collect();

        match self {
            Self::Phrase => {
                let terms: Vec<&str> = query.split_whitespace().collect();
                !terms.is_empty()
                    && words
                        .windows(terms.len())
                        .any(|window| window == terms.as_slice())
            }
            Self::Plain | Self::Raw => query
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
                .all(|term| words.contains(&term)),
            Self::Websearch => query.split(" or ").any(|alternative| {
                alternative.split_whitespace().all(|term| match term.strip_prefix('-') {
                    Some(excluded) => !words.contains(&excluded),
                    None => words.contains(&term.trim_matches('"')),
                })
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_mode_serde() {
        let mode: SearchMode = serde_json::from_str(r#""websearch""#).unwrap();
        assert_eq!(mode, SearchMode::Websearch);
        assert_eq!(SearchMode::default(), SearchMode::Plain);
        assert_eq!(SearchMode::Phrase.to_postgres_function(), "phraseto_tsquery");
    }

    #[test]
    fn test_plain_matches_all_words() {
        assert!(SearchMode::Plain.matches("The quick brown fox", "fox quick"));
        assert!(!SearchMode::Plain.matches("The quick brown fox", "fox lazy"));
    }

    #[test]
    fn test_phrase_matches_in_order() {
        assert!(SearchMode::Phrase.matches("The quick brown fox", "quick brown"));
        assert!(!SearchMode::Phrase.matches("The quick brown fox", "brown quick"));
    }

    #[test]
    fn test_websearch() {
        assert!(SearchMode::Websearch.matches("red apple pie", "apple -pear"));
        assert!(!SearchMode::Websearch.matches("red apple pear", "apple -pear"));
        assert!(SearchMode::Websearch.matches("banana bread", "apple or banana"));
    }
}
