//! Ranked text matching over catalog entries.
//!
//! Matching is tiered rather than scored: an entry lands in the best tier it
//! qualifies for and ties inside a tier are broken alphabetically.

use crate::error::{BridgeError, BridgeResult};
use serde::Serialize;
use std::cmp::Ordering;
use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 50;

/// How an entry matched the query. Lower is better.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchTier {
    Exact,
    Prefix,
    Substring,
    Description,
}

/// Normalized search input.
#[derive(Debug, Clone)]
pub struct NormalizedQuery {
    pub text: String,
    pub words: Vec<String>,
}

impl NormalizedQuery {
    pub fn parse(raw: &str) -> BridgeResult<Self> {
        let text = normalize(raw);
        if text.is_empty() {
            return Err(BridgeError::validation("query must not be empty"));
        }
        let words = text.unicode_words().map(|w| w.to_string()).collect();
        Ok(Self { text, words })
    }
}

/// Validate and default a page request.
pub fn check_limit(limit: Option<usize>) -> BridgeResult<usize> {
    match limit {
        None => Ok(DEFAULT_SEARCH_LIMIT),
        Some(n) if (1..=MAX_SEARCH_LIMIT).contains(&n) => Ok(n),
        Some(n) => Err(BridgeError::validation(format!(
            "limit must be between 1 and {}, got {}",
            MAX_SEARCH_LIMIT, n
        ))),
    }
}

/// Lowercase and collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Precomputed lowercase text of one entry, built once per snapshot.
#[derive(Debug, Clone)]
pub struct MatchText {
    pub name: String,
    pub body: String,
}

impl MatchText {
    pub fn new(name: &str, secondary: &[&str]) -> Self {
        Self {
            name: normalize(name),
            body: normalize(&secondary.join(" ")),
        }
    }

    pub fn rank(&self, query: &NormalizedQuery) -> Option<MatchTier> {
        if self.name == query.text {
            return Some(MatchTier::Exact);
        }
        if self.name.starts_with(&query.text) {
            return Some(MatchTier::Prefix);
        }
        if self.name.contains(&query.text) {
            return Some(MatchTier::Substring);
        }
        if self.body.contains(&query.text) {
            return Some(MatchTier::Description);
        }
        if query.words.len() > 1
            && query
                .words
                .iter()
                .all(|w| self.name.contains(w.as_str()) || self.body.contains(w.as_str()))
        {
            return Some(MatchTier::Description);
        }
        None
    }
}

/// Total order over hits: tier, then display name ignoring case, then key.
pub fn compare_hits(
    a: (MatchTier, &str, &str),
    b: (MatchTier, &str, &str),
) -> Ordering {
    a.0.cmp(&b.0)
        .then_with(|| a.1.cmp(b.1))
        .then_with(|| a.2.cmp(b.2))
}
