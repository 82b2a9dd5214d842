// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query complexity tiers.
//!
//! Short queries are usually greetings or follow-ups, so they get the
//! strictest semantic threshold and the fewest results. Long queries get a
//! looser threshold and a larger result cap.

use reverie_config::{RetrievalConfig, TierProfile};

/// Complexity tier, ordered from least to most complex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryTier {
    Simple,
    Medium,
    Complex,
}

impl QueryTier {
    /// Tier for a query with `words` whitespace-separated tokens.
    pub fn for_word_count(words: usize) -> Self {
        match words {
            0..=5 => QueryTier::Simple,
            6..=15 => QueryTier::Medium,
            _ => QueryTier::Complex,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryTier::Simple => "simple",
            QueryTier::Medium => "medium",
            QueryTier::Complex => "complex",
        }
    }
}

/// Retrieval parameters chosen for one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryProfile {
    pub tier: QueryTier,
    pub semantic_threshold: f64,
    pub keyword_threshold: f64,
    pub max_results: usize,
}

/// Maps queries to tier profiles taken from configuration.
#[derive(Debug, Clone)]
pub struct QueryComplexityClassifier {
    simple: TierProfile,
    medium: TierProfile,
    complex: TierProfile,
}

impl QueryComplexityClassifier {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            simple: config.simple,
            medium: config.medium,
            complex: config.complex,
        }
    }

    pub fn classify(&self, query: &str) -> QueryProfile {
        let tier = QueryTier::for_word_count(query.split_whitespace().count());
        let profile = match tier {
            QueryTier::Simple => self.simple,
            QueryTier::Medium => self.medium,
            QueryTier::Complex => self.complex,
        };
        QueryProfile {
            tier,
            semantic_threshold: profile.semantic_threshold,
            keyword_threshold: profile.keyword_threshold,
            max_results: profile.max_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classifier() -> QueryComplexityClassifier {
        QueryComplexityClassifier::new(&RetrievalConfig::default())
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn tier_boundaries() {
        let c = classifier();
        assert_eq!(c.classify("").tier, QueryTier::Simple);
        assert_eq!(c.classify(&words(5)).tier, QueryTier::Simple);
        assert_eq!(c.classify(&words(6)).tier, QueryTier::Medium);
        assert_eq!(c.classify(&words(15)).tier, QueryTier::Medium);
        assert_eq!(c.classify(&words(16)).tier, QueryTier::Complex);
    }

    #[test]
    fn profiles_come_from_config() {
        let c = classifier();
        let simple = c.classify("hi");
        assert_eq!(simple.semantic_threshold, 0.78);
        assert_eq!(simple.keyword_threshold, 0.10);
        assert_eq!(simple.max_results, 3);

        let complex = c.classify(&words(20));
        assert_eq!(complex.semantic_threshold, 0.60);
        assert_eq!(complex.max_results, 8);
    }

    #[test]
    fn extra_whitespace_does_not_count() {
        let c = classifier();
        assert_eq!(c.classify("  a \t b\n c  d   e ").tier, QueryTier::Simple);
    }

    proptest! {
        #[test]
        fn longer_queries_never_get_stricter(a in 0usize..40, b in 0usize..40) {
            let c = classifier();
            let (short, long) = (a.min(b), a.max(b));
            let ps = c.classify(&words(short));
            let pl = c.classify(&words(long));
            prop_assert!(ps.tier <= pl.tier);
            prop_assert!(ps.semantic_threshold >= pl.semantic_threshold);
            prop_assert!(ps.max_results <= pl.max_results);
        }
    }
}
