//! Lexical pairwise scorer.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::retrieval::{CollaboratorError, PairwiseScorer};

/// Scores a passage by how much of the query vocabulary it covers.
///
/// `coverage + 0.1 * density`, where coverage is the fraction of distinct
/// query terms present in the passage and density is the share of passage
/// terms that are query terms. Stands in for a cross-encoder.
#[derive(Debug, Clone, Default)]
pub struct LexicalOverlapScorer;

impl LexicalOverlapScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score_pair(&self, query: &str, text: &str) -> f64 {
        let query_terms: HashSet<String> = super::tokenize(query).into_iter().collect();
        if query_terms.is_empty() {
            return 0.0;
        }
        let passage = super::tokenize(text);
        if passage.is_empty() {
            return 0.0;
        }

        let present: HashSet<&str> = passage.iter().map(String::as_str).collect();
        let covered = query_terms
            .iter()
            .filter(|t| present.contains(t.as_str()))
            .count();
        let hits = passage.iter().filter(|t| query_terms.contains(*t)).count();

        let coverage = covered as f64 / query_terms.len() as f64;
        let density = hits as f64 / passage.len() as f64;
        coverage + 0.1 * density
    }
}

#[async_trait]
impl PairwiseScorer for LexicalOverlapScorer {
    async fn score(&self, query: &str, text: &str) -> Result<f64, CollaboratorError> {
        Ok(self.score_pair(query, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_coverage_beats_partial() {
        let s = LexicalOverlapScorer::new();
        let full = s.score_pair("rank fusion", "reciprocal rank fusion");
        let partial = s.score_pair("rank fusion", "rank of a matrix");
        let none = s.score_pair("rank fusion", "sourdough bread");
        assert!(full > partial);
        assert!(partial > none);
        assert_eq!(none, 0.0);
    }

    #[test]
    fn test_empty_inputs_score_zero() {
        let s = LexicalOverlapScorer::new();
        assert_eq!(s.score_pair("", "text"), 0.0);
        assert_eq!(s.score_pair("query", ""), 0.0);
    }
}
