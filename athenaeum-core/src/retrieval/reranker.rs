//! Second-stage reranking with a pairwise relevance scorer.
//!
//! The scorer (typically a cross-encoder) sees the query and one passage at a
//! time. It is far more expensive per item than the first-stage retrievers, so
//! it only ever sees the short fused list.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::CollaboratorError;
use super::candidate::{Candidate, Origin};

/// Pairwise relevance-scoring collaborator.
#[async_trait]
pub trait PairwiseScorer: Send + Sync {
    async fn score(&self, query: &str, text: &str) -> Result<f64, CollaboratorError>;
}

/// Result of a rerank pass, including how many pairs were lost.
#[derive(Debug, Clone, Default)]
pub struct RerankOutcome {
    pub candidates: Vec<Candidate>,
    /// Candidates dropped because the scorer failed on them.
    pub dropped: usize,
}

/// One row of a rerank explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankEntry {
    pub chunk_id: String,
    /// 1-based position before reranking.
    pub original_rank: usize,
    pub original_score: f64,
    /// 1-based position after reranking; `None` when cut by `top_n` or dropped.
    pub new_rank: Option<usize>,
    pub new_score: Option<f64>,
}

/// Before/after view of a rerank pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankExplanation {
    pub query: String,
    pub top_n: usize,
    pub entries: Vec<RerankEntry>,
    pub dropped: usize,
}

/// Re-orders a short candidate list by pairwise relevance.
#[derive(Clone)]
pub struct Reranker {
    scorer: Arc<dyn PairwiseScorer>,
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker").finish_non_exhaustive()
    }
}

impl Reranker {
    pub fn new(scorer: Arc<dyn PairwiseScorer>) -> Self {
        Self { scorer }
    }

    /// Score every candidate against `query`, sort by the new score and keep
    /// `top_n`. Candidates whose scoring fails are dropped with a warning.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        top_n: usize,
    ) -> Vec<Candidate> {
        self.rerank_detailed(query, candidates, top_n).await.candidates
    }

    pub async fn rerank_detailed(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        top_n: usize,
    ) -> RerankOutcome {
        if candidates.is_empty() || top_n == 0 {
            return RerankOutcome::default();
        }

        let scores = futures::future::join_all(
            candidates
                .iter()
                .map(|c| self.scorer.score(query, &c.chunk.text)),
        )
        .await;

        let mut dropped = 0;
        let mut rescored = Vec::with_capacity(candidates.len());
        for (candidate, score) in candidates.into_iter().zip(scores) {
            match score {
                Ok(score) if score.is_finite() => {
                    rescored.push(Candidate {
                        score,
                        origin: Origin::Reranked,
                        ..candidate
                    });
                }
                Ok(score) => {
                    dropped += 1;
                    warn!(
                        chunk_id = candidate.id(),
                        score,
                        "Scorer returned a non-finite score, dropping candidate"
                    );
                }
                Err(e) => {
                    dropped += 1;
                    warn!(
                        chunk_id = candidate.id(),
                        error = %e,
                        "Pairwise scoring failed, dropping candidate"
                    );
                }
            }
        }

        // Stable sort keeps fused order among equal scores.
        rescored.sort_by(|a, b| b.score.total_cmp(&a.score));
        rescored.truncate(top_n);

        debug!(kept = rescored.len(), dropped, top_n, "Rerank complete");
        RerankOutcome {
            candidates: rescored,
            dropped,
        }
    }

    /// Rerank and report each candidate's position before and after.
    pub async fn explain(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        top_n: usize,
    ) -> RerankExplanation {
        let before: Vec<(String, f64)> = candidates
            .iter()
            .map(|c| (c.id().to_string(), c.score))
            .collect();
        let outcome = self.rerank_detailed(query, candidates, top_n).await;

        let entries = before
            .into_iter()
            .enumerate()
            .map(|(idx, (chunk_id, original_score))| {
                let after = outcome
                    .candidates
                    .iter()
                    .position(|c| c.id() == chunk_id);
                RerankEntry {
                    new_rank: after.map(|p| p + 1),
                    new_score: after.map(|p| outcome.candidates[p].score),
                    chunk_id,
                    original_rank: idx + 1,
                    original_score,
                }
            })
            .collect();

        RerankExplanation {
            query: query.to_string(),
            top_n,
            entries,
            dropped: outcome.dropped,
        }
    }
}
