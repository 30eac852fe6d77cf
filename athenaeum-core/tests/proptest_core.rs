//! Property-based tests for rank fusion and reranking using proptest.

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use athenaeum_core::retrieval::{
    Candidate, Chunk, CollaboratorError, FusionEngine, Origin, PairwiseScorer, Reranker,
};

fn to_candidates(items: &[(String, f64)], origin: Origin) -> Vec<Candidate> {
    items
        .iter()
        .map(|(id, score)| {
            Candidate::new(Chunk::new(id.clone(), format!("text of {id}")), *score, origin)
        })
        .collect()
}

fn ranked_lists() -> impl Strategy<Value = Vec<Vec<(String, f64)>>> {
    prop::collection::vec(
        prop::collection::vec(("[a-j]", 0.0f64..1.0), 0..12),
        0..4,
    )
}

fn build_lists(raw: &[Vec<(String, f64)>]) -> Vec<Vec<Candidate>> {
    raw.iter()
        .enumerate()
        .map(|(i, items)| {
            let origin = if i % 2 == 0 { Origin::Dense } else { Origin::Sparse };
            to_candidates(items, origin)
        })
        .collect()
}

// --- Fusion properties ---

proptest! {
    #[test]
    fn fusion_is_deterministic(raw in ranked_lists(), top_k in 0usize..15, k in 1.0f64..100.0) {
        let engine = FusionEngine::new(k);
        let lists = build_lists(&raw);
        let first = engine.fuse(&lists, top_k);
        for _ in 0..3 {
            let again = engine.fuse(&lists, top_k);
            prop_assert_eq!(first.ids(), again.ids());
            let a: Vec<f64> = first.candidates.iter().map(|c| c.score).collect();
            let b: Vec<f64> = again.candidates.iter().map(|c| c.score).collect();
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn fusion_never_duplicates_and_sums_contributions(raw in ranked_lists(), k in 1.0f64..100.0) {
        let engine = FusionEngine::new(k);
        let lists = build_lists(&raw);
        let fused = engine.fuse(&lists, usize::MAX);

        let ids = fused.ids();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        prop_assert_eq!(unique.len(), ids.len());

        // Expected score: first occurrence per list, 1-based position.
        let mut expected: HashMap<String, f64> = HashMap::new();
        for list in &raw {
            let mut seen = HashSet::new();
            for (idx, (id, _)) in list.iter().enumerate() {
                if seen.insert(id.clone()) {
                    *expected.entry(id.clone()).or_insert(0.0) += 1.0 / (k + (idx + 1) as f64);
                }
            }
        }
        prop_assert_eq!(expected.len(), fused.len());
        for candidate in &fused.candidates {
            let want = expected[candidate.id()];
            prop_assert!((candidate.score - want).abs() < 1e-12);
        }
    }

    #[test]
    fn fusion_output_is_sorted_and_bounded(raw in ranked_lists(), top_k in 0usize..15) {
        let engine = FusionEngine::default();
        let lists = build_lists(&raw);
        let union: HashSet<&str> = lists.iter().flatten().map(|c| c.id()).collect();
        let fused = engine.fuse(&lists, top_k);

        prop_assert_eq!(fused.len(), top_k.min(union.len()));
        for pair in fused.candidates.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn fusion_of_empty_lists_is_empty(n in 0usize..5, top_k in 0usize..10) {
        let lists: Vec<Vec<Candidate>> = vec![Vec::new(); n];
        prop_assert!(FusionEngine::default().fuse(&lists, top_k).is_empty());
    }
}

// --- Rerank properties ---

/// Scores a pair by a deterministic hash of the text.
struct DigestScorer;

#[async_trait::async_trait]
impl PairwiseScorer for DigestScorer {
    async fn score(&self, query: &str, text: &str) -> Result<f64, CollaboratorError> {
        let digest = query
            .bytes()
            .chain(text.bytes())
            .fold(17u64, |h, b| h.wrapping_mul(31).wrapping_add(b as u64));
        Ok((digest % 1000) as f64 / 1000.0)
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #[test]
    fn rerank_truncates_to_min_of_top_n_and_input(
        ids in prop::collection::hash_set("[a-z]{1,6}", 0..20),
        top_n in 0usize..25,
    ) {
        let items: Vec<(String, f64)> = ids.into_iter().map(|id| (id, 0.5)).collect();
        let candidates = to_candidates(&items, Origin::Dense);
        let n = candidates.len();

        let reranker = Reranker::new(Arc::new(DigestScorer));
        let out = block_on(reranker.rerank("query", candidates, top_n));

        prop_assert_eq!(out.len(), top_n.min(n));
        for pair in out.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
        prop_assert!(out.iter().all(|c| c.origin == Origin::Reranked));
    }
}
