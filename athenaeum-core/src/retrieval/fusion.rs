//! Reciprocal rank fusion.
//!
//! Each list contributes `1 / (k + rank)` (1-based rank) to every chunk it
//! contains. Only rank positions are used, so dense similarities and keyword
//! scores never need to share a scale.

use std::collections::{HashMap, HashSet};

use super::candidate::{Candidate, FusedResult};

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

struct Accumulator {
    candidate: Candidate,
    score: f64,
    /// Lowest 1-based rank this chunk held in any contributing list.
    best_rank: usize,
}

/// Merges ranked candidate lists into one deduplicated ranking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionEngine {
    k: f64,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self { k: DEFAULT_RRF_K }
    }
}

impl FusionEngine {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Contribution of a single 1-based rank.
    pub fn contribution(&self, rank: usize) -> f64 {
        1.0 / (self.k + rank as f64)
    }

    /// Fuse `lists` and keep the best `top_k`.
    ///
    /// The returned candidate keeps the chunk and origin from the list where
    /// it ranked best (first list wins on equal rank) and carries the summed
    /// RRF score. Order is score descending, then best rank ascending, then
    /// chunk id ascending. A chunk repeated inside one list counts once, at
    /// its best position.
    pub fn fuse(&self, lists: &[Vec<Candidate>], top_k: usize) -> FusedResult {
        let mut acc: HashMap<String, Accumulator> = HashMap::new();

        for list in lists {
            let mut seen_in_list: HashSet<&str> = HashSet::with_capacity(list.len());
            for (idx, candidate) in list.iter().enumerate() {
                if !seen_in_list.insert(candidate.id()) {
                    continue;
                }
                let rank = idx + 1;
                let contribution = self.contribution(rank);
                match acc.get_mut(candidate.id()) {
                    Some(entry) => {
                        entry.score += contribution;
                        if rank < entry.best_rank {
                            entry.best_rank = rank;
                            entry.candidate = candidate.clone();
                        }
                    }
                    None => {
                        acc.insert(
                            candidate.id().to_string(),
                            Accumulator {
                                candidate: candidate.clone(),
                                score: contribution,
                                best_rank: rank,
                            },
                        );
                    }
                }
            }
        }

        let mut merged: Vec<Accumulator> = acc.into_values().collect();
        merged.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.best_rank.cmp(&b.best_rank))
                .then_with(|| a.candidate.id().cmp(b.candidate.id()))
        });
        merged.truncate(top_k);

        FusedResult {
            candidates: merged
                .into_iter()
                .map(|entry| {
                    let mut candidate = entry.candidate;
                    candidate.score = entry.score;
                    candidate
                })
                .collect(),
            failures: Vec::new(),
        }
    }
}
