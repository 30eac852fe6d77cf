//! Concurrent dense + sparse retrieval, fusion, and the rerank pipeline.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::candidate::{Candidate, FusedResult, MetadataFilter};
use super::fusion::FusionEngine;
use super::reranker::Reranker;
use super::{Retriever, RetrieverKind};
use crate::config::RetrievalConfig;
use crate::error::RetrievalError;

/// A first-stage retriever and the list length requested from it.
#[derive(Clone)]
struct Branch {
    retriever: Arc<dyn Retriever>,
    top_k: usize,
}

/// Fans a query out to every registered retriever concurrently and fuses the
/// surviving lists.
#[derive(Clone)]
pub struct HybridRetriever {
    branches: Vec<Branch>,
    fusion: FusionEngine,
    retriever_timeout: Duration,
}

impl std::fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<RetrieverKind> =
            self.branches.iter().map(|b| b.retriever.kind()).collect();
        f.debug_struct("HybridRetriever")
            .field("retrievers", &kinds)
            .field("fusion", &self.fusion)
            .field("retriever_timeout", &self.retriever_timeout)
            .finish()
    }
}

/// What one retriever contributed to an explained query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverReport {
    pub retriever: RetrieverKind,
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-retriever lists next to the fused ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalExplanation {
    pub query: String,
    pub rrf_k: f64,
    pub retrievers: Vec<RetrieverReport>,
    pub fused: Vec<Candidate>,
}

impl HybridRetriever {
    /// Dense + sparse retriever pair configured from the retrieval section.
    pub fn new(
        dense: Arc<dyn Retriever>,
        sparse: Arc<dyn Retriever>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            branches: vec![
                Branch {
                    retriever: dense,
                    top_k: config.dense_top_k,
                },
                Branch {
                    retriever: sparse,
                    top_k: config.sparse_top_k,
                },
            ],
            fusion: FusionEngine::new(config.rrf_k),
            retriever_timeout: Duration::from_secs(config.retriever_timeout_secs),
        }
    }

    /// Register an additional retriever branch.
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>, top_k: usize) -> Self {
        self.branches.push(Branch { retriever, top_k });
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.retriever_timeout = timeout;
        self
    }

    pub fn fusion(&self) -> &FusionEngine {
        &self.fusion
    }

    /// Retrieve and fuse, returning at most `top_k` candidates.
    pub async fn query(&self, text: &str, top_k: usize) -> FusedResult {
        self.query_filtered(text, top_k, None).await
    }

    /// Like [`query`](Self::query) with a metadata filter applied to every
    /// branch.
    pub async fn query_filtered(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> FusedResult {
        let start = Instant::now();
        let results = self.fan_out(text, filter).await;

        let mut lists = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(list) => lists.push(list),
                Err(e) => {
                    warn!(
                        retriever = %e.retriever,
                        cause = e.cause.as_str(),
                        "Retriever failed, degrading to surviving lists"
                    );
                    failures.push(e);
                }
            }
        }

        let mut fused = self.fusion.fuse(&lists, top_k);
        fused.failures = failures;
        debug!(
            fused = fused.len(),
            failed = fused.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Hybrid retrieval complete"
        );
        fused
    }

    /// Run the query and report every retriever's own list alongside the
    /// fused ranking.
    pub async fn explain(&self, text: &str, top_k: usize) -> RetrievalExplanation {
        let results = self.fan_out(text, None).await;

        let mut lists = Vec::new();
        let mut retrievers = Vec::with_capacity(results.len());
        for (branch, result) in self.branches.iter().zip(results) {
            match result {
                Ok(list) => {
                    retrievers.push(RetrieverReport {
                        retriever: branch.retriever.kind(),
                        candidates: list.clone(),
                        error: None,
                    });
                    lists.push(list);
                }
                Err(e) => retrievers.push(RetrieverReport {
                    retriever: e.retriever,
                    candidates: Vec::new(),
                    error: Some(e.cause),
                }),
            }
        }

        RetrievalExplanation {
            query: text.to_string(),
            rrf_k: self.fusion.k(),
            retrievers,
            fused: self.fusion.fuse(&lists, top_k).candidates,
        }
    }

    /// Issue every branch concurrently, each under its own timeout. Results
    /// come back in branch order.
    async fn fan_out(
        &self,
        text: &str,
        filter: Option<&MetadataFilter>,
    ) -> Vec<Result<Vec<Candidate>, RetrievalError>> {
        let timeout = self.retriever_timeout;
        let futures = self.branches.iter().map(|branch| async move {
            let kind = branch.retriever.kind();
            let call = branch.retriever.retrieve(text, branch.top_k, filter);
            match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(RetrievalError::new(
                    kind,
                    format!("timed out after {}ms", timeout.as_millis()),
                )),
            }
        });
        futures::future::join_all(futures).await
    }
}

/// Output of a full retrieve-fuse-rerank pass.
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub candidates: Vec<Candidate>,
    /// Set when a retriever failed or timed out, or rerank dropped pairs.
    pub degraded: bool,
    pub failures: Vec<RetrievalError>,
}

/// Hybrid retrieval followed by reranking, with budgets from configuration.
#[derive(Debug, Clone)]
pub struct RetrievalPipeline {
    hybrid: HybridRetriever,
    reranker: Reranker,
    fusion_top_k: usize,
    rerank_top_n: usize,
}

impl RetrievalPipeline {
    pub fn new(hybrid: HybridRetriever, reranker: Reranker, config: &RetrievalConfig) -> Self {
        Self {
            hybrid,
            reranker,
            fusion_top_k: config.fusion_top_k,
            rerank_top_n: config.rerank_top_n,
        }
    }

    pub fn hybrid(&self) -> &HybridRetriever {
        &self.hybrid
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }

    pub fn fusion_top_k(&self) -> usize {
        self.fusion_top_k
    }

    pub fn rerank_top_n(&self) -> usize {
        self.rerank_top_n
    }

    pub async fn search(&self, query: &str, filter: Option<&MetadataFilter>) -> PipelineResult {
        self.search_with(query, filter, self.rerank_top_n).await
    }

    /// Search with an explicit rerank cut-off.
    pub async fn search_with(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
        top_n: usize,
    ) -> PipelineResult {
        let fused = self
            .hybrid
            .query_filtered(query, self.fusion_top_k, filter)
            .await;
        let failures = fused.failures;
        let outcome = self
            .reranker
            .rerank_detailed(query, fused.candidates, top_n)
            .await;

        let degraded = !failures.is_empty() || outcome.dropped > 0;
        info!(
            results = outcome.candidates.len(),
            degraded, "Retrieval pipeline complete"
        );
        PipelineResult {
            candidates: outcome.candidates,
            degraded,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::candidate::{Chunk, Origin};
    use crate::retrieval::reranker::PairwiseScorer;
    use crate::retrieval::CollaboratorError;
    use async_trait::async_trait;

    struct StaticRetriever {
        kind: RetrieverKind,
        ids: Vec<&'static str>,
    }

    #[async_trait]
    impl Retriever for StaticRetriever {
        fn kind(&self) -> RetrieverKind {
            self.kind
        }

        async fn retrieve(
            &self,
            _query: &str,
            top_k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> Result<Vec<Candidate>, RetrievalError> {
            let origin = match self.kind {
                RetrieverKind::Dense => Origin::Dense,
                RetrieverKind::Sparse => Origin::Sparse,
            };
            Ok(self
                .ids
                .iter()
                .take(top_k)
                .map(|id| Candidate::new(Chunk::new(*id, format!("about {id}")), 1.0, origin))
                .collect())
        }
    }

    struct FailingRetriever(RetrieverKind);

    #[async_trait]
    impl Retriever for FailingRetriever {
        fn kind(&self) -> RetrieverKind {
            self.0
        }

        async fn retrieve(
            &self,
            _query: &str,
            _top_k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> Result<Vec<Candidate>, RetrievalError> {
            Err(RetrievalError::new(self.0, "embedding service unavailable"))
        }
    }

    struct StalledRetriever(RetrieverKind);

    #[async_trait]
    impl Retriever for StalledRetriever {
        fn kind(&self) -> RetrieverKind {
            self.0
        }

        async fn retrieve(
            &self,
            _query: &str,
            _top_k: usize,
            _filter: Option<&MetadataFilter>,
        ) -> Result<Vec<Candidate>, RetrievalError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    struct LengthScorer;

    #[async_trait]
    impl PairwiseScorer for LengthScorer {
        async fn score(&self, _query: &str, text: &str) -> Result<f64, CollaboratorError> {
            Ok(text.len() as f64)
        }
    }

    fn dense(ids: Vec<&'static str>) -> Arc<dyn Retriever> {
        Arc::new(StaticRetriever {
            kind: RetrieverKind::Dense,
            ids,
        })
    }

    fn sparse(ids: Vec<&'static str>) -> Arc<dyn Retriever> {
        Arc::new(StaticRetriever {
            kind: RetrieverKind::Sparse,
            ids,
        })
    }

    #[tokio::test]
    async fn test_query_fuses_both_lists() {
        let hybrid = HybridRetriever::new(
            dense(vec!["A", "B", "C"]),
            sparse(vec!["C", "A"]),
            &RetrievalConfig::default(),
        );
        let fused = hybrid.query("q", 10).await;
        assert_eq!(fused.ids(), vec!["A", "C", "B"]);
        assert!(!fused.is_degraded());
    }

    #[tokio::test]
    async fn test_failed_retriever_degrades_to_survivor() {
        let hybrid = HybridRetriever::new(
            Arc::new(FailingRetriever(RetrieverKind::Dense)),
            sparse(vec!["C", "A"]),
            &RetrievalConfig::default(),
        );
        let fused = hybrid.query("q", 10).await;
        assert_eq!(fused.ids(), vec!["C", "A"]);
        assert_eq!(fused.failures.len(), 1);
        assert_eq!(fused.failures[0].retriever, RetrieverKind::Dense);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_retriever_times_out() {
        let hybrid = HybridRetriever::new(
            dense(vec!["A"]),
            Arc::new(StalledRetriever(RetrieverKind::Sparse)),
            &RetrievalConfig::default(),
        )
        .with_timeout(Duration::from_millis(50));
        let fused = hybrid.query("q", 10).await;
        assert_eq!(fused.ids(), vec!["A"]);
        assert_eq!(fused.failures[0].retriever, RetrieverKind::Sparse);
        assert!(fused.failures[0].cause.contains("timed out"));
    }

    #[tokio::test]
    async fn test_both_failing_yields_empty_result() {
        let hybrid = HybridRetriever::new(
            Arc::new(FailingRetriever(RetrieverKind::Dense)),
            Arc::new(FailingRetriever(RetrieverKind::Sparse)),
            &RetrievalConfig::default(),
        );
        let fused = hybrid.query("q", 10).await;
        assert!(fused.is_empty());
        assert_eq!(fused.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_explain_reports_each_retriever() {
        let hybrid = HybridRetriever::new(
            dense(vec!["A", "B"]),
            Arc::new(FailingRetriever(RetrieverKind::Sparse)),
            &RetrievalConfig::default(),
        );
        let explanation = hybrid.explain("q", 10).await;
        assert_eq!(explanation.retrievers.len(), 2);
        assert_eq!(explanation.retrievers[0].candidates.len(), 2);
        assert!(explanation.retrievers[1].error.is_some());
        assert_eq!(explanation.fused.len(), 2);
        assert_eq!(explanation.rrf_k, 60.0);
    }

    #[tokio::test]
    async fn test_pipeline_reranks_and_flags_degradation() {
        let config = RetrievalConfig {
            rerank_top_n: 2,
            ..RetrievalConfig::default()
        };
        let hybrid = HybridRetriever::new(
            Arc::new(FailingRetriever(RetrieverKind::Dense)),
            sparse(vec!["short", "a much longer one"]),
            &config,
        );
        let reranker = Reranker::new(Arc::new(LengthScorer));
        let pipeline = RetrievalPipeline::new(hybrid, reranker, &config);
        let result = pipeline.search("q", None).await;
        assert!(result.degraded);
        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.candidates[0].id(), "a much longer one");
        assert_eq!(result.candidates[0].origin, Origin::Reranked);
    }
}
