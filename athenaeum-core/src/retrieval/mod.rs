//! Hybrid retrieval engine.
//!
//! A query fans out to a dense (vector-similarity) and a sparse (keyword)
//! retriever concurrently. Their ranked lists are merged by reciprocal rank
//! fusion and the short fused list is re-scored by a pairwise reranker.
//!
//! The backing collaborators (embedding function, vector index, keyword
//! index, pairwise scorer) are traits; reference in-memory implementations
//! live in [`crate::index`].

pub mod candidate;
pub mod dense;
pub mod fusion;
pub mod hybrid;
pub mod reranker;
pub mod sparse;

pub use candidate::{Candidate, Chunk, ChunkMetadata, FusedResult, IndexHit, MetadataFilter, Origin};
pub use dense::{DenseRetriever, EmbeddingFn, VectorIndex};
pub use fusion::{DEFAULT_RRF_K, FusionEngine};
pub use hybrid::{
    HybridRetriever, PipelineResult, RetrievalExplanation, RetrievalPipeline, RetrieverReport,
};
pub use reranker::{PairwiseScorer, RerankEntry, RerankExplanation, RerankOutcome, Reranker};
pub use sparse::{KeywordIndex, SparseRetriever};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// Identifies which first-stage retriever produced a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieverKind {
    Dense,
    Sparse,
}

impl std::fmt::Display for RetrieverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrieverKind::Dense => write!(f, "dense"),
            RetrieverKind::Sparse => write!(f, "sparse"),
        }
    }
}

/// Failure reported by a backing collaborator (embedding service, index,
/// scorer). Retrievers wrap it into a [`RetrievalError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CollaboratorError {
    pub message: String,
}

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A first-stage retriever producing a ranked candidate list.
///
/// Implementations return an empty list when the backing index holds no
/// documents, and surface collaborator failures as [`RetrievalError`].
#[async_trait]
pub trait Retriever: Send + Sync {
    fn kind(&self) -> RetrieverKind;

    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Candidate>, RetrievalError>;
}
