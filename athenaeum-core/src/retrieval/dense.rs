//! Dense (vector-similarity) retriever.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::candidate::{Candidate, IndexHit, MetadataFilter, Origin};
use super::{CollaboratorError, Retriever, RetrieverKind};
use crate::error::RetrievalError;

/// Text embedding collaborator (bi-encoder).
#[async_trait]
pub trait EmbeddingFn: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError>;
}

/// Vector similarity index collaborator.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Number of indexed chunks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexHit>, CollaboratorError>;
}

/// Retriever backed by an embedding function and a vector index.
#[derive(Clone)]
pub struct DenseRetriever {
    embedder: Arc<dyn EmbeddingFn>,
    index: Arc<dyn VectorIndex>,
}

impl std::fmt::Debug for DenseRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseRetriever")
            .field("indexed", &self.index.len())
            .finish()
    }
}

impl DenseRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingFn>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }
}

#[async_trait]
impl Retriever for DenseRetriever {
    fn kind(&self) -> RetrieverKind {
        RetrieverKind::Dense
    }

    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Candidate>, RetrievalError> {
        // An empty index answers without touching the embedding service.
        if self.index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RetrievalError::new(RetrieverKind::Dense, e.message))?;
        let hits = self
            .index
            .query(&vector, top_k, filter)
            .await
            .map_err(|e| RetrievalError::new(RetrieverKind::Dense, e.message))?;

        debug!(hits = hits.len(), top_k, "Dense retrieval complete");
        Ok(hits
            .into_iter()
            .take(top_k)
            .map(|hit| Candidate::from_hit(hit, Origin::Dense))
            .collect())
    }
}
