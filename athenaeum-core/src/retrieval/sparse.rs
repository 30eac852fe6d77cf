//! Sparse (keyword) retriever.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::candidate::{Candidate, IndexHit, MetadataFilter, Origin};
use super::{CollaboratorError, Retriever, RetrieverKind};
use crate::error::RetrievalError;

/// First over-fetch factor when a metadata filter has to be applied after
/// ranking. The window doubles until enough rows match or the index runs out.
const FILTER_OVERFETCH: usize = 4;

/// Keyword ranking collaborator (BM25, TF-IDF, ...).
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<IndexHit>, CollaboratorError>;
}

/// Retriever backed by a keyword index.
///
/// Keyword indexes take no filter, so a metadata filter is applied to an
/// over-fetched result set that widens until `top_k` rows match or every
/// indexed chunk has been ranked.
#[derive(Clone)]
pub struct SparseRetriever {
    index: Arc<dyn KeywordIndex>,
}

impl std::fmt::Debug for SparseRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseRetriever")
            .field("indexed", &self.index.len())
            .finish()
    }
}

impl SparseRetriever {
    pub fn new(index: Arc<dyn KeywordIndex>) -> Self {
        Self { index }
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<IndexHit>, RetrievalError> {
        self.index
            .query(text, top_k)
            .await
            .map_err(|e| RetrievalError::new(RetrieverKind::Sparse, e.message))
    }
}

#[async_trait]
impl Retriever for SparseRetriever {
    fn kind(&self) -> RetrieverKind {
        RetrieverKind::Sparse
    }

    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Candidate>, RetrievalError> {
        if self.index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let Some(filter) = filter else {
            let hits = self.query(query, top_k).await?;
            debug!(hits = hits.len(), top_k, "Sparse retrieval complete");
            return Ok(hits
                .into_iter()
                .map(|hit| Candidate::from_hit(hit, Origin::Sparse))
                .collect());
        };

        let indexed = self.index.len();
        let mut fetch = top_k.saturating_mul(FILTER_OVERFETCH).min(indexed);
        loop {
            let hits = self.query(query, fetch).await?;
            let exhausted = hits.len() < fetch || fetch >= indexed;
            let matched: Vec<IndexHit> = hits
                .into_iter()
                .filter(|hit| filter.matches(&hit.metadata))
                .take(top_k)
                .collect();

            if matched.len() >= top_k || exhausted {
                debug!(hits = matched.len(), top_k, fetch, "Sparse retrieval complete");
                return Ok(matched
                    .into_iter()
                    .map(|hit| Candidate::from_hit(hit, Origin::Sparse))
                    .collect());
            }
            fetch = fetch.saturating_mul(2).min(indexed);
        }
    }
}
