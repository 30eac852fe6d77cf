//! Builds isolated (vector, keyword) index pairs from a chunk set.

use async_trait::async_trait;
use std::sync::Arc;

use super::keyword::TantivyKeywordIndex;
use super::vector::InMemoryVectorIndex;
use crate::retrieval::{
    Chunk, CollaboratorError, DenseRetriever, EmbeddingFn, KeywordIndex, SparseRetriever,
    VectorIndex,
};

/// A freshly built pair of indexes sharing nothing with any other index.
#[derive(Clone)]
pub struct BuiltIndex {
    pub vector: Arc<dyn VectorIndex>,
    pub keyword: Arc<dyn KeywordIndex>,
    /// The embedding function the vector index was built with; queries must
    /// use the same one.
    pub embedder: Arc<dyn EmbeddingFn>,
}

impl BuiltIndex {
    pub fn dense_retriever(&self) -> DenseRetriever {
        DenseRetriever::new(Arc::clone(&self.embedder), Arc::clone(&self.vector))
    }

    pub fn sparse_retriever(&self) -> SparseRetriever {
        SparseRetriever::new(Arc::clone(&self.keyword))
    }
}

impl std::fmt::Debug for BuiltIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltIndex")
            .field("vector", &self.vector.len())
            .field("keyword", &self.keyword.len())
            .finish()
    }
}

/// Ingestion collaborator that turns chunks into searchable indexes.
#[async_trait]
pub trait IndexBuilder: Send + Sync {
    async fn build(&self, chunks: Vec<Chunk>) -> Result<BuiltIndex, CollaboratorError>;
}

/// Builds an [`InMemoryVectorIndex`] and a [`TantivyKeywordIndex`].
#[derive(Clone)]
pub struct InMemoryIndexBuilder {
    embedder: Arc<dyn EmbeddingFn>,
}

impl InMemoryIndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingFn>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl IndexBuilder for InMemoryIndexBuilder {
    async fn build(&self, chunks: Vec<Chunk>) -> Result<BuiltIndex, CollaboratorError> {
        let keyword = TantivyKeywordIndex::build(&chunks)?;
        let vector = InMemoryVectorIndex::build(chunks, self.embedder.as_ref()).await?;
        Ok(BuiltIndex {
            vector: Arc::new(vector),
            keyword: Arc::new(keyword),
            embedder: Arc::clone(&self.embedder),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::HashEmbedder;

    #[tokio::test]
    async fn test_builds_both_indexes() {
        let builder = InMemoryIndexBuilder::new(Arc::new(HashEmbedder::default()));
        let built = builder
            .build(vec![
                Chunk::new("d#0", "draft text about fusion"),
                Chunk::new("d#1", "more draft text"),
            ])
            .await
            .unwrap();
        assert_eq!(built.vector.len(), 2);
        assert_eq!(built.keyword.len(), 2);
    }

    #[tokio::test]
    async fn test_retrievers_over_built_index() {
        use crate::retrieval::Retriever;

        let builder = InMemoryIndexBuilder::new(Arc::new(HashEmbedder::default()));
        let built = builder
            .build(vec![
                Chunk::new("d#0", "pragmatism and inquiry"),
                Chunk::new("d#1", "gardening notes"),
            ])
            .await
            .unwrap();
        let dense = built.dense_retriever().retrieve("inquiry", 1, None).await.unwrap();
        assert_eq!(dense[0].id(), "d#0");
        let sparse = built.sparse_retriever().retrieve("gardening", 1, None).await.unwrap();
        assert_eq!(sparse[0].id(), "d#1");
    }

    #[tokio::test]
    async fn test_each_build_is_independent() {
        let builder = InMemoryIndexBuilder::new(Arc::new(HashEmbedder::default()));
        let first = builder.build(vec![Chunk::new("a", "alpha")]).await.unwrap();
        let second = builder.build(vec![Chunk::new("b", "beta")]).await.unwrap();
        assert!(first.keyword.query("beta", 5).await.unwrap().is_empty());
        assert!(second.keyword.query("alpha", 5).await.unwrap().is_empty());
    }
}
