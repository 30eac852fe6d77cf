//! Cosine-similarity vector index held in memory.

use async_trait::async_trait;

use super::embedder::cosine_similarity;
use crate::retrieval::{
    Chunk, CollaboratorError, EmbeddingFn, IndexHit, MetadataFilter, VectorIndex,
};

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Brute-force vector index over a fixed chunk set.
///
/// Built once; the chunk set cannot change afterwards.
pub struct InMemoryVectorIndex {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for InMemoryVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorIndex")
            .field("indexed", &self.entries.len())
            .finish()
    }
}

impl InMemoryVectorIndex {
    /// Index precomputed vectors.
    pub fn from_vectors(items: Vec<(Chunk, Vec<f32>)>) -> Self {
        Self {
            entries: items
                .into_iter()
                .map(|(chunk, vector)| Entry { chunk, vector })
                .collect(),
        }
    }

    /// Embed every chunk and index the result.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingFn,
    ) -> Result<Self, CollaboratorError> {
        let mut items = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = embedder.embed(&chunk.text).await?;
            items.push((chunk, vector));
        }
        Ok(Self::from_vectors(items))
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.entries.iter().any(|e| e.chunk.id == chunk_id)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexHit>, CollaboratorError> {
        let mut scored: Vec<(&Entry, f32)> = self
            .entries
            .iter()
            .filter(|e| filter.is_none_or(|f| f.matches(&e.chunk.metadata)))
            .map(|e| (e, cosine_similarity(vector, &e.vector)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.0.chunk.id.cmp(&b.0.chunk.id))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(e, score)| IndexHit {
                chunk_id: e.chunk.id.clone(),
                text: e.chunk.text.clone(),
                metadata: e.chunk.metadata.clone(),
                score: f64::from(score),
            })
            .collect())
    }
}
