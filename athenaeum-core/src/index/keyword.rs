//! BM25 keyword index backed by an in-RAM Tantivy index.

use async_trait::async_trait;
use std::collections::HashMap;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, STORED, STRING, Schema, TEXT, Value};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, doc};
use tracing::debug;

use crate::retrieval::{Chunk, ChunkMetadata, CollaboratorError, IndexHit, KeywordIndex};

/// Keyword index over a fixed chunk set.
pub struct TantivyKeywordIndex {
    index: Index,
    reader: IndexReader,
    id_field: Field,
    text_field: Field,
    /// Metadata is kept beside the index rather than in stored fields.
    metadata: HashMap<String, ChunkMetadata>,
}

impl std::fmt::Debug for TantivyKeywordIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TantivyKeywordIndex")
            .field("indexed", &self.metadata.len())
            .finish()
    }
}

fn index_error(context: &str, e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::new(format!("{context}: {e}"))
}

impl TantivyKeywordIndex {
    /// Index `chunks` and commit.
    pub fn build(chunks: &[Chunk]) -> Result<Self, CollaboratorError> {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", TEXT | STORED);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        // One indexing thread keeps document order, and therefore tie order,
        // identical across runs.
        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, 50_000_000)
            .map_err(|e| index_error("Failed to create writer", e))?;

        let mut metadata = HashMap::with_capacity(chunks.len());
        for chunk in chunks {
            writer
                .add_document(doc!(
                    id_field => chunk.id.as_str(),
                    text_field => chunk.text.as_str(),
                ))
                .map_err(|e| index_error("Failed to add document", e))?;
            metadata.insert(chunk.id.clone(), chunk.metadata.clone());
        }
        writer
            .commit()
            .map_err(|e| index_error("Failed to commit", e))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| index_error("Failed to create reader", e))?;

        debug!(documents = metadata.len(), "Keyword index built");
        Ok(Self {
            index,
            reader,
            id_field,
            text_field,
            metadata,
        })
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.metadata.contains_key(chunk_id)
    }

    fn search(&self, text: &str, top_k: usize) -> Result<Vec<IndexHit>, CollaboratorError> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        // Lenient parsing: user text may contain query syntax characters.
        let (query, _errors) = parser.parse_query_lenient(text);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(top_k))
            .map_err(|e| index_error("Search failed", e))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| index_error("Failed to retrieve doc", e))?;
            let id = doc
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let body = doc
                .get_first(self.text_field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let metadata = self.metadata.get(&id).cloned().unwrap_or_default();
            hits.push(IndexHit {
                chunk_id: id,
                text: body,
                metadata,
                score: f64::from(score),
            });
        }
        Ok(hits)
    }
}

#[async_trait]
impl KeywordIndex for TantivyKeywordIndex {
    fn len(&self) -> usize {
        self.metadata.len()
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<IndexHit>, CollaboratorError> {
        if top_k == 0 || text.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.search(text, top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Chunk> {
        vec![
            Chunk::new("a", "Reciprocal rank fusion combines ranked lists")
                .with_metadata(ChunkMetadata::default().with_source("rrf.pdf").with_page(2)),
            Chunk::new("b", "BM25 is a keyword ranking function"),
            Chunk::new("c", "Sourdough starter needs regular feeding"),
        ]
    }

    #[tokio::test]
    async fn test_keyword_query_matches_terms() {
        let index = TantivyKeywordIndex::build(&corpus()).unwrap();
        assert_eq!(index.len(), 3);

        let hits = index.query("rank fusion", 5).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk_id, "a");
        assert_eq!(hits[0].metadata.page, Some(2));
        assert!(hits.iter().all(|h| h.chunk_id != "c"));
    }

    #[tokio::test]
    async fn test_query_syntax_is_tolerated() {
        let index = TantivyKeywordIndex::build(&corpus()).unwrap();
        let hits = index.query("keyword AND (ranking:", 5).await.unwrap();
        assert!(hits.iter().any(|h| h.chunk_id == "b"));
    }

    #[tokio::test]
    async fn test_empty_index_and_empty_query() {
        let index = TantivyKeywordIndex::build(&[]).unwrap();
        assert!(index.is_empty());
        assert!(index.query("anything", 5).await.unwrap().is_empty());

        let index = TantivyKeywordIndex::build(&corpus()).unwrap();
        assert!(index.query("   ", 5).await.unwrap().is_empty());
    }
}
