//! JSONL corpus loading and engine wiring.
//!
//! Each line of the corpus file is one passage:
//! `{"id": "...", "text": "...", "source_path": "...", "page": 3, "document_type": "pdf"}`.
//! Only `text` is required.

use anyhow::{Context, bail};
use athenaeum_core::config::AthenaeumConfig;
use athenaeum_core::index::{
    HashEmbedder, InMemoryIndexBuilder, IndexBuilder, LexicalOverlapScorer,
};
use athenaeum_core::retrieval::{Chunk, ChunkMetadata, HybridRetriever, Reranker, RetrievalPipeline};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct CorpusRecord {
    #[serde(default)]
    id: Option<String>,
    text: String,
    #[serde(default)]
    source_path: Option<String>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    document_type: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

impl CorpusRecord {
    fn into_chunk(self, fallback_prefix: &str, line: usize) -> Chunk {
        let metadata = ChunkMetadata {
            source_path: self.source_path,
            page: self.page,
            document_type: self.document_type,
            language: self.language,
            ..ChunkMetadata::default()
        };
        let id = self
            .id
            .unwrap_or_else(|| format!("{fallback_prefix}#{line}"));
        Chunk::new(id, self.text).with_metadata(metadata)
    }
}

/// Parse JSONL text into chunks. Blank lines are skipped; a malformed line
/// fails the whole load.
pub fn parse_corpus(raw: &str, fallback_prefix: &str) -> anyhow::Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: CorpusRecord = serde_json::from_str(line)
            .with_context(|| format!("corpus line {} is not a valid record", idx + 1))?;
        if record.text.trim().is_empty() {
            warn!(line = idx + 1, "Skipping corpus record with empty text");
            continue;
        }
        chunks.push(record.into_chunk(fallback_prefix, idx));
    }
    Ok(chunks)
}

pub async fn load_corpus(path: &Path) -> anyhow::Result<Vec<Chunk>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read corpus {}", path.display()))?;
    let prefix = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("corpus");
    let chunks = parse_corpus(&raw, prefix)?;
    if chunks.is_empty() {
        bail!("corpus {} contains no passages", path.display());
    }
    Ok(chunks)
}

/// The library pipeline plus the builder used for temporary indexes.
pub struct Library {
    pub pipeline: Arc<RetrievalPipeline>,
    pub builder: Arc<dyn IndexBuilder>,
}

/// Index the corpus with the reference in-memory collaborators.
pub async fn build_library(chunks: Vec<Chunk>, config: &AthenaeumConfig) -> anyhow::Result<Library> {
    let count = chunks.len();
    let builder: Arc<dyn IndexBuilder> =
        Arc::new(InMemoryIndexBuilder::new(Arc::new(HashEmbedder::default())));
    let index = builder
        .build(chunks)
        .await
        .map_err(|e| anyhow::anyhow!("failed to index corpus: {e}"))?;
    info!(passages = count, "Library indexed");

    let pipeline = RetrievalPipeline::new(
        HybridRetriever::new(
            Arc::new(index.dense_retriever()),
            Arc::new(index.sparse_retriever()),
            &config.retrieval,
        ),
        Reranker::new(Arc::new(LexicalOverlapScorer::new())),
        &config.retrieval,
    );
    Ok(Library {
        pipeline: Arc::new(pipeline),
        builder,
    })
}
