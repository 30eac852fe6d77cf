//! End-to-end tests for the cross-examination workflow over the reference
//! in-memory indexes.

use async_trait::async_trait;
use athenaeum_core::config::{CrossExamConfig, RetrievalConfig};
use athenaeum_core::crossexam::{Corpus, CrossExamination, Draft, DraftLoader, FsDraftLoader};
use athenaeum_core::error::{CrossExamError, RetrievalError};
use athenaeum_core::index::{
    BuiltIndex, HashEmbedder, InMemoryIndexBuilder, IndexBuilder, LexicalOverlapScorer,
};
use athenaeum_core::retrieval::{
    Candidate, Chunk, ChunkMetadata, HybridRetriever, MetadataFilter, Reranker, RetrievalPipeline,
    Retriever, RetrieverKind,
};
use athenaeum_core::types::Deadline;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DRAFT: &str = "Democracy is more than a form of government.\n\n\
It is a mode of associated living, of conjoint communicated experience.\n\n\
Zeppelinology offers a neglected lens on civic habit and shared inquiry.";

fn library_chunks() -> Vec<Chunk> {
    let meta = |path: &str, page: u32| {
        ChunkMetadata::default()
            .with_source(path)
            .with_page(page)
            .with_document_type("pdf")
    };
    vec![
        Chunk::new(
            "dewey#0",
            "Democracy is a mode of associated living and conjoint experience.",
        )
        .with_metadata(meta("/library/democracy_and_education.pdf", 87)),
        Chunk::new(
            "dewey#1",
            "Habit is the mainspring of human action and education reconstructs habit.",
        )
        .with_metadata(meta("/library/human_nature.pdf", 12)),
        Chunk::new(
            "peirce#0",
            "Inquiry begins with genuine doubt and ends in the fixation of belief.",
        )
        .with_metadata(meta("/library/fixation_of_belief.pdf", 3)),
    ]
}

async fn build_library() -> (BuiltIndex, Arc<RetrievalPipeline>) {
    let builder = InMemoryIndexBuilder::new(Arc::new(HashEmbedder::default()));
    let built = builder.build(library_chunks()).await.unwrap();
    let config = RetrievalConfig::default();
    let pipeline = RetrievalPipeline::new(
        HybridRetriever::new(
            Arc::new(built.dense_retriever()),
            Arc::new(built.sparse_retriever()),
            &config,
        ),
        Reranker::new(Arc::new(LexicalOverlapScorer::new())),
        &config,
    );
    (built, Arc::new(pipeline))
}

struct StaticLoader {
    drafts: HashMap<String, String>,
}

impl StaticLoader {
    fn with(reference: &str, text: &str) -> Self {
        Self {
            drafts: HashMap::from([(reference.to_string(), text.to_string())]),
        }
    }
}

#[async_trait]
impl DraftLoader for StaticLoader {
    async fn load(&self, reference: &str) -> Result<Draft, CrossExamError> {
        let text = self
            .drafts
            .get(reference)
            .ok_or_else(|| CrossExamError::DraftLoad {
                draft: reference.to_string(),
                message: "unknown draft".to_string(),
            })?;
        Ok(Draft {
            reference: reference.to_string(),
            source: reference.to_string(),
            text: text.clone(),
        })
    }
}

fn workflow(library: Arc<RetrievalPipeline>, loader: Arc<dyn DraftLoader>) -> CrossExamination {
    CrossExamination::new(
        library,
        Arc::new(InMemoryIndexBuilder::new(Arc::new(HashEmbedder::default()))),
        loader,
        RetrievalConfig::default(),
        CrossExamConfig {
            chunk_size: 120,
            chunk_overlap: 0,
            ..CrossExamConfig::default()
        },
    )
}

#[tokio::test]
async fn test_draft_content_never_reaches_library_index() {
    let dir = tempfile::tempdir().unwrap();
    let draft_path = dir.path().join("chapter.md");
    std::fs::write(&draft_path, DRAFT).unwrap();

    let (library_index, library) = build_library().await;
    let workflow = workflow(library.clone(), Arc::new(FsDraftLoader::new()));

    let result = workflow
        .run(
            draft_path.to_str().unwrap(),
            Some("democracy"),
            Deadline::after(Duration::from_secs(30)),
        )
        .await
        .unwrap();

    assert!(!result.partial);
    assert!(result.draft_citations().count() > 0);
    assert!(result.library_citations().count() > 0);
    assert!(
        result
            .draft_citations()
            .all(|c| c.chunk_id.starts_with("chapter#"))
    );

    // The library index is unchanged and knows nothing of the draft.
    assert_eq!(library_index.keyword.len(), 3);
    assert_eq!(library_index.vector.len(), 3);
    let hits = library_index.keyword.query("zeppelinology", 10).await.unwrap();
    assert!(hits.is_empty());
    let fused = library.hybrid().query("zeppelinology neglected lens", 10).await;
    assert!(fused.candidates.iter().all(|c| !c.id().starts_with("chapter#")));
}

#[tokio::test]
async fn test_synergies_and_suggestions() {
    let (_, library) = build_library().await;
    let loader = StaticLoader::with("drafts/chapter.md", DRAFT);
    let workflow = workflow(library, Arc::new(loader));

    let result = workflow
        .run(
            "drafts/chapter.md",
            Some("democracy"),
            Deadline::after(Duration::from_secs(30)),
        )
        .await
        .unwrap();

    assert_eq!(result.queries.draft, "democracy");
    assert_eq!(result.queries.library, "democracy");
    let shared: Vec<&str> = result.synergies.iter().map(|s| s.theme.as_str()).collect();
    assert!(shared.contains(&"associated"), "synergies: {shared:?}");
    // No library passage talks about government.
    assert!(
        result
            .divergences
            .iter()
            .any(|d| d.theme == "government" && d.present_in == Corpus::Draft)
    );
    for suggestion in &result.suggested_additions {
        assert_eq!(suggestion.citation.corpus.as_deref(), Some("library"));
        assert!(suggestion.text.contains(&suggestion.theme));
    }

    let rendered = result.render();
    assert!(rendered.contains("### Synergies"));
    assert!(rendered.contains("--- Relevant Sources from Library ---"));
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

#[tokio::test(start_paused = true)]
async fn test_library_timeout_yields_partial_result() {
    let config = RetrievalConfig::default();
    let stalled = Arc::new(RetrievalPipeline::new(
        HybridRetriever::new(
            Arc::new(StalledRetriever(RetrieverKind::Dense)),
            Arc::new(StalledRetriever(RetrieverKind::Sparse)),
            &config,
        ),
        Reranker::new(Arc::new(LexicalOverlapScorer::new())),
        &config,
    ));
    let workflow = CrossExamination::new(
        stalled,
        Arc::new(InMemoryIndexBuilder::new(Arc::new(HashEmbedder::default()))),
        Arc::new(StaticLoader::with("draft.md", DRAFT)),
        config,
        CrossExamConfig {
            branch_timeout_secs: 1,
            ..CrossExamConfig::default()
        },
    );

    let result = workflow
        .run(
            "draft.md",
            Some("democracy"),
            Deadline::after(Duration::from_secs(60)),
        )
        .await
        .unwrap();

    assert!(result.partial);
    assert!(result.notes.iter().any(|n| n == "library search timed out"));
    // The sibling branch still contributed.
    assert!(result.draft_citations().count() > 0);
    assert_eq!(result.library_citations().count(), 0);
    assert!(result.synergies.is_empty());
}

#[tokio::test]
async fn test_unreadable_draft_fails_workflow() {
    let (_, library) = build_library().await;
    let workflow = workflow(library, Arc::new(StaticLoader::with("a.md", DRAFT)));
    let err = workflow
        .run("missing.md", None, Deadline::after(Duration::from_secs(30)))
        .await
        .unwrap_err();
    assert!(matches!(err, CrossExamError::DraftLoad { ref draft, .. } if draft == "missing.md"));
}

#[tokio::test]
async fn test_empty_draft_fails_workflow() {
    let (_, library) = build_library().await;
    let workflow = workflow(library, Arc::new(StaticLoader::with("blank.md", "  \n\n ")));
    let err = workflow
        .run("blank.md", None, Deadline::after(Duration::from_secs(30)))
        .await
        .unwrap_err();
    assert!(matches!(err, CrossExamError::DraftLoad { .. }));
}
