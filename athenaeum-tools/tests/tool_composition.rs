//! Integration tests for tool composition.
//!
//! The default registry driven by the agent and the heuristic policy:
//! knowledge-base answers with sources, routing to cross-examination, and the
//! empty-library path.

use athenaeum_core::agent::{Agent, RecordingCallback};
use athenaeum_core::config::{AthenaeumConfig, ToolsConfig};
use athenaeum_core::crossexam::{CrossExamination, FsDraftLoader};
use athenaeum_core::index::{HashEmbedder, InMemoryIndexBuilder, IndexBuilder, LexicalOverlapScorer};
use athenaeum_core::memory::InMemoryStore;
use athenaeum_core::policy::HeuristicPolicy;
use athenaeum_core::retrieval::{Chunk, ChunkMetadata, HybridRetriever, Reranker, RetrievalPipeline};
use athenaeum_core::types::Deadline;
use athenaeum_tools::knowledge::NO_RESULTS;
use athenaeum_tools::{ToolCollaborators, build_default_registry};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config() -> AthenaeumConfig {
    AthenaeumConfig {
        tools: ToolsConfig {
            web_search_enabled: false,
            ..ToolsConfig::default()
        },
        ..AthenaeumConfig::default()
    }
}

async fn pipeline(chunks: Vec<Chunk>, config: &AthenaeumConfig) -> Arc<RetrievalPipeline> {
    let built = InMemoryIndexBuilder::new(Arc::new(HashEmbedder::default()))
        .build(chunks)
        .await
        .unwrap();
    Arc::new(RetrievalPipeline::new(
        HybridRetriever::new(
            Arc::new(built.dense_retriever()),
            Arc::new(built.sparse_retriever()),
            &config.retrieval,
        ),
        Reranker::new(Arc::new(LexicalOverlapScorer::new())),
        &config.retrieval,
    ))
}

fn library() -> Vec<Chunk> {
    vec![
        Chunk::new(
            "dewey#0",
            "Democracy is a mode of associated living and conjoint communicated experience.",
        )
        .with_metadata(
            ChunkMetadata::default()
                .with_source("/library/democracy_and_education.pdf")
                .with_page(87),
        ),
        Chunk::new(
            "peirce#0",
            "Inquiry begins with genuine doubt and ends in the fixation of belief.",
        )
        .with_metadata(
            ChunkMetadata::default()
                .with_source("/library/fixation_of_belief.pdf")
                .with_page(3),
        ),
    ]
}

async fn agent(chunks: Vec<Chunk>) -> (Agent, Arc<RecordingCallback>) {
    let config = config();
    let library = pipeline(chunks, &config).await;
    let workflow = CrossExamination::new(
        Arc::clone(&library),
        Arc::new(InMemoryIndexBuilder::new(Arc::new(HashEmbedder::default()))),
        Arc::new(FsDraftLoader::new()),
        config.retrieval.clone(),
        config.cross_exam.clone(),
    );
    let registry = build_default_registry(
        &config,
        ToolCollaborators::new(library).with_cross_exam(Arc::new(workflow)),
    )
    .unwrap();

    let callback = Arc::new(RecordingCallback::new());
    let agent = Agent::new(
        Arc::new(HeuristicPolicy::new()),
        Arc::new(registry),
        Arc::new(InMemoryStore::new()),
        config.agent.clone(),
    )
    .with_callback(callback.clone());
    (agent, callback)
}

fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(60))
}

#[tokio::test]
async fn test_question_answered_from_knowledge_base_with_sources() {
    let (agent, callback) = agent(library()).await;
    let response = agent
        .run("T1", "What is democracy as associated living?", deadline())
        .await
        .unwrap();

    assert_eq!(callback.tool_calls().await, vec!["knowledge_base_search"]);
    assert_eq!(response.iterations, 1);
    assert!(!response.flags.any());
    assert!(response.text.contains("--- Sources ---"));
    assert!(response.text.contains("democracy_and_education.pdf (Page 87)"));
    assert_eq!(response.citations[0].chunk_id, "dewey#0");
}

#[tokio::test]
async fn test_draft_comparison_routes_to_cross_examination() {
    let dir = TempDir::new().unwrap();
    let draft = dir.path().join("chapter.md");
    std::fs::write(
        &draft,
        "Democracy is a mode of associated living.\n\nPublic schools cultivate shared habits.",
    )
    .unwrap();

    let (agent, callback) = agent(library()).await;
    let message = format!(
        "Please cross-examine {} about democracy",
        draft.to_str().unwrap()
    );
    let response = agent.run("T1", &message, deadline()).await.unwrap();

    assert_eq!(callback.tool_calls().await, vec!["cross_examine_draft"]);
    assert!(response.text.starts_with("## Cross-Examination: "));
    assert!(response.text.contains("Focus: democracy"));
    assert!(
        response
            .citations
            .iter()
            .any(|c| c.corpus.as_deref() == Some("library"))
    );
    assert!(
        response
            .citations
            .iter()
            .any(|c| c.corpus.as_deref() == Some("draft"))
    );
}

#[tokio::test]
async fn test_missing_draft_becomes_error_observation() {
    let (agent, callback) = agent(library()).await;
    let response = agent
        .run("T1", "cross-examine /nonexistent/chapter.md please", deadline())
        .await
        .unwrap();

    let errors = callback.tool_errors().await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "cross_examine_draft");
    assert!(response.text.starts_with("I could not gather supporting material"));
    assert!(response.text.contains("Draft not found"));
}

#[tokio::test]
async fn test_empty_library_without_web_answers_with_no_results() {
    let (agent, _) = agent(Vec::new()).await;
    let response = agent
        .run("T1", "What did Dewey say about habit?", deadline())
        .await
        .unwrap();
    assert_eq!(response.text, NO_RESULTS);
    assert!(response.citations.is_empty());
}
