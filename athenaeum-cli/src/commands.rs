//! Subcommand handlers.

use crate::Commands;
use crate::corpus::{Library, build_library, load_corpus};
use anyhow::Context as _;
use athenaeum_core::agent::Agent;
use athenaeum_core::config::AthenaeumConfig;
use athenaeum_core::crossexam::{CrossExamination, FsDraftLoader};
use athenaeum_core::memory::{FileMemoryStore, InMemoryStore, MemoryStore};
use athenaeum_core::policy::HeuristicPolicy;
use athenaeum_core::types::{Citation, Deadline};
use athenaeum_tools::references::Reference;
use athenaeum_tools::{
    DirProjectCatalog, InMemoryReferenceLibrary, ToolCollaborators, UnpaywallFinder,
    build_default_registry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub config: AthenaeumConfig,
    pub corpus: PathBuf,
    pub references: Option<PathBuf>,
}

pub async fn handle_command(command: Commands, ctx: Context) -> anyhow::Result<()> {
    let chunks = load_corpus(&ctx.corpus).await?;
    let library = build_library(chunks, &ctx.config).await?;

    match command {
        Commands::Search {
            query,
            top_k,
            explain,
        } => search(&library, &query, top_k, explain).await,
        Commands::Ask { message, thread } => ask(&ctx, &library, &message, &thread).await,
        Commands::CrossExamine { draft, focus } => {
            cross_examine(&ctx.config, &library, &draft, focus.as_deref()).await
        }
    }
}

async fn search(
    library: &Library,
    query: &str,
    top_k: Option<usize>,
    explain: bool,
) -> anyhow::Result<()> {
    let top_n = top_k.unwrap_or(library.pipeline.rerank_top_n());

    if explain {
        let explanation = library
            .pipeline
            .hybrid()
            .explain(query, library.pipeline.fusion_top_k())
            .await;
        println!("Query: {query}  (rrf k = {})", explanation.rrf_k);
        for report in &explanation.retrievers {
            println!("\n[{}]", report.retriever);
            if let Some(error) = &report.error {
                println!("  failed: {error}");
            }
            for (i, c) in report.candidates.iter().enumerate() {
                println!("  {:>2}. {:<24} {:.4}", i + 1, c.id(), c.score);
            }
        }
        println!("\n[fused]");
        for (i, c) in explanation.fused.iter().enumerate() {
            println!("  {:>2}. {:<24} {:.4}", i + 1, c.id(), c.score);
        }

        let rerank = library
            .pipeline
            .reranker()
            .explain(query, explanation.fused, top_n)
            .await;
        println!("\n[reranked, top {}]", rerank.top_n);
        for entry in &rerank.entries {
            match (entry.new_rank, entry.new_score) {
                (Some(rank), Some(score)) => println!(
                    "  {:>2} -> {:>2}  {:<24} {:.4}",
                    entry.original_rank, rank, entry.chunk_id, score
                ),
                _ => println!("  {:>2} -> --  {}", entry.original_rank, entry.chunk_id),
            }
        }
        println!();
    }

    let result = library.pipeline.search_with(query, None, top_n).await;
    if result.candidates.is_empty() {
        println!("No relevant passages found.");
    }
    for (i, candidate) in result.candidates.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}\n   {}\n",
            i + 1,
            candidate.score,
            candidate.citation().label(),
            candidate.chunk.text.trim()
        );
    }
    if result.degraded {
        eprintln!("warning: some retrievers were unavailable; results may be incomplete");
    }
    Ok(())
}

fn cross_exam_workflow(config: &AthenaeumConfig, library: &Library) -> CrossExamination {
    CrossExamination::new(
        Arc::clone(&library.pipeline),
        Arc::clone(&library.builder),
        Arc::new(FsDraftLoader::new()),
        config.retrieval.clone(),
        config.cross_exam.clone(),
    )
}

async fn load_references(path: &Path) -> anyhow::Result<InMemoryReferenceLibrary> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read references {}", path.display()))?;
    let references: Vec<Reference> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid references file {}", path.display()))?;
    info!(count = references.len(), "Reference library loaded");
    Ok(InMemoryReferenceLibrary::new(references))
}

async fn ask(ctx: &Context, library: &Library, message: &str, thread: &str) -> anyhow::Result<()> {
    let config = &ctx.config;
    let mut collaborators = ToolCollaborators::new(Arc::clone(&library.pipeline))
        .with_cross_exam(Arc::new(cross_exam_workflow(config, library)));
    if let Some(path) = &ctx.references {
        collaborators = collaborators.with_references(Arc::new(load_references(path).await?));
    }
    if let Ok(email) = std::env::var("UNPAYWALL_EMAIL") {
        collaborators = collaborators.with_papers(Arc::new(UnpaywallFinder::new(email)));
    }
    if let Some(dirs) = directories::ProjectDirs::from("dev", "athenaeum", "athenaeum") {
        collaborators = collaborators
            .with_projects(Arc::new(DirProjectCatalog::new(dirs.data_dir().join("projects"))));
    }
    let registry = build_default_registry(config, collaborators)?;

    let memory: Arc<dyn MemoryStore> = match config.memory.resolved_persist_dir() {
        Some(dir) => Arc::new(FileMemoryStore::new(dir)),
        None => Arc::new(InMemoryStore::new()),
    };

    let agent = Agent::new(
        Arc::new(HeuristicPolicy::new()),
        Arc::new(registry),
        memory,
        config.agent.clone(),
    );
    let response = agent
        .run(thread, message, Deadline::after(config.agent.request_timeout()))
        .await?;

    println!("{}", response.text);
    if response.flags.any() {
        println!("\n[flags: {}]", response.flags);
    }
    print_sources(&response.citations);
    Ok(())
}

async fn cross_examine(
    config: &AthenaeumConfig,
    library: &Library,
    draft: &str,
    focus: Option<&str>,
) -> anyhow::Result<()> {
    let workflow = cross_exam_workflow(config, library);
    let deadline = Deadline::after(config.cross_exam.branch_timeout().saturating_mul(2));
    let result = workflow.run(draft, focus, deadline).await?;
    println!("{}", result.render());
    Ok(())
}

fn print_sources(citations: &[Citation]) {
    if citations.is_empty() {
        return;
    }
    println!("\nSources:");
    for (i, citation) in citations.iter().enumerate() {
        println!("  {}. {}", i + 1, citation.label());
    }
}
