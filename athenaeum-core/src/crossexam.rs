//! Cross-examination: compare a draft against the research library.
//!
//! The draft is chunked and indexed into a throwaway index pair that lives
//! only for the duration of one run; the persistent library index is only
//! ever read. Both corpora are searched concurrently with the full
//! retrieve-fuse-rerank pipeline, each under its own branch deadline, and the
//! two ranked result sets are compared by their salient terms.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{CrossExamConfig, RetrievalConfig};
use crate::error::CrossExamError;
use crate::index::{IndexBuilder, chunk_document, tokenize};
use crate::retrieval::{Candidate, CollaboratorError, HybridRetriever, RetrievalPipeline};
use crate::types::{Citation, Deadline};

/// Which side of the comparison a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corpus {
    Draft,
    Library,
}

impl Corpus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Corpus::Draft => "draft",
            Corpus::Library => "library",
        }
    }

    fn other(&self) -> Corpus {
        match self {
            Corpus::Draft => Corpus::Library,
            Corpus::Library => Corpus::Draft,
        }
    }
}

impl std::fmt::Display for Corpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Draft loading
// ---------------------------------------------------------------------------

/// A loaded draft document.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    /// The reference the caller passed in.
    pub reference: String,
    /// Resolved source path, used for chunk ids and citations.
    pub source: String,
    pub text: String,
}

/// Resolves an opaque draft reference to its text.
#[async_trait]
pub trait DraftLoader: Send + Sync {
    async fn load(&self, reference: &str) -> Result<Draft, CrossExamError>;
}

/// Loads drafts from the local filesystem. A leading `~` is expanded to the
/// user's home directory.
#[derive(Debug, Clone, Default)]
pub struct FsDraftLoader;

impl FsDraftLoader {
    pub fn new() -> Self {
        Self
    }
}

/// Expand a leading `~` or `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let home = || directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    if path == "~" {
        if let Some(home) = home() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[async_trait]
impl DraftLoader for FsDraftLoader {
    async fn load(&self, reference: &str) -> Result<Draft, CrossExamError> {
        let path = expand_home(reference.trim());
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| CrossExamError::DraftLoad {
                draft: reference.to_string(),
                message: if e.kind() == std::io::ErrorKind::NotFound {
                    format!("Draft not found: {}", path.display())
                } else {
                    e.to_string()
                },
            })?;
        let text = String::from_utf8(bytes).map_err(|e| CrossExamError::DraftLoad {
            draft: reference.to_string(),
            message: format!("draft is not valid UTF-8: {e}"),
        })?;
        Ok(Draft {
            reference: reference.to_string(),
            source: path.display().to_string(),
            text,
        })
    }
}

// ---------------------------------------------------------------------------
// Query decomposition
// ---------------------------------------------------------------------------

const DEFAULT_FOCUS: &str = "main arguments and concepts";

/// The per-corpus queries of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQueries {
    pub draft: String,
    pub library: String,
}

/// Split a focus into draft-scoped and library-scoped queries.
///
/// Both scopes reuse the focus text verbatim; without a focus the run looks
/// for the draft's main arguments.
pub fn decompose(focus: Option<&str>) -> SubQueries {
    let query = focus
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_FOCUS)
        .to_string();
    SubQueries {
        draft: query.clone(),
        library: query,
    }
}

/// Optional collaborator that rewrites a sub-query for its corpus.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    async fn rewrite(&self, query: &str, corpus: Corpus) -> Result<String, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Result model
// ---------------------------------------------------------------------------

/// A salient term in one corpus's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub term: String,
    /// Sum of reciprocal ranks of the results that mention the term.
    pub weight: f64,
    pub chunk_ids: Vec<String>,
}

/// A theme both corpora share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synergy {
    pub theme: String,
    pub draft_chunks: Vec<String>,
    pub library_chunks: Vec<String>,
}

/// A theme prominent in one corpus and absent from the other's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    pub theme: String,
    pub present_in: Corpus,
    pub chunks: Vec<String>,
}

/// Library material the draft does not yet cover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub theme: String,
    pub text: String,
    pub citation: Citation,
}

/// Structured outcome of one cross-examination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossExamResult {
    pub draft: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    pub queries: SubQueries,
    pub synergies: Vec<Synergy>,
    pub divergences: Vec<Divergence>,
    pub suggested_additions: Vec<Suggestion>,
    /// Every cited chunk, draft first, each tagged with its corpus.
    pub citations: Vec<Citation>,
    /// Set when either branch timed out or ran degraded.
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl CrossExamResult {
    pub fn library_citations(&self) -> impl Iterator<Item = &Citation> {
        self.citations
            .iter()
            .filter(|c| c.corpus.as_deref() == Some(Corpus::Library.as_str()))
    }

    pub fn draft_citations(&self) -> impl Iterator<Item = &Citation> {
        self.citations
            .iter()
            .filter(|c| c.corpus.as_deref() == Some(Corpus::Draft.as_str()))
    }

    /// Markdown rendering for display or as a tool observation.
    pub fn render(&self) -> String {
        let mut out = format!("## Cross-Examination: {}\n", self.draft);
        if let Some(focus) = &self.focus {
            out.push_str(&format!("Focus: {focus}\n"));
        }
        if self.partial {
            out.push_str("\n[partial: one or more sources were unavailable]\n");
            for note in &self.notes {
                out.push_str(&format!("- {note}\n"));
            }
        }

        out.push_str("\n### Synergies\n");
        if self.synergies.is_empty() {
            out.push_str("None found.\n");
        }
        for s in &self.synergies {
            out.push_str(&format!(
                "- **{}**: draft {} / library {}\n",
                s.theme,
                s.draft_chunks.join(", "),
                s.library_chunks.join(", ")
            ));
        }

        out.push_str("\n### Divergences\n");
        if self.divergences.is_empty() {
            out.push_str("None found.\n");
        }
        for d in &self.divergences {
            out.push_str(&format!(
                "- **{}** appears only in the {} ({})\n",
                d.theme,
                d.present_in,
                d.chunks.join(", ")
            ));
        }

        out.push_str("\n### Suggested Additions\n");
        if self.suggested_additions.is_empty() {
            out.push_str("None.\n");
        }
        for s in &self.suggested_additions {
            out.push_str(&format!("- {}\n", s.text));
        }

        let library: Vec<&Citation> = self.library_citations().take(5).collect();
        if !library.is_empty() {
            out.push_str("\n--- Relevant Sources from Library ---\n");
            for (i, c) in library.iter().enumerate() {
                out.push_str(&format!("\n{}. {}", i + 1, c.label()));
            }
            out.push('\n');
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Theme extraction and comparison
// ---------------------------------------------------------------------------

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him",
    "his", "how", "however", "if", "in", "into", "is", "it", "its", "itself", "just", "more",
    "most", "must", "my", "no", "nor", "not", "now", "of", "off", "on", "once", "one", "only",
    "or", "other", "our", "ours", "out", "over", "own", "same", "she", "should", "so", "some",
    "such", "than", "that", "the", "their", "theirs", "them", "then", "there", "these", "they",
    "this", "those", "through", "thus", "to", "too", "under", "until", "up", "upon", "very",
    "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "within", "without", "would", "you", "your", "yours",
];

fn is_theme_term(term: &str, stopwords: &HashSet<&str>) -> bool {
    term.chars().count() >= 3
        && !term.chars().all(|c| c.is_ascii_digit())
        && !stopwords.contains(term)
}

/// Salient terms of a ranked result list, heaviest first.
///
/// A term's weight is the sum of `1 / rank` over the results containing it,
/// so terms from top-ranked passages dominate. Terms of the query itself are
/// excluded. Ties break alphabetically.
pub fn extract_themes(candidates: &[Candidate], query: &str, max_themes: usize) -> Vec<Theme> {
    let stopwords: HashSet<&str> = STOPWORDS.iter().copied().collect();
    let query_terms: HashSet<String> = tokenize(query).into_iter().collect();

    let mut weights: BTreeMap<String, (f64, Vec<String>)> = BTreeMap::new();
    for (i, candidate) in candidates.iter().enumerate() {
        let rank = (i + 1) as f64;
        let terms: BTreeSet<String> = tokenize(&candidate.chunk.text)
            .into_iter()
            .filter(|t| is_theme_term(t, &stopwords) && !query_terms.contains(t))
            .collect();
        for term in terms {
            let entry = weights.entry(term).or_insert((0.0, Vec::new()));
            entry.0 += 1.0 / rank;
            entry.1.push(candidate.id().to_string());
        }
    }

    let mut themes: Vec<Theme> = weights
        .into_iter()
        .map(|(term, (weight, chunk_ids))| Theme {
            term,
            weight,
            chunk_ids,
        })
        .collect();
    themes.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.term.cmp(&b.term)));
    themes.truncate(max_themes);
    themes
}

fn vocabulary(candidates: &[Candidate]) -> HashSet<String> {
    candidates
        .iter()
        .flat_map(|c| tokenize(&c.chunk.text))
        .collect()
}

/// Compare the theme sets of the two corpora.
pub fn compare_themes(
    draft: &[Candidate],
    library: &[Candidate],
    draft_themes: &[Theme],
    library_themes: &[Theme],
) -> (Vec<Synergy>, Vec<Divergence>) {
    let draft_vocab = vocabulary(draft);
    let library_vocab = vocabulary(library);

    let mut synergies = Vec::new();
    for theme in draft_themes {
        if let Some(other) = library_themes.iter().find(|t| t.term == theme.term) {
            synergies.push(Synergy {
                theme: theme.term.clone(),
                draft_chunks: theme.chunk_ids.clone(),
                library_chunks: other.chunk_ids.clone(),
            });
        }
    }

    let mut divergences = Vec::new();
    for (themes, corpus) in [(draft_themes, Corpus::Draft), (library_themes, Corpus::Library)] {
        let other_vocab = match corpus.other() {
            Corpus::Draft => &draft_vocab,
            Corpus::Library => &library_vocab,
        };
        for theme in themes {
            if !other_vocab.contains(&theme.term) {
                divergences.push(Divergence {
                    theme: theme.term.clone(),
                    present_in: corpus,
                    chunks: theme.chunk_ids.clone(),
                });
            }
        }
    }
    (synergies, divergences)
}

fn tagged_citation(candidate: &Candidate, corpus: Corpus) -> Citation {
    let mut citation = candidate.citation();
    citation.corpus = Some(corpus.as_str().to_string());
    citation
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

struct BranchOutcome {
    candidates: Vec<Candidate>,
    timed_out: bool,
    degraded: bool,
}

/// Runs the cross-examination workflow against a fixed library pipeline.
pub struct CrossExamination {
    library: Arc<RetrievalPipeline>,
    builder: Arc<dyn IndexBuilder>,
    loader: Arc<dyn DraftLoader>,
    rewriter: Option<Arc<dyn QueryRewriter>>,
    retrieval: RetrievalConfig,
    config: CrossExamConfig,
}

impl CrossExamination {
    pub fn new(
        library: Arc<RetrievalPipeline>,
        builder: Arc<dyn IndexBuilder>,
        loader: Arc<dyn DraftLoader>,
        retrieval: RetrievalConfig,
        config: CrossExamConfig,
    ) -> Self {
        Self {
            library,
            builder,
            loader,
            rewriter: None,
            retrieval,
            config,
        }
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn QueryRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub fn config(&self) -> &CrossExamConfig {
        &self.config
    }

    /// Cross-examine `draft_ref` against the library.
    ///
    /// Fails only when the draft cannot be loaded or indexed. A branch that
    /// times out or degrades contributes what it has and marks the result
    /// partial.
    pub async fn run(
        &self,
        draft_ref: &str,
        focus: Option<&str>,
        deadline: Deadline,
    ) -> Result<CrossExamResult, CrossExamError> {
        info!(draft = draft_ref, focus = ?focus, "Cross-examination started");
        let draft = self.loader.load(draft_ref).await?;

        let chunks = chunk_document(
            &draft.source,
            &draft.text,
            self.config.chunk_size,
            self.config.chunk_overlap,
        );
        if chunks.is_empty() {
            return Err(CrossExamError::DraftLoad {
                draft: draft_ref.to_string(),
                message: "draft contains no text".to_string(),
            });
        }
        let chunk_count = chunks.len();
        let built = self
            .builder
            .build(chunks)
            .await
            .map_err(|e| CrossExamError::Index { message: e.message })?;
        debug!(chunks = chunk_count, "Temporary draft index built");

        let draft_pipeline = RetrievalPipeline::new(
            HybridRetriever::new(
                Arc::new(built.dense_retriever()),
                Arc::new(built.sparse_retriever()),
                &self.retrieval,
            ),
            self.library.reranker().clone(),
            &self.retrieval,
        );

        let mut queries = decompose(focus);
        if let Some(rewriter) = &self.rewriter {
            queries.draft = self.rewrite(rewriter.as_ref(), &queries.draft, Corpus::Draft).await;
            queries.library = self
                .rewrite(rewriter.as_ref(), &queries.library, Corpus::Library)
                .await;
        }

        let branch_deadline = deadline.sub_deadline(self.config.branch_timeout());
        let (draft_branch, library_branch) = tokio::join!(
            self.branch(Corpus::Draft, &draft_pipeline, &queries.draft, branch_deadline),
            self.branch(Corpus::Library, &self.library, &queries.library, branch_deadline),
        );

        let mut notes = Vec::new();
        for (corpus, outcome) in [(Corpus::Draft, &draft_branch), (Corpus::Library, &library_branch)] {
            if outcome.timed_out {
                notes.push(format!("{corpus} search timed out"));
            } else if outcome.degraded {
                notes.push(format!("{corpus} search ran with degraded retrieval"));
            }
        }
        let partial = !notes.is_empty();

        let max_themes = self.config.max_themes;
        let draft_themes = extract_themes(&draft_branch.candidates, &queries.draft, max_themes);
        let library_themes =
            extract_themes(&library_branch.candidates, &queries.library, max_themes);
        let (synergies, divergences) = compare_themes(
            &draft_branch.candidates,
            &library_branch.candidates,
            &draft_themes,
            &library_themes,
        );

        let suggested_additions = divergences
            .iter()
            .filter(|d| d.present_in == Corpus::Library)
            .filter_map(|d| {
                let first = d.chunks.first()?;
                let candidate = library_branch
                    .candidates
                    .iter()
                    .find(|c| c.id() == first.as_str())?;
                let citation = tagged_citation(candidate, Corpus::Library);
                Some(Suggestion {
                    theme: d.theme.clone(),
                    text: format!(
                        "Consider addressing '{}', discussed in {}",
                        d.theme,
                        citation.label()
                    ),
                    citation,
                })
            })
            .collect();

        let citations = draft_branch
            .candidates
            .iter()
            .map(|c| tagged_citation(c, Corpus::Draft))
            .chain(
                library_branch
                    .candidates
                    .iter()
                    .map(|c| tagged_citation(c, Corpus::Library)),
            )
            .collect();

        let result = CrossExamResult {
            draft: draft.reference,
            focus: focus.map(str::to_string),
            queries,
            synergies,
            divergences,
            suggested_additions,
            citations,
            partial,
            notes,
        };
        info!(
            synergies = result.synergies.len(),
            divergences = result.divergences.len(),
            partial,
            "Cross-examination complete"
        );
        Ok(result)
    }

    async fn rewrite(&self, rewriter: &dyn QueryRewriter, query: &str, corpus: Corpus) -> String {
        match rewriter.rewrite(query, corpus).await {
            Ok(rewritten) if !rewritten.trim().is_empty() => rewritten,
            Ok(_) => query.to_string(),
            Err(e) => {
                warn!(%corpus, error = %e, "Query rewrite failed, using the query verbatim");
                query.to_string()
            }
        }
    }

    async fn branch(
        &self,
        corpus: Corpus,
        pipeline: &RetrievalPipeline,
        query: &str,
        deadline: Deadline,
    ) -> BranchOutcome {
        let search = pipeline.search_with(query, None, self.config.top_k);
        match tokio::time::timeout_at(deadline.instant(), search).await {
            Ok(result) => {
                debug!(%corpus, results = result.candidates.len(), "Branch complete");
                BranchOutcome {
                    candidates: result.candidates,
                    timed_out: false,
                    degraded: result.degraded,
                }
            }
            Err(_) => {
                warn!(%corpus, "Branch timed out, treating as empty");
                BranchOutcome {
                    candidates: Vec::new(),
                    timed_out: true,
                    degraded: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{Chunk, ChunkMetadata, Origin};

    fn candidate(id: &str, text: &str) -> Candidate {
        Candidate::new(
            Chunk::new(id, text).with_metadata(ChunkMetadata::default().with_source("lib/a.pdf")),
            1.0,
            Origin::Reranked,
        )
    }

    #[test]
    fn test_decompose_reuses_focus_verbatim() {
        let q = decompose(Some("  democratic experience "));
        assert_eq!(q.draft, "democratic experience");
        assert_eq!(q.library, q.draft);

        let q = decompose(None);
        assert_eq!(q.draft, DEFAULT_FOCUS);
        assert_eq!(decompose(Some("   ")), q);
    }

    #[test]
    fn test_extract_themes_weights_by_rank() {
        let candidates = vec![
            candidate("a", "Habit shapes inquiry and habit shapes growth"),
            candidate("b", "Growth of the community"),
            candidate("c", "Community and growth"),
        ];
        let themes = extract_themes(&candidates, "inquiry", 3);
        let terms: Vec<&str> = themes.iter().map(|t| t.term.as_str()).collect();
        // growth: 1 + 1/2 + 1/3, community: 1/2 + 1/3, habit/shapes: 1
        assert_eq!(terms, vec!["growth", "habit", "shapes"]);
        assert_eq!(themes[0].chunk_ids, vec!["a", "b", "c"]);
        assert!(!terms.contains(&"inquiry"));
    }

    #[test]
    fn test_extract_themes_drops_stopwords_and_numbers() {
        let candidates = vec![candidate("a", "the 2024 results of an experiment")];
        let themes = extract_themes(&candidates, "", 10);
        let terms: Vec<&str> = themes.iter().map(|t| t.term.as_str()).collect();
        assert_eq!(terms, vec!["experiment", "results"]);
    }

    #[test]
    fn test_compare_themes() {
        let draft = vec![candidate("d#0", "education growth freedom")];
        let library = vec![candidate("l#0", "education growth habit")];
        let draft_themes = extract_themes(&draft, "", 8);
        let library_themes = extract_themes(&library, "", 8);

        let (synergies, divergences) =
            compare_themes(&draft, &library, &draft_themes, &library_themes);
        let shared: Vec<&str> = synergies.iter().map(|s| s.theme.as_str()).collect();
        assert_eq!(shared, vec!["education", "growth"]);

        assert_eq!(divergences.len(), 2);
        assert_eq!(divergences[0].theme, "freedom");
        assert_eq!(divergences[0].present_in, Corpus::Draft);
        assert_eq!(divergences[1].theme, "habit");
        assert_eq!(divergences[1].present_in, Corpus::Library);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/draft.md"), PathBuf::from("/abs/draft.md"));
        assert_eq!(expand_home("rel/draft.md"), PathBuf::from("rel/draft.md"));
        if let Some(dirs) = directories::BaseDirs::new() {
            assert_eq!(expand_home("~/d.md"), dirs.home_dir().join("d.md"));
        }
    }

    #[tokio::test]
    async fn test_fs_loader_missing_draft() {
        let err = FsDraftLoader::new()
            .load("/definitely/not/here.md")
            .await
            .unwrap_err();
        match err {
            CrossExamError::DraftLoad { draft, message } => {
                assert_eq!(draft, "/definitely/not/here.md");
                assert!(message.starts_with("Draft not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fs_loader_reads_draft() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapter.md");
        std::fs::write(&path, "Draft text").unwrap();
        let draft = FsDraftLoader::new()
            .load(path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(draft.text, "Draft text");
        assert!(draft.source.ends_with("chapter.md"));
    }

    #[test]
    fn test_render_lists_sections() {
        let citation = Citation {
            chunk_id: "l#0".into(),
            source_path: Some("/lib/dewey.pdf".into()),
            page: Some(3),
            score: 0.4,
            corpus: Some("library".into()),
        };
        let result = CrossExamResult {
            draft: "draft.md".into(),
            focus: Some("habit".into()),
            queries: decompose(Some("habit")),
            synergies: vec![Synergy {
                theme: "growth".into(),
                draft_chunks: vec!["d#0".into()],
                library_chunks: vec!["l#0".into()],
            }],
            divergences: Vec::new(),
            suggested_additions: Vec::new(),
            citations: vec![citation],
            partial: true,
            notes: vec!["library search timed out".into()],
        };
        let text = result.render();
        assert!(text.contains("## Cross-Examination: draft.md"));
        assert!(text.contains("- **growth**: draft d#0 / library l#0"));
        assert!(text.contains("library search timed out"));
        assert!(text.contains("1. dewey.pdf (Page 3)"));
        assert_eq!(result.library_citations().count(), 1);
        assert_eq!(result.draft_citations().count(), 0);
    }
}
