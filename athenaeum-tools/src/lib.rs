//! # Athenaeum Tools
//!
//! Tool implementations for the Athenaeum research agent: knowledge-base and
//! metadata search, web search, file reading, draft cross-examination, and
//! reference-library integrations.

pub mod crossexam;
pub mod file;
pub mod knowledge;
pub mod papers;
pub mod projects;
pub mod references;
pub mod web;

use athenaeum_core::config::AthenaeumConfig;
use athenaeum_core::crossexam::CrossExamination;
use athenaeum_core::error::ToolError;
use athenaeum_core::registry::{Tool, ToolRegistry};
use athenaeum_core::retrieval::RetrievalPipeline;
use std::sync::Arc;

pub use crossexam::CrossExamineTool;
pub use file::ReadFileTool;
pub use knowledge::{KnowledgeBaseTool, MetadataSearchTool};
pub use papers::{FindPaperTool, PaperFinder, UnpaywallFinder};
pub use projects::{DirProjectCatalog, ListProjectsTool, ProjectCatalog};
pub use references::{InMemoryReferenceLibrary, ReferenceLibrary, SearchReferencesTool};
pub use web::WebSearchTool;

/// Collaborators the default tool set is built over. Optional ones leave
/// their tool out of the registry when absent.
pub struct ToolCollaborators {
    pub library: Arc<RetrievalPipeline>,
    pub cross_exam: Option<Arc<CrossExamination>>,
    pub references: Option<Arc<dyn ReferenceLibrary>>,
    pub papers: Option<Arc<dyn PaperFinder>>,
    pub projects: Option<Arc<dyn ProjectCatalog>>,
}

impl ToolCollaborators {
    pub fn new(library: Arc<RetrievalPipeline>) -> Self {
        Self {
            library,
            cross_exam: None,
            references: None,
            papers: None,
            projects: None,
        }
    }

    pub fn with_cross_exam(mut self, workflow: Arc<CrossExamination>) -> Self {
        self.cross_exam = Some(workflow);
        self
    }

    pub fn with_references(mut self, library: Arc<dyn ReferenceLibrary>) -> Self {
        self.references = Some(library);
        self
    }

    pub fn with_papers(mut self, finder: Arc<dyn PaperFinder>) -> Self {
        self.papers = Some(finder);
        self
    }

    pub fn with_projects(mut self, catalog: Arc<dyn ProjectCatalog>) -> Self {
        self.projects = Some(catalog);
        self
    }
}

/// Build and freeze the startup registry.
pub fn build_default_registry(
    config: &AthenaeumConfig,
    collaborators: ToolCollaborators,
) -> Result<ToolRegistry, ToolError> {
    let timeout = std::time::Duration::from_secs(config.tools.default_timeout_secs);

    let mut tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(KnowledgeBaseTool::new(Arc::clone(&collaborators.library)).with_timeout(timeout)),
        Arc::new(MetadataSearchTool::new(Arc::clone(&collaborators.library)).with_timeout(timeout)),
    ];

    if config.tools.web_search_enabled {
        tools.push(Arc::new(WebSearchTool::new(config.tools.web_max_results)));
    } else {
        tracing::debug!("Web search disabled by configuration");
    }

    tools.push(Arc::new(ReadFileTool::new(config.tools.max_file_chars)));

    if let Some(workflow) = collaborators.cross_exam {
        tools.push(Arc::new(CrossExamineTool::new(workflow)));
    }
    if let Some(references) = collaborators.references {
        tools.push(Arc::new(SearchReferencesTool::new(references).with_timeout(timeout)));
    }
    if let Some(finder) = collaborators.papers {
        tools.push(Arc::new(FindPaperTool::new(finder).with_timeout(timeout)));
    }
    if let Some(catalog) = collaborators.projects {
        tools.push(Arc::new(ListProjectsTool::new(catalog)));
    }

    let mut builder = ToolRegistry::builder();
    for tool in tools {
        builder.register(tool)?;
    }
    Ok(builder.build())
}
