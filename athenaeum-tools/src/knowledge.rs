//! Knowledge-base tools: hybrid search over the research library.
//!
//! - `knowledge_base_search`: dense + sparse retrieval, fusion and rerank.
//! - `metadata_search`: the same pipeline restricted by a metadata filter.

use async_trait::async_trait;
use athenaeum_core::error::ToolError;
use athenaeum_core::registry::Tool;
use athenaeum_core::retrieval::{Candidate, MetadataFilter, PipelineResult, RetrievalPipeline};
use athenaeum_core::types::{Citation, ToolOutput};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Returned when retrieval finds nothing. Planning policies key off this prefix.
pub const NO_RESULTS: &str = "No relevant passages found in the knowledge base.";

/// Render reranked passages followed by a numbered sources footer.
pub fn format_passages(result: &PipelineResult) -> String {
    if result.candidates.is_empty() {
        return NO_RESULTS.to_string();
    }

    let mut out = String::new();
    for (i, candidate) in result.candidates.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!(
            "[{}] ({}) {}",
            i + 1,
            candidate.citation().label(),
            candidate.chunk.text.trim()
        ));
    }

    out.push_str("\n\n--- Sources ---\n");
    for (i, candidate) in result.candidates.iter().enumerate() {
        out.push_str(&format!("\n{}. {}", i + 1, candidate.citation().label()));
    }

    if result.degraded {
        out.push_str("\n\n[Note: some retrieval sources were unavailable; results may be incomplete.]");
    }
    out
}

fn to_output(result: PipelineResult) -> ToolOutput {
    let citations: Vec<Citation> = result.candidates.iter().map(Candidate::citation).collect();
    let failed: Vec<String> = result
        .failures
        .iter()
        .map(|f| f.retriever.to_string())
        .collect();
    let mut output = ToolOutput::text(format_passages(&result))
        .with_citations(citations)
        .with_partial(result.degraded);
    if !failed.is_empty() {
        output = output.with_metadata("failed_retrievers", serde_json::json!(failed));
    }
    output
}

fn required_str<'a>(
    args: &'a serde_json::Value,
    tool: &str,
    key: &str,
) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments {
            name: tool.to_string(),
            reason: format!("Missing required parameter: {key}"),
        })
}

// ---------------------------------------------------------------------------
// KnowledgeBaseTool
// ---------------------------------------------------------------------------

/// Searches the research library through the full retrieval pipeline.
pub struct KnowledgeBaseTool {
    pipeline: Arc<RetrievalPipeline>,
    timeout: Duration,
}

impl KnowledgeBaseTool {
    pub fn new(pipeline: Arc<RetrievalPipeline>) -> Self {
        Self {
            pipeline,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn name(&self) -> &str {
        "knowledge_base_search"
    }

    fn description(&self) -> &str {
        "Search the research library for information, quotes, concepts and arguments from \
         the indexed corpus. Input should be a specific question or search query. \
         Returns the most relevant passages with cited sources and page numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question or search query"
                }
            },
            "required": ["query"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = required_str(&args, self.name(), "query")?;
        debug!(query, "Knowledge base query");
        let result = self.pipeline.search(query, None).await;
        Ok(to_output(result))
    }
}

// ---------------------------------------------------------------------------
// MetadataSearchTool
// ---------------------------------------------------------------------------

/// Split the compact `"field:value query text"` form.
pub fn parse_filter_prefix(input: &str) -> Option<(MetadataFilter, &str)> {
    let (head, rest) = input.trim().split_once(char::is_whitespace)?;
    let (field, value) = head.split_once(':')?;
    if field.is_empty() || value.is_empty() || rest.trim().is_empty() {
        return None;
    }
    Some((MetadataFilter::new(field, value), rest.trim()))
}

/// Knowledge-base search restricted to chunks whose metadata matches.
pub struct MetadataSearchTool {
    pipeline: Arc<RetrievalPipeline>,
    timeout: Duration,
}

impl MetadataSearchTool {
    pub fn new(pipeline: Arc<RetrievalPipeline>) -> Self {
        Self {
            pipeline,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for MetadataSearchTool {
    fn name(&self) -> &str {
        "metadata_search"
    }

    fn description(&self) -> &str {
        "Search the research library restricted by a metadata filter. \
         Available fields: document_type, language, source_path, page. \
         Provide query, field and value, or write the query as 'field:value query text', \
         e.g. 'document_type:pdf dewey inquiry'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query" },
                "field": { "type": "string", "description": "Metadata field to filter on" },
                "value": { "type": "string", "description": "Required value of the field" }
            },
            "required": ["query"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = required_str(&args, self.name(), "query")?;
        let field = args.get("field").and_then(|v| v.as_str());
        let value = args.get("value").and_then(|v| v.as_str());

        let (filter, query) = match (field, value) {
            (Some(field), Some(value)) => (MetadataFilter::new(field, value), query),
            (None, None) => parse_filter_prefix(query).ok_or_else(|| ToolError::InvalidArguments {
                name: self.name().to_string(),
                reason: "Provide 'field' and 'value', or use the form 'field:value query'"
                    .to_string(),
            })?,
            _ => {
                return Err(ToolError::InvalidArguments {
                    name: self.name().to_string(),
                    reason: "'field' and 'value' must be given together".to_string(),
                });
            }
        };

        debug!(query, field = %filter.field, value = %filter.value, "Metadata search");
        let result = self.pipeline.search(query, Some(&filter)).await;
        Ok(to_output(result)
            .with_metadata("filter", serde_json::json!({"field": filter.field, "value": filter.value})))
    }
}
