//! Reference-library search.
//!
//! The reference manager itself is a collaborator behind [`ReferenceLibrary`];
//! [`InMemoryReferenceLibrary`] serves a fixed list, e.g. loaded from an
//! export file.

use async_trait::async_trait;
use athenaeum_core::error::ToolError;
use athenaeum_core::registry::Tool;
use athenaeum_core::retrieval::CollaboratorError;
use athenaeum_core::types::ToolOutput;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Authors listed before the citation switches to "et al.".
const MAX_AUTHORS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl Creator {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// One bibliographic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
}

impl Reference {
    /// `Last, F.; Last, F. et al. (date). Title. Publication. DOI: ...`
    pub fn citation(&self) -> String {
        let authors: Vec<String> = self
            .creators
            .iter()
            .take(MAX_AUTHORS)
            .filter(|c| !c.last_name.is_empty())
            .map(|c| match c.first_name.chars().next() {
                Some(initial) => format!("{}, {initial}.", c.last_name),
                None => c.last_name.clone(),
            })
            .collect();
        let mut author_str = authors.join("; ");
        if self.creators.len() > MAX_AUTHORS {
            author_str.push_str(" et al.");
        }

        let date = self.date.as_deref().filter(|d| !d.is_empty()).unwrap_or("n.d.");
        let mut citation = format!("{author_str} ({date}). {}.", self.title);
        if let Some(publication) = self.publication.as_deref().filter(|p| !p.is_empty()) {
            citation.push_str(&format!(" {publication}."));
        }
        if let Some(doi) = self.doi.as_deref().filter(|d| !d.is_empty()) {
            citation.push_str(&format!(" DOI: {doi}"));
        }
        citation
    }
}

/// Render a result list, numbered from 1.
pub fn format_references(references: &[Reference]) -> String {
    if references.is_empty() {
        return "No items found.".to_string();
    }
    let mut out = format!("Found {} items:\n\n", references.len());
    for (i, reference) in references.iter().enumerate() {
        out.push_str(&format!("{}. {}\n\n", i + 1, reference.citation()));
    }
    out.trim_end().to_string()
}

/// A parsed reference-library query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceQuery {
    Text(String),
    Author(String),
    Year(i32),
}

impl ReferenceQuery {
    /// Recognizes `author:Name` and `year:YYYY` prefixes (case-insensitive).
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        let lower = input.to_lowercase();
        if lower.starts_with("author:") {
            let author = input["author:".len()..].trim();
            if author.is_empty() {
                return Err("author: needs a name".to_string());
            }
            Ok(Self::Author(author.to_string()))
        } else if lower.starts_with("year:") {
            let year = input["year:".len()..].trim();
            year.parse::<i32>()
                .map(Self::Year)
                .map_err(|_| format!("'{year}' is not a valid year"))
        } else if input.is_empty() {
            Err("query is empty".to_string())
        } else {
            Ok(Self::Text(input.to_string()))
        }
    }
}

/// A bibliographic reference manager.
#[async_trait]
pub trait ReferenceLibrary: Send + Sync {
    async fn search(
        &self,
        query: &ReferenceQuery,
        limit: usize,
    ) -> Result<Vec<Reference>, CollaboratorError>;
}

/// Serves a fixed list of references.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceLibrary {
    references: Vec<Reference>,
}

impl InMemoryReferenceLibrary {
    pub fn new(references: Vec<Reference>) -> Self {
        Self { references }
    }

    fn matches(reference: &Reference, query: &ReferenceQuery) -> bool {
        match query {
            ReferenceQuery::Author(name) => {
                let name = name.to_lowercase();
                reference
                    .creators
                    .iter()
                    .any(|c| c.full_name().to_lowercase().contains(&name))
            }
            ReferenceQuery::Year(year) => reference
                .date
                .as_deref()
                .is_some_and(|d| d.contains(&year.to_string())),
            ReferenceQuery::Text(text) => {
                let haystack = format!(
                    "{} {} {} {}",
                    reference.title,
                    reference
                        .creators
                        .iter()
                        .map(Creator::full_name)
                        .collect::<Vec<_>>()
                        .join(" "),
                    reference.publication.as_deref().unwrap_or(""),
                    reference.doi.as_deref().unwrap_or("")
                )
                .to_lowercase();
                text.to_lowercase()
                    .split_whitespace()
                    .all(|term| haystack.contains(term))
            }
        }
    }
}

#[async_trait]
impl ReferenceLibrary for InMemoryReferenceLibrary {
    async fn search(
        &self,
        query: &ReferenceQuery,
        limit: usize,
    ) -> Result<Vec<Reference>, CollaboratorError> {
        Ok(self
            .references
            .iter()
            .filter(|r| Self::matches(r, query))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Searches the reference library for citations.
pub struct SearchReferencesTool {
    library: Arc<dyn ReferenceLibrary>,
    limit: usize,
    timeout: Duration,
}

impl SearchReferencesTool {
    pub fn new(library: Arc<dyn ReferenceLibrary>) -> Self {
        Self {
            library,
            limit: 10,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for SearchReferencesTool {
    fn name(&self) -> &str {
        "search_references"
    }

    fn description(&self) -> &str {
        "Search your reference library for citations and papers. \
         The query can be general text, 'author:Name' to search by author, \
         or 'year:YYYY' to search by year. Returns formatted citations with DOI when available."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search text, or 'author:Name', or 'year:YYYY'"
                }
            },
            "required": ["query"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let raw = args.get("query").and_then(|v| v.as_str()).unwrap_or("");
        let query = ReferenceQuery::parse(raw).map_err(|reason| ToolError::InvalidArguments {
            name: "search_references".into(),
            reason,
        })?;

        let references = self
            .library
            .search(&query, self.limit)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: "search_references".into(),
                message: format!("Reference search failed: {e}"),
            })?;
        debug!(query = ?query, found = references.len(), "Reference search");

        Ok(ToolOutput::text(format_references(&references))
            .with_metadata("count", serde_json::json!(references.len())))
    }
}
