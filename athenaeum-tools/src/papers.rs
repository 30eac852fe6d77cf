//! Open-access paper lookup by DOI.

use async_trait::async_trait;
use athenaeum_core::error::ToolError;
use athenaeum_core::registry::Tool;
use athenaeum_core::retrieval::CollaboratorError;
use athenaeum_core::types::ToolOutput;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Where an open-access copy of a paper can be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperLocation {
    pub doi: String,
    pub pdf_url: String,
    /// Service that reported the location.
    pub source: String,
}

/// Resolves DOIs to open-access copies.
#[async_trait]
pub trait PaperFinder: Send + Sync {
    /// `Ok(None)` when no open-access copy is known.
    async fn find_by_doi(&self, doi: &str) -> Result<Option<PaperLocation>, CollaboratorError>;
}

/// Strip resolver prefixes and check the `10.<registrant>/<suffix>` shape.
pub fn normalize_doi(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let doi = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed)
        .trim();
    let (registrant, suffix) = doi.split_once('/')?;
    (registrant.starts_with("10.") && registrant.len() > 3 && !suffix.is_empty())
        .then(|| doi.to_string())
}

/// Queries the Unpaywall API for the best open-access location.
pub struct UnpaywallFinder {
    endpoint: String,
    email: String,
}

impl UnpaywallFinder {
    /// Unpaywall requires a contact email on every request.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            endpoint: "https://api.unpaywall.org/v2".to_string(),
            email: email.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Pull `best_oa_location.url_for_pdf` out of an Unpaywall record.
pub fn parse_unpaywall(doi: &str, body: &serde_json::Value) -> Option<PaperLocation> {
    let url = body
        .get("best_oa_location")?
        .get("url_for_pdf")?
        .as_str()
        .filter(|u| !u.is_empty())?;
    Some(PaperLocation {
        doi: doi.to_string(),
        pdf_url: url.to_string(),
        source: "unpaywall".to_string(),
    })
}

#[async_trait]
impl PaperFinder for UnpaywallFinder {
    async fn find_by_doi(&self, doi: &str) -> Result<Option<PaperLocation>, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("Athenaeum/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CollaboratorError::new(format!("Failed to create HTTP client: {e}")))?;

        let url = format!(
            "{}/{}?email={}",
            self.endpoint.trim_end_matches('/'),
            doi,
            urlencoding::encode(&self.email)
        );
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| CollaboratorError::new(format!("Unpaywall request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CollaboratorError::new(format!(
                "Unpaywall returned HTTP {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError::new(format!("Invalid Unpaywall response: {e}")))?;
        Ok(parse_unpaywall(doi, &body))
    }
}

/// Looks up an open-access copy of a paper by DOI.
pub struct FindPaperTool {
    finder: Arc<dyn PaperFinder>,
    timeout: Duration,
}

impl FindPaperTool {
    pub fn new(finder: Arc<dyn PaperFinder>) -> Self {
        Self {
            finder,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for FindPaperTool {
    fn name(&self) -> &str {
        "find_paper"
    }

    fn description(&self) -> &str {
        "Find an open-access PDF of a paper by its DOI (e.g. '10.1234/example.doi'). \
         Returns the download URL when a legal open-access copy exists."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "doi": {
                    "type": "string",
                    "description": "The paper's DOI"
                }
            },
            "required": ["doi"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let raw = args.get("doi").and_then(|v| v.as_str()).unwrap_or("");
        let doi = normalize_doi(raw).ok_or_else(|| ToolError::InvalidArguments {
            name: "find_paper".into(),
            reason: format!("'{raw}' is not a DOI"),
        })?;

        debug!(doi = %doi, "Looking up open-access copy");
        let location = self
            .finder
            .find_by_doi(&doi)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: "find_paper".into(),
                message: e.to_string(),
            })?;

        match location {
            Some(location) => {
                info!(doi = %doi, url = %location.pdf_url, "Found open-access copy");
                let content = format!(
                    "Found open-access PDF for DOI {} via {}:\n{}",
                    location.doi, location.source, location.pdf_url
                );
                Ok(ToolOutput::text(content)
                    .with_metadata("pdf_url", serde_json::json!(location.pdf_url)))
            }
            None => Ok(ToolOutput::text(format!(
                "Could not find open-access version for DOI: {doi}"
            ))),
        }
    }
}
