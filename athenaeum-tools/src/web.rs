//! Web search tool.
//!
//! `web_search` queries the DuckDuckGo instant-answer API. It is the fallback
//! when the research library has nothing relevant.

use async_trait::async_trait;
use athenaeum_core::error::ToolError;
use athenaeum_core::registry::Tool;
use athenaeum_core::types::ToolOutput;
use std::time::Duration;
use tracing::debug;

const ENDPOINT: &str = "https://api.duckduckgo.com/";

/// Hard ceiling on `max_results`, whatever the caller asks for.
const MAX_RESULTS_CAP: usize = 10;

/// Search the web using the DuckDuckGo instant answers API.
pub struct WebSearchTool {
    endpoint: String,
    max_results: usize,
    timeout: Duration,
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new(5)
    }
}

impl WebSearchTool {
    pub fn new(max_results: usize) -> Self {
        Self {
            endpoint: ENDPOINT.to_string(),
            max_results: max_results.clamp(1, MAX_RESULTS_CAP),
            timeout: Duration::from_secs(15),
        }
    }

    /// Point the tool at a different instant-answer endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn failed(message: String) -> ToolError {
        ToolError::ExecutionFailed {
            name: "web_search".into(),
            message,
        }
    }
}

/// Turn an instant-answer response body into a numbered result listing.
pub fn format_instant_answers(query: &str, body: &serde_json::Value, max_results: usize) -> String {
    let mut results = Vec::new();

    if let Some(abstract_text) = body.get("AbstractText").and_then(|v| v.as_str())
        && !abstract_text.is_empty()
    {
        let source = body
            .get("AbstractSource")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown");
        let url = body
            .get("AbstractURL")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        results.push(format!("[{source}] {abstract_text}\n  URL: {url}"));
    }

    for key in ["RelatedTopics", "Results"] {
        let Some(items) = body.get(key).and_then(|v| v.as_array()) else {
            continue;
        };
        for item in items {
            if results.len() >= max_results {
                break;
            }
            // Grouped topics nest their entries one level down.
            if let Some(text) = item.get("Text").and_then(|v| v.as_str()) {
                let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
                results.push(format!("- {text}\n  URL: {url}"));
            }
        }
    }
    results.truncate(max_results);

    if results.is_empty() {
        format!("No instant answers found for \"{query}\". Try refining your query.")
    } else {
        format!("Search results for \"{query}\":\n\n{}", results.join("\n\n"))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information that is not in the research library: \
         recent events, biographical details, or general background. \
         Returns titles, snippets, and URLs."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": format!(
                        "Maximum number of results to return (default: {}, max: {})",
                        self.max_results, MAX_RESULTS_CAP
                    ),
                    "default": self.max_results
                }
            },
            "required": ["query"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "web_search".into(),
                reason: "Missing required parameter: query".into(),
            })?;

        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map_or(self.max_results, |n| n as usize)
            .clamp(1, MAX_RESULTS_CAP);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("Athenaeum/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Self::failed(format!("Failed to create HTTP client: {e}")))?;

        let url = format!(
            "{}?q={}&format=json&no_html=1&skip_disambig=1",
            self.endpoint,
            urlencoding::encode(query)
        );
        debug!(query, max_results, "Web search");

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::failed(format!("Search request failed: {e}")))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Self::failed(format!("Failed to parse search response: {e}")))?;

        Ok(ToolOutput::text(format_instant_answers(query, &body, max_results)))
    }
}
