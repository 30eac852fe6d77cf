//! `cross_examine_draft`: compare a draft against the research library.

use async_trait::async_trait;
use athenaeum_core::crossexam::CrossExamination;
use athenaeum_core::error::{CrossExamError, ToolError};
use athenaeum_core::registry::Tool;
use athenaeum_core::types::{Deadline, ToolOutput};
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "cross_examine_draft";

/// Extra time on top of the branch timeout for loading and indexing the draft.
const SETUP_ALLOWANCE: Duration = Duration::from_secs(15);

/// Upper bound on the time held back from the workflow for synthesising and
/// rendering once both branches have returned.
const SYNTHESIS_RESERVE: Duration = Duration::from_secs(1);

/// The workflow deadline: the cut-off minus a tenth of what is left, capped
/// at [`SYNTHESIS_RESERVE`], so a stalled branch times out while the tool can
/// still report the other one.
fn workflow_deadline(cutoff: Deadline) -> Deadline {
    cutoff.reserve((cutoff.remaining() / 10).min(SYNTHESIS_RESERVE))
}

/// Split the compact `"path/to/draft.md concept:focus"` form.
pub fn parse_compact_input(input: &str) -> (String, Option<String>) {
    match input.split_once("concept:") {
        Some((path, focus)) => {
            let focus = focus.trim();
            (
                path.trim().to_string(),
                (!focus.is_empty()).then(|| focus.to_string()),
            )
        }
        None => (input.trim().to_string(), None),
    }
}

fn invalid(reason: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments {
        name: NAME.into(),
        reason: reason.into(),
    }
}

/// Runs the cross-examination workflow as an agent tool.
pub struct CrossExamineTool {
    workflow: Arc<CrossExamination>,
    timeout: Duration,
}

impl CrossExamineTool {
    pub fn new(workflow: Arc<CrossExamination>) -> Self {
        let timeout = workflow.config().branch_timeout().saturating_add(SETUP_ALLOWANCE);
        Self { workflow, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn parse_args(args: &serde_json::Value) -> Result<(String, Option<String>), ToolError> {
        if let Some(input) = args.as_str() {
            return Ok(parse_compact_input(input));
        }

        let path = args
            .get("draft_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid("Missing required parameter: draft_path"))?;
        let focus = args
            .get("focus")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);

        match focus {
            Some(focus) => Ok((path.trim().to_string(), Some(focus))),
            None => Ok(parse_compact_input(path)),
        }
    }
}

#[async_trait]
impl Tool for CrossExamineTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Compare a draft document against the research library to find synergies, \
         divergences and material worth adding. Provide draft_path and an optional focus \
         concept. Returns a comparative analysis with source citations."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "draft_path": {
                    "type": "string",
                    "description": "Path to the draft file (markdown or plain text)"
                },
                "focus": {
                    "type": "string",
                    "description": "Optional concept to focus the comparison on"
                }
            },
            "required": ["draft_path"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        self.execute_within(args, Deadline::after(self.timeout)).await
    }

    async fn execute_within(
        &self,
        args: serde_json::Value,
        deadline: Deadline,
    ) -> Result<ToolOutput, ToolError> {
        let (path, focus) = Self::parse_args(&args)?;
        if path.is_empty() {
            return Err(invalid("draft_path is empty"));
        }

        let result = self
            .workflow
            .run(&path, focus.as_deref(), workflow_deadline(deadline))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: NAME.into(),
                message: match e {
                    CrossExamError::DraftLoad { message, .. } => message,
                    other => other.to_string(),
                },
            })?;

        let summary = serde_json::to_value(&result).map_err(|e| ToolError::ExecutionFailed {
            name: NAME.into(),
            message: format!("Failed to serialize result: {e}"),
        })?;

        Ok(ToolOutput::text(result.render())
            .with_citations(result.citations.clone())
            .with_partial(result.partial)
            .with_metadata("cross_exam", summary))
    }
}
