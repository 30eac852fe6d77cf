//! Planning policies: the decision function behind THINKING.
//!
//! A policy reads the message log and the tool table and returns one typed
//! [`Action`]. In production this is usually an LLM call; the core only
//! depends on the trait.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::error::PolicyError;
use crate::types::{Content, Message, Role, ToolDefinition};

/// What the orchestrator should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    InvokeTool {
        name: String,
        arguments: serde_json::Value,
        /// Why the policy chose this tool; logged as a thought.
        thought: Option<String>,
    },
    FinalAnswer {
        text: String,
    },
}

impl Action {
    pub fn invoke(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Action::InvokeTool {
            name: name.into(),
            arguments,
            thought: None,
        }
    }

    /// Attach a rationale to a tool invocation. No effect on a final answer.
    pub fn with_thought(mut self, text: impl Into<String>) -> Self {
        if let Action::InvokeTool { thought, .. } = &mut self {
            *thought = Some(text.into());
        }
        self
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Action::FinalAnswer { text: text.into() }
    }
}

/// Chooses the next action from the conversation so far.
#[async_trait]
pub trait PlanningPolicy: Send + Sync {
    async fn decide(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Action, PolicyError>;
}

// ---------------------------------------------------------------------------
// Scripted policy
// ---------------------------------------------------------------------------

/// Replays a queue of pre-set decisions.
///
/// When the queue runs dry it repeats the fallback action if one was given,
/// otherwise it fails with [`PolicyError::Exhausted`].
pub struct ScriptedPolicy {
    script: Mutex<VecDeque<Result<Action, PolicyError>>>,
    fallback: Option<Action>,
    calls: AtomicUsize,
}

impl ScriptedPolicy {
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            script: Mutex::new(actions.into_iter().map(Ok).collect()),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A policy that returns `action` on every call.
    pub fn repeating(action: Action) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(action),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a failure.
    pub async fn push_error(&self, error: PolicyError) {
        self.script.lock().await.push_back(Err(error));
    }

    pub async fn push(&self, action: Action) {
        self.script.lock().await.push_back(Ok(action));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanningPolicy for ScriptedPolicy {
    async fn decide(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<Action, PolicyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().await.pop_front() {
            Some(next) => next,
            None => self.fallback.clone().ok_or(PolicyError::Exhausted),
        }
    }
}

// ---------------------------------------------------------------------------
// Heuristic policy
// ---------------------------------------------------------------------------

const KNOWLEDGE_BASE_TOOL: &str = "knowledge_base_search";
const WEB_SEARCH_TOOL: &str = "web_search";
const CROSS_EXAM_TOOL: &str = "cross_examine_draft";

const DRAFT_EXTENSIONS: &[&str] = &[".md", ".markdown", ".txt", ".tex", ".rst", ".org"];

/// Deterministic rule-based policy.
///
/// - A request mentioning cross-examination, or comparing a draft file, goes
///   to `cross_examine_draft`.
/// - Otherwise `knowledge_base_search` is called once with the user's text;
///   if it comes back empty and `web_search` is registered, the web is tried.
/// - Once an observation exists the policy answers from it.
#[derive(Debug, Clone, Default)]
pub struct HeuristicPolicy;

impl HeuristicPolicy {
    pub fn new() -> Self {
        Self
    }
}

struct TurnView<'a> {
    question: &'a str,
    /// (tool, output, is_error), oldest first.
    observations: Vec<(&'a str, &'a str, bool)>,
}

fn current_turn(messages: &[Message]) -> Option<TurnView<'_>> {
    let start = messages
        .iter()
        .rposition(|m| m.role == Role::User && matches!(m.content, Content::Text { .. }))?;
    let question = messages[start].content.as_text()?;
    let observations = messages[start + 1..]
        .iter()
        .filter_map(|m| match &m.content {
            Content::Observation {
                tool,
                output,
                is_error,
                ..
            } => Some((tool.as_str(), output.as_str(), *is_error)),
            _ => None,
        })
        .collect();
    Some(TurnView {
        question,
        observations,
    })
}

/// First whitespace-separated token that looks like a draft file path.
fn find_draft_path(text: &str) -> Option<&str> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| matches!(c, '"' | '\'' | ',' | '`' | '(' | ')')))
        .find(|t| {
            let lower = t.to_lowercase();
            DRAFT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        })
}

fn wants_cross_examination(question: &str) -> bool {
    let lower = question.to_lowercase();
    lower.contains("cross-exam")
        || lower.contains("cross exam")
        || (lower.contains("draft")
            && (lower.contains("compare") || lower.contains("library") || lower.contains("literature")))
}

fn has_tool(tools: &[ToolDefinition], name: &str) -> bool {
    tools.iter().any(|t| t.name == name)
}

#[async_trait]
impl PlanningPolicy for HeuristicPolicy {
    async fn decide(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Action, PolicyError> {
        let turn = current_turn(messages).ok_or_else(|| PolicyError::Failed {
            message: "no user message in the log".to_string(),
        })?;

        if let Some(&(tool, output, is_error)) = turn.observations.last() {
            let tried_web = turn.observations.iter().any(|(t, _, _)| *t == WEB_SEARCH_TOOL);
            let empty_kb = tool == KNOWLEDGE_BASE_TOOL && !is_error && output.starts_with("No relevant");
            if empty_kb && !tried_web && has_tool(tools, WEB_SEARCH_TOOL) {
                return Ok(Action::invoke(
                    WEB_SEARCH_TOOL,
                    serde_json::json!({ "query": turn.question }),
                )
                .with_thought("The library has nothing on this; trying the web."));
            }
            if is_error {
                return Ok(Action::answer(format!(
                    "I could not gather supporting material: {output}"
                )));
            }
            return Ok(Action::answer(output.to_string()));
        }

        if wants_cross_examination(turn.question) && has_tool(tools, CROSS_EXAM_TOOL) {
            if let Some(path) = find_draft_path(turn.question) {
                let focus = turn
                    .question
                    .split_once(" about ")
                    .or_else(|| turn.question.split_once(" on "))
                    .map(|(_, rest)| rest.trim().trim_end_matches(['?', '.']).to_string())
                    .filter(|f| !f.is_empty() && !f.contains(path));
                let mut args = serde_json::json!({ "draft_path": path });
                if let Some(focus) = focus {
                    args["focus"] = serde_json::Value::String(focus);
                }
                return Ok(Action::invoke(CROSS_EXAM_TOOL, args)
                    .with_thought(format!("Comparing the draft at {path} against the library.")));
            }
        }

        if has_tool(tools, KNOWLEDGE_BASE_TOOL) {
            return Ok(Action::invoke(
                KNOWLEDGE_BASE_TOOL,
                serde_json::json!({ "query": turn.question }),
            )
            .with_thought("Searching the library for supporting passages."));
        }

        Ok(Action::answer(
            "I have no search tools available to answer this question.",
        ))
    }
}
