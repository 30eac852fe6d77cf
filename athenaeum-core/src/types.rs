//! Core type definitions for Athenaeum.
//!
//! Defines the data structures shared by the orchestrator, the tools and the
//! memory store: messages and their content, tool definitions and outputs,
//! citations, agent state, deadlines, and the final response envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Content within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Plain text, used for user turns.
    Text { text: String },
    /// Intermediate reasoning emitted by the planning policy.
    Thought { text: String },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    Observation {
        call_id: String,
        tool: String,
        output: String,
        is_error: bool,
    },
    Answer {
        text: String,
        #[serde(default)]
        flags: ResponseFlags,
    },
}

impl Content {
    /// Create a simple text content.
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    /// Create a tool call content.
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Content::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Create an observation content.
    pub fn observation(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Content::Observation {
            call_id: call_id.into(),
            tool: tool.into(),
            output: output.into(),
            is_error,
        }
    }

    /// Returns the human-readable text carried by this content, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } | Content::Thought { text } | Content::Answer { text, .. } => {
                Some(text)
            }
            Content::Observation { output, .. } => Some(output),
            Content::ToolCall { .. } => None,
        }
    }
}

/// A single entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: Content,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Create a new message with auto-generated ID and current timestamp.
    pub fn new(role: Role, content: Content) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::text(text))
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Content::Thought { text: text.into() })
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::new(Role::Assistant, Content::tool_call(id, name, arguments))
    }

    pub fn observation(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::new(
            Role::Tool,
            Content::observation(call_id, tool, output, is_error),
        )
    }

    pub fn answer(text: impl Into<String>, flags: ResponseFlags) -> Self {
        Self::new(
            Role::Assistant,
            Content::Answer {
                text: text.into(),
                flags,
            },
        )
    }

    /// Add metadata to this message.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_observation(&self) -> bool {
        matches!(self.content, Content::Observation { .. })
    }
}

/// A definition describing a tool for the planning policy.
///
/// The description is part of the contract: policies select tools by matching
/// against it, so changing it changes behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A source reference attached to retrieved evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub score: f64,
    /// Which corpus the evidence came from (e.g. "library", "draft").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus: Option<String>,
}

impl Citation {
    /// Short label in the form `file.pdf (Page 3)`.
    pub fn label(&self) -> String {
        let name = self
            .source_path
            .as_deref()
            .map(|p| {
                std::path::Path::new(p)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(p)
                    .to_string()
            })
            .unwrap_or_else(|| "Unknown".to_string());
        match self.page {
            Some(page) => format!("{name} (Page {page})"),
            None => format!("{name} (Page N/A)"),
        }
    }
}

/// Output produced by a tool invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Set when the tool answered from degraded inputs.
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolOutput {
    /// Create a simple text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Orchestrator state-machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Thinking,
    Acting,
    Observing,
    Responding,
    Done,
    Failed,
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Done | AgentStatus::Failed)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Thinking => write!(f, "thinking"),
            AgentStatus::Acting => write!(f, "acting"),
            AgentStatus::Observing => write!(f, "observing"),
            AgentStatus::Responding => write!(f, "responding"),
            AgentStatus::Done => write!(f, "done"),
            AgentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Quality flags attached to a final answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFlags {
    /// The iteration budget ran out before the policy answered.
    pub incomplete: bool,
    /// The overall request deadline expired.
    pub timed_out: bool,
    /// At least one observation came from degraded retrieval.
    pub partial_sources: bool,
}

impl ResponseFlags {
    pub fn any(&self) -> bool {
        self.incomplete || self.timed_out || self.partial_sources
    }
}

impl std::fmt::Display for ResponseFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = Vec::new();
        if self.incomplete {
            names.push("incomplete");
        }
        if self.timed_out {
            names.push("timed_out");
        }
        if self.partial_sources {
            names.push("partial_sources");
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(","))
        }
    }
}

/// The full state of one conversation thread.
///
/// Owned by the orchestrator for the duration of one turn and checkpointed
/// into the memory store at turn boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub thread_id: String,
    pub messages: Vec<Message>,
    /// Number of completed turns already checkpointed for this thread.
    pub turns: u64,
    /// Tool invocations in the current turn.
    pub iteration: usize,
    pub status: AgentStatus,
    pub terminated: bool,
}

impl AgentState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            turns: 0,
            iteration: 0,
            status: AgentStatus::Idle,
            terminated: false,
        }
    }

    /// Start a new turn. Returns the index of the turn's first message.
    pub fn begin_turn(&mut self, user_message: impl Into<String>) -> usize {
        let start = self.messages.len();
        self.messages.push(Message::user(user_message));
        self.iteration = 0;
        self.status = AgentStatus::Thinking;
        self.terminated = false;
        start
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn transition(&mut self, status: AgentStatus) {
        self.status = status;
        self.terminated = status.is_terminal();
    }

    /// Observations recorded since `start`, oldest first.
    pub fn observations_since(&self, start: usize) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .skip(start)
            .filter(|m| m.is_observation())
    }
}

/// Budgets beyond this are clamped, so `now + budget` cannot overflow.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn offset(now: Instant, budget: Duration) -> Instant {
    now + budget.min(FAR_FUTURE)
}

/// An absolute point in time by which work must finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// `now + budget`, with budgets past thirty years clamped.
    pub fn after(budget: Duration) -> Self {
        Self(offset(Instant::now(), budget))
    }

    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// A deadline that is the earlier of this one and `now + budget`.
    pub fn sub_deadline(&self, budget: Duration) -> Deadline {
        Deadline(self.0.min(offset(Instant::now(), budget)))
    }

    /// A deadline `margin` earlier than this one, never before now.
    pub fn reserve(&self, margin: Duration) -> Deadline {
        let now = Instant::now();
        let earlier = self.0.checked_sub(margin).unwrap_or(now);
        Deadline(earlier.max(now))
    }
}

/// What the caller receives from one orchestrator turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub thread_id: String,
    pub text: String,
    pub citations: Vec<Citation>,
    pub flags: ResponseFlags,
    pub iterations: usize,
    /// 1-based index of the turn that produced this response.
    pub turn: u64,
}
