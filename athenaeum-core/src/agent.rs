//! Agent Orchestrator: drives the Think → Act → Observe loop for one turn.
//!
//! Each call to [`Agent::run`] processes a single user message on a thread:
//! it loads the thread's checkpoint, asks the [`PlanningPolicy`] for actions,
//! executes tools through the frozen [`ToolRegistry`], feeds the results back
//! as observations, and finally appends the whole turn to the
//! [`MemoryStore`]. Turns on the same thread are serialized; different threads
//! run independently.

use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::{AgentError, ToolError};
use crate::memory::{MemoryStore, ThreadLocks, Turn};
use crate::policy::{Action, PlanningPolicy};
use crate::registry::ToolRegistry;
use crate::types::{
    AgentResponse, AgentState, AgentStatus, Citation, Content, Deadline, Message, ResponseFlags,
    ToolOutput,
};

/// Observer for orchestrator progress.
#[async_trait::async_trait]
pub trait AgentCallback: Send + Sync {
    /// Notify about a tool execution.
    async fn on_tool_start(&self, tool_name: &str, args: &serde_json::Value);

    /// Notify about a successful tool result.
    async fn on_tool_result(&self, tool_name: &str, output: &ToolOutput, duration_ms: u64);

    /// Notify about agent status changes.
    async fn on_status_change(&self, status: AgentStatus);

    /// Notify about a failed tool call. Default is a no-op.
    async fn on_tool_error(&self, _tool_name: &str, _error: &ToolError) {}

    /// Called at the start of each THINKING step with the 1-based iteration
    /// number and the configured maximum. Default is a no-op.
    async fn on_iteration_start(&self, _iteration: usize, _max_iterations: usize) {}
}

/// Callback that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCallback;

#[async_trait::async_trait]
impl AgentCallback for NoOpCallback {
    async fn on_tool_start(&self, _tool_name: &str, _args: &serde_json::Value) {}
    async fn on_tool_result(&self, _tool_name: &str, _output: &ToolOutput, _duration_ms: u64) {}
    async fn on_status_change(&self, _status: AgentStatus) {}
}

/// Callback that records events for later inspection.
pub struct RecordingCallback {
    tool_calls: tokio::sync::Mutex<Vec<String>>,
    tool_results: tokio::sync::Mutex<Vec<(String, String)>>,
    tool_errors: tokio::sync::Mutex<Vec<(String, String)>>,
    status_changes: tokio::sync::Mutex<Vec<AgentStatus>>,
    iterations: tokio::sync::Mutex<Vec<usize>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self {
            tool_calls: tokio::sync::Mutex::new(Vec::new()),
            tool_results: tokio::sync::Mutex::new(Vec::new()),
            tool_errors: tokio::sync::Mutex::new(Vec::new()),
            status_changes: tokio::sync::Mutex::new(Vec::new()),
            iterations: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn tool_calls(&self) -> Vec<String> {
        self.tool_calls.lock().await.clone()
    }

    /// `(tool, output content)` for each successful call.
    pub async fn tool_results(&self) -> Vec<(String, String)> {
        self.tool_results.lock().await.clone()
    }

    /// `(tool, error message)` for each failed call.
    pub async fn tool_errors(&self) -> Vec<(String, String)> {
        self.tool_errors.lock().await.clone()
    }

    pub async fn status_changes(&self) -> Vec<AgentStatus> {
        self.status_changes.lock().await.clone()
    }

    pub async fn iterations(&self) -> Vec<usize> {
        self.iterations.lock().await.clone()
    }
}

impl Default for RecordingCallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AgentCallback for RecordingCallback {
    async fn on_tool_start(&self, tool_name: &str, _args: &serde_json::Value) {
        self.tool_calls.lock().await.push(tool_name.to_string());
    }

    async fn on_tool_result(&self, tool_name: &str, output: &ToolOutput, _duration_ms: u64) {
        self.tool_results
            .lock()
            .await
            .push((tool_name.to_string(), output.content.clone()));
    }

    async fn on_status_change(&self, status: AgentStatus) {
        self.status_changes.lock().await.push(status);
    }

    async fn on_tool_error(&self, tool_name: &str, error: &ToolError) {
        self.tool_errors
            .lock()
            .await
            .push((tool_name.to_string(), error.to_string()));
    }

    async fn on_iteration_start(&self, iteration: usize, _max_iterations: usize) {
        self.iterations.lock().await.push(iteration);
    }
}

/// Why the loop left THINKING without a policy answer.
enum Forced {
    Incomplete,
    TimedOut,
}

/// The orchestrator. Cheap to share behind an `Arc`; `run` takes `&self`.
pub struct Agent {
    policy: Arc<dyn PlanningPolicy>,
    tools: Arc<ToolRegistry>,
    memory: Arc<dyn MemoryStore>,
    config: AgentConfig,
    callback: Arc<dyn AgentCallback>,
    locks: Arc<ThreadLocks>,
    cancellation: CancellationToken,
}

impl Agent {
    pub fn new(
        policy: Arc<dyn PlanningPolicy>,
        tools: Arc<ToolRegistry>,
        memory: Arc<dyn MemoryStore>,
        config: AgentConfig,
    ) -> Self {
        Self {
            policy,
            tools,
            memory,
            config,
            callback: Arc::new(NoOpCallback),
            locks: Arc::new(ThreadLocks::new()),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn AgentCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Share a lock table with other agents writing to the same store.
    pub fn with_thread_locks(mut self, locks: Arc<ThreadLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Cancel in-flight and future turns.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Get a clone of the cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Process one user message on `thread_id`.
    ///
    /// Degraded outcomes (exhausted iteration budget, expired deadline,
    /// partial sources) still return `Ok` with the matching flags set. Only
    /// an unknown tool, a policy failure, a memory failure or cancellation
    /// abort the turn; aborted turns are not checkpointed.
    pub async fn run(
        &self,
        thread_id: &str,
        user_message: &str,
        deadline: Deadline,
    ) -> Result<AgentResponse, AgentError> {
        let _guard = self.locks.lock(thread_id).await;
        info!(thread_id, "Turn started");

        let mut state = self
            .memory
            .load(thread_id)
            .await
            .map_err(|source| AgentError::Memory {
                thread_id: thread_id.to_string(),
                source,
            })?
            .unwrap_or_else(|| AgentState::new(thread_id));
        let turn_number = state.turns + 1;
        let start = state.begin_turn(user_message);
        self.callback.on_status_change(AgentStatus::Thinking).await;

        let definitions = self.tools.list_definitions();
        let max_iterations = self.config.max_iterations;
        let mut flags = ResponseFlags::default();
        let mut citations: Vec<Citation> = Vec::new();
        // (tool name, consecutive failure count)
        let mut consecutive_failures: (String, usize) = (String::new(), 0);

        let text = loop {
            if self.cancellation.is_cancelled() {
                return Err(self.fail(&mut state, AgentError::Cancelled).await);
            }
            if deadline.is_expired() {
                break self.force_response(&state, start, Forced::TimedOut, &mut flags);
            }
            if state.iteration >= max_iterations {
                break self.force_response(&state, start, Forced::Incomplete, &mut flags);
            }

            self.callback
                .on_iteration_start(state.iteration + 1, max_iterations)
                .await;

            let decision = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    return Err(self.fail(&mut state, AgentError::Cancelled).await);
                }
                _ = tokio::time::sleep_until(deadline.instant()) => None,
                decision = self.policy.decide(&state.messages, &definitions) => Some(decision),
            };
            let action = match decision {
                None => break self.force_response(&state, start, Forced::TimedOut, &mut flags),
                Some(Err(e)) => return Err(self.fail(&mut state, AgentError::Policy(e)).await),
                Some(Ok(action)) => action,
            };

            let (name, arguments) = match action {
                Action::FinalAnswer { text } => break text,
                Action::InvokeTool {
                    name,
                    arguments,
                    thought,
                } => {
                    if let Some(thought) = thought {
                        debug!(thread_id, %thought, "Policy rationale");
                        state.push(Message::thought(thought));
                    }
                    (name, arguments)
                }
            };

            self.transition(&mut state, AgentStatus::Acting).await;
            if !self.tools.contains(&name) {
                return Err(self.fail(&mut state, AgentError::UnknownTool { name }).await);
            }

            state.iteration += 1;
            let call_id = format!("call_{turn_number}_{}", state.iteration);
            state.push(Message::tool_call(&call_id, &name, arguments.clone()));
            self.callback.on_tool_start(&name, &arguments).await;

            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => Err(ToolError::Cancelled { name: name.clone() }),
                result = self.tools.execute_within(&name, arguments, Some(deadline)) => result,
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            self.transition(&mut state, AgentStatus::Observing).await;
            match result {
                Ok(output) => {
                    self.callback.on_tool_result(&name, &output, duration_ms).await;
                    if output.partial {
                        flags.partial_sources = true;
                    }
                    for citation in &output.citations {
                        if !citations.iter().any(|c| c.chunk_id == citation.chunk_id) {
                            citations.push(citation.clone());
                        }
                    }
                    debug!(
                        thread_id,
                        tool = %name,
                        duration_ms,
                        citations = output.citations.len(),
                        "Tool succeeded"
                    );
                    state.push(Message::observation(&call_id, &name, output.content, false));
                    consecutive_failures = (String::new(), 0);
                }
                Err(e) => {
                    warn!(thread_id, tool = %name, duration_ms, error = %e, "Tool failed");
                    self.callback.on_tool_error(&name, &e).await;
                    if consecutive_failures.0 == name {
                        consecutive_failures.1 += 1;
                    } else {
                        consecutive_failures = (name.clone(), 1);
                    }
                    let mut text = format!("Tool error: {e}");
                    if consecutive_failures.1 >= self.config.max_consecutive_tool_failures {
                        text.push_str(&format!(
                            "\n\n[{name} has failed {} times in a row. Try a different tool or answer with what is known.]",
                            consecutive_failures.1
                        ));
                    }
                    state.push(Message::observation(&call_id, &name, text, true));
                }
            }

            self.transition(&mut state, AgentStatus::Thinking).await;
        };

        self.transition(&mut state, AgentStatus::Responding).await;
        state.push(Message::answer(&text, flags));

        let turn = Turn::new(turn_number, state.messages[start..].to_vec(), flags);
        if let Err(source) = self.memory.append(thread_id, turn).await {
            let err = AgentError::Memory {
                thread_id: thread_id.to_string(),
                source,
            };
            return Err(self.fail(&mut state, err).await);
        }
        state.turns = turn_number;
        self.transition(&mut state, AgentStatus::Done).await;

        info!(
            thread_id,
            turn = turn_number,
            iterations = state.iteration,
            citations = citations.len(),
            flags = %flags,
            "Turn completed"
        );

        Ok(AgentResponse {
            thread_id: thread_id.to_string(),
            text,
            citations,
            flags,
            iterations: state.iteration,
            turn: turn_number,
        })
    }

    async fn transition(&self, state: &mut AgentState, status: AgentStatus) {
        debug!(thread_id = %state.thread_id, from = %state.status, to = %status, "Agent status");
        state.transition(status);
        self.callback.on_status_change(status).await;
    }

    async fn fail(&self, state: &mut AgentState, error: AgentError) -> AgentError {
        warn!(thread_id = %state.thread_id, iteration = state.iteration, error = %error, "Turn failed");
        self.transition(state, AgentStatus::Failed).await;
        error
    }

    fn force_response(
        &self,
        state: &AgentState,
        start: usize,
        reason: Forced,
        flags: &mut ResponseFlags,
    ) -> String {
        match reason {
            Forced::Incomplete => {
                warn!(
                    thread_id = %state.thread_id,
                    max_iterations = self.config.max_iterations,
                    "Iteration budget exhausted, responding with gathered information"
                );
                flags.incomplete = true;
            }
            Forced::TimedOut => {
                warn!(
                    thread_id = %state.thread_id,
                    iteration = state.iteration,
                    "Request deadline expired, responding with gathered information"
                );
                flags.timed_out = true;
            }
        }
        best_effort_answer(state.observations_since(start))
    }
}

/// Compose an answer from the successful observations of the current turn.
pub fn best_effort_answer<'a>(observations: impl Iterator<Item = &'a Message>) -> String {
    let gathered: Vec<&str> = observations
        .filter_map(|m| match &m.content {
            Content::Observation {
                output,
                is_error: false,
                ..
            } if !output.trim().is_empty() => Some(output.as_str()),
            _ => None,
        })
        .collect();

    if gathered.is_empty() {
        return "I was unable to gather enough information to answer this question.".to_string();
    }
    format!(
        "Based on the information gathered so far:\n\n{}",
        gathered.join("\n\n")
    )
}
