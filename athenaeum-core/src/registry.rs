//! Tool Registry: static table of callable capabilities.
//!
//! Tools are registered through a [`ToolRegistryBuilder`] at startup and the
//! result is frozen: a [`ToolRegistry`] has no mutating methods, so it can be
//! shared behind an `Arc` and read concurrently without locking. Execution
//! applies the tool's own timeout, capped by the caller's deadline.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ToolError;
use crate::types::{Deadline, ToolDefinition, ToolOutput};

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// What this tool does. Planning policies select tools by matching
    /// against this text.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError>;

    /// Execute knowing the instant the registry will cut the call off.
    ///
    /// Tools that split their own budget (sub-searches with their own
    /// timeouts) override this to finish before `deadline`. The default
    /// ignores it.
    async fn execute_within(
        &self,
        args: serde_json::Value,
        _deadline: Deadline,
    ) -> Result<ToolOutput, ToolError> {
        self.execute(args).await
    }

    /// Maximum execution time before timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Collects tools before the registry is frozen.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Returns error if a tool with the same name is already registered.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<&mut Self, ToolError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered { name });
        }
        debug!(tool = %name, "Registering tool");
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(self)
    }

    /// Chainable form of [`register`](Self::register).
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Result<Self, ToolError> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        info!(tools = self.tools.len(), "Tool registry frozen");
        ToolRegistry {
            tools: self.tools,
            index: self.index,
        }
    }
}

/// The frozen tool table.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// A registry with no tools.
    pub fn empty() -> Self {
        ToolRegistryBuilder::new().build()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tool definitions in registration order.
    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    /// Tool names in registration order.
    pub fn list_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name with the given arguments, applying its timeout.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        self.execute_within(name, args, None).await
    }

    /// Execute a tool with a sub-deadline of `min(tool.timeout(), deadline)`.
    ///
    /// The tool is told that sub-deadline through
    /// [`Tool::execute_within`].
    pub async fn execute_within(
        &self,
        name: &str,
        args: serde_json::Value,
        deadline: Option<Deadline>,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;

        let mut timeout = tool.timeout();
        if let Some(deadline) = deadline {
            timeout = timeout.min(deadline.remaining());
        }
        info!(tool = %name, timeout_ms = timeout.as_millis() as u64, "Executing tool");

        let cutoff = Deadline::after(timeout);
        match tokio::time::timeout_at(cutoff.instant(), tool.execute_within(args, cutoff)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                name: name.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
