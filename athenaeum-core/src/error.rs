//! Error types for the Athenaeum core library.
//!
//! Uses `thiserror` for public API error types with structured variants for
//! the retrieval, tool, memory, configuration, planning, cross-examination,
//! and orchestration domains.
//!
//! Degraded-but-useful outcomes (a failed retriever, a dropped rerank pair, a
//! timed-out branch, an exhausted iteration budget) are not errors: they are
//! absorbed into partial results and response flags. Only structural failures
//! reach the caller as `Err`.

use std::path::PathBuf;

use crate::retrieval::RetrieverKind;

/// Top-level error type for the Athenaeum core library.
#[derive(Debug, thiserror::Error)]
pub enum AthenaeumError {
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Planning error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Cross-examination error: {0}")]
    CrossExam(#[from] CrossExamError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single retriever's backing collaborator.
///
/// The caller decides whether to degrade to the surviving retriever(s).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{retriever} retriever failed: {cause}")]
pub struct RetrievalError {
    pub retriever: RetrieverKind,
    pub cause: String,
}

impl RetrievalError {
    pub fn new(retriever: RetrieverKind, cause: impl Into<String>) -> Self {
        Self {
            retriever,
            cause: cause.into(),
        }
    }
}

/// Errors from tool registration and invocation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    NotFound { name: String },

    #[error("Tool already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Tool '{name}' execution failed: {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Tool '{name}' timed out after {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },

    #[error("Tool '{name}' was cancelled")]
    Cancelled { name: String },
}

/// Errors from the conversation memory store.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Checkpoint for thread '{thread_id}' is unreadable: {message}")]
    Corruption { thread_id: String, message: String },

    #[error("Memory persistence error: {message}")]
    Persistence { message: String },

    #[error("Turn {got} for thread '{thread_id}' is out of order, expected turn {expected}")]
    NonContiguousTurn {
        thread_id: String,
        expected: u64,
        got: u64,
    },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors raised by a planning policy while choosing the next action.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PolicyError {
    #[error("Planning policy failed: {message}")]
    Failed { message: String },

    #[error("Planning policy has no further actions")]
    Exhausted,
}

/// Errors from the cross-examination workflow.
#[derive(Debug, thiserror::Error)]
pub enum CrossExamError {
    #[error("Failed to load draft '{draft}': {message}")]
    DraftLoad { draft: String, message: String },

    #[error("Failed to build temporary draft index: {message}")]
    Index { message: String },
}

/// Errors that abort an orchestrator turn.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Planning policy selected unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("Planning policy failed: {0}")]
    Policy(#[source] PolicyError),

    #[error("Memory failure for thread '{thread_id}': {source}")]
    Memory {
        thread_id: String,
        #[source]
        source: MemoryError,
    },

    #[error("Turn was cancelled")]
    Cancelled,
}

/// A type alias for results using the top-level `AthenaeumError`.
pub type Result<T> = std::result::Result<T, AthenaeumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_retrieval() {
        let err = AthenaeumError::Retrieval(RetrievalError::new(
            RetrieverKind::Dense,
            "embedding service unavailable",
        ));
        assert_eq!(
            err.to_string(),
            "Retrieval error: dense retriever failed: embedding service unavailable"
        );
    }

    #[test]
    fn test_error_display_tool() {
        let err = AthenaeumError::Tool(ToolError::NotFound {
            name: "nonexistent".into(),
        });
        assert_eq!(err.to_string(), "Tool error: Tool not found: nonexistent");
    }

    #[test]
    fn test_error_display_memory_corruption() {
        let err = MemoryError::Corruption {
            thread_id: "T1".into(),
            message: "expected value at line 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Checkpoint for thread 'T1' is unreadable: expected value at line 1"
        );
    }

    #[test]
    fn test_error_display_agent() {
        let err = AthenaeumError::Agent(AgentError::UnknownTool {
            name: "summon_demon".into(),
        });
        assert_eq!(
            err.to_string(),
            "Agent error: Planning policy selected unknown tool 'summon_demon'"
        );
    }

    #[test]
    fn test_error_display_draft_load() {
        let err = CrossExamError::DraftLoad {
            draft: "drafts/chapter1.md".into(),
            message: "No such file or directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to load draft 'drafts/chapter1.md': No such file or directory"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AthenaeumError = io_err.into();
        assert!(matches!(err, AthenaeumError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: AthenaeumError = serde_err.into();
        assert!(matches!(err, AthenaeumError::Serialization(_)));
    }

    #[test]
    fn test_tool_error_variants() {
        let err = ToolError::InvalidArguments {
            name: "read_file".into(),
            reason: "path is required".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid arguments for tool 'read_file': path is required"
        );

        let err = ToolError::Timeout {
            name: "web_search".into(),
            timeout_ms: 1500,
        };
        assert_eq!(err.to_string(), "Tool 'web_search' timed out after 1500ms");
    }
}
