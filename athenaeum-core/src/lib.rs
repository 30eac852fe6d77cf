//! # Athenaeum Core
//!
//! Core library for the Athenaeum research assistant.
//! Provides the hybrid retrieval engine (dense and sparse retrieval, rank
//! fusion, reranking), the tool registry, the agent orchestrator, the
//! conversation memory store, the cross-examination workflow, configuration,
//! and the fundamental types.

pub mod agent;
pub mod config;
pub mod crossexam;
pub mod error;
pub mod index;
pub mod memory;
pub mod persistence;
pub mod policy;
pub mod registry;
pub mod retrieval;
pub mod types;

// Re-export commonly used types at the crate root.
pub use agent::{Agent, AgentCallback, NoOpCallback, RecordingCallback};
pub use config::{
    AgentConfig, AthenaeumConfig, CrossExamConfig, MemoryConfig, RetrievalConfig, ToolsConfig,
    load_config,
};
pub use crossexam::{
    Corpus, CrossExamResult, CrossExamination, DraftLoader, FsDraftLoader, QueryRewriter,
};
pub use error::{
    AgentError, AthenaeumError, ConfigError, CrossExamError, MemoryError, PolicyError, Result,
    RetrievalError, ToolError,
};
pub use memory::{FileMemoryStore, InMemoryStore, MemoryStore, ThreadGuard, ThreadLocks, Turn};
pub use policy::{Action, HeuristicPolicy, PlanningPolicy, ScriptedPolicy};
pub use registry::{Tool, ToolRegistry, ToolRegistryBuilder};
pub use retrieval::{
    Candidate, Chunk, ChunkMetadata, FusedResult, FusionEngine, HybridRetriever, MetadataFilter,
    Origin, Reranker, RetrievalPipeline, RetrieverKind,
};
pub use types::{
    AgentResponse, AgentState, AgentStatus, Citation, Content, Deadline, Message, ResponseFlags,
    Role, ToolDefinition, ToolOutput,
};
