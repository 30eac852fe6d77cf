//! Configuration system for Athenaeum.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from the platform config dir (`~/.config/athenaeum/config.toml` on
//! Linux) and/or `.athenaeum/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AthenaeumConfig {
    pub retrieval: RetrievalConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
    pub cross_exam: CrossExamConfig,
    pub memory: MemoryConfig,
}

/// Retrieval budgets and fusion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates requested from the dense retriever.
    pub dense_top_k: usize,
    /// Candidates requested from the sparse retriever.
    pub sparse_top_k: usize,
    /// Length of the fused list handed to the reranker.
    pub fusion_top_k: usize,
    /// RRF smoothing constant.
    pub rrf_k: f64,
    /// Passages kept after reranking.
    pub rerank_top_n: usize,
    /// Per-retriever sub-deadline.
    pub retriever_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_top_k: 5,
            sparse_top_k: 5,
            fusion_top_k: 10,
            rrf_k: crate::retrieval::DEFAULT_RRF_K,
            rerank_top_n: 3,
            retriever_timeout_secs: 10,
        }
    }
}

/// Orchestrator limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum tool invocations per turn before the answer is forced.
    pub max_iterations: usize,
    /// Overall deadline for one turn.
    pub request_timeout_secs: u64,
    /// Failures of the same tool in a row before the observation carries a
    /// hint to stop retrying.
    pub max_consecutive_tool_failures: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            request_timeout_secs: 120,
            max_consecutive_tool_failures: 3,
        }
    }
}

impl AgentConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Tool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Sub-deadline for tools that do not declare their own.
    pub default_timeout_secs: u64,
    /// `read_file` truncates beyond this many characters.
    pub max_file_chars: usize,
    pub web_search_enabled: bool,
    pub web_max_results: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            max_file_chars: 50_000,
            web_search_enabled: true,
            web_max_results: 5,
        }
    }
}

/// Cross-examination workflow settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossExamConfig {
    /// Sub-deadline for each retrieval branch.
    pub branch_timeout_secs: u64,
    /// Draft chunk size in characters.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Themes extracted per branch.
    pub max_themes: usize,
    /// Passages kept per branch after reranking.
    pub top_k: usize,
}

impl Default for CrossExamConfig {
    fn default() -> Self {
        Self {
            branch_timeout_secs: 30,
            chunk_size: 800,
            chunk_overlap: 80,
            max_themes: 8,
            top_k: 10,
        }
    }
}

impl CrossExamConfig {
    pub fn branch_timeout(&self) -> Duration {
        Duration::from_secs(self.branch_timeout_secs)
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Whether thread checkpoints are written to disk.
    pub enable_persistence: bool,
    /// Directory for checkpoint files; defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_dir: Option<PathBuf>,
}

impl MemoryConfig {
    /// Resolved checkpoint directory, if persistence is enabled.
    pub fn resolved_persist_dir(&self) -> Option<PathBuf> {
        if !self.enable_persistence {
            return None;
        }
        self.persist_dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().join("threads")))
    }
}

impl AthenaeumConfig {
    /// Check value ranges and return human-readable problems.
    ///
    /// Returns an empty Vec if the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let r = &self.retrieval;

        if r.dense_top_k == 0 {
            problems.push("retrieval.dense_top_k must be at least 1".to_string());
        }
        if r.sparse_top_k == 0 {
            problems.push("retrieval.sparse_top_k must be at least 1".to_string());
        }
        if r.fusion_top_k == 0 {
            problems.push("retrieval.fusion_top_k must be at least 1".to_string());
        }
        if r.rerank_top_n == 0 {
            problems.push("retrieval.rerank_top_n must be at least 1".to_string());
        }
        if !(r.rrf_k > 0.0 && r.rrf_k.is_finite()) {
            problems.push(format!("retrieval.rrf_k must be positive, got {}", r.rrf_k));
        }
        if r.rerank_top_n > r.fusion_top_k {
            problems.push(format!(
                "retrieval.rerank_top_n ({}) exceeds retrieval.fusion_top_k ({})",
                r.rerank_top_n, r.fusion_top_k
            ));
        }
        check_timeout(&mut problems, "retrieval.retriever_timeout_secs", r.retriever_timeout_secs);

        if self.agent.max_iterations == 0 {
            problems.push("agent.max_iterations must be at least 1".to_string());
        }
        check_timeout(&mut problems, "agent.request_timeout_secs", self.agent.request_timeout_secs);
        check_timeout(&mut problems, "tools.default_timeout_secs", self.tools.default_timeout_secs);
        check_timeout(
            &mut problems,
            "cross_exam.branch_timeout_secs",
            self.cross_exam.branch_timeout_secs,
        );
        if self.cross_exam.top_k == 0 {
            problems.push("cross_exam.top_k must be at least 1".to_string());
        }
        if self.cross_exam.chunk_size == 0 {
            problems.push("cross_exam.chunk_size must be at least 1".to_string());
        } else if self.cross_exam.chunk_overlap >= self.cross_exam.chunk_size {
            problems.push(format!(
                "cross_exam.chunk_overlap ({}) must be smaller than cross_exam.chunk_size ({})",
                self.cross_exam.chunk_overlap, self.cross_exam.chunk_size
            ));
        }

        problems
    }

    /// [`validate`](Self::validate) as a `Result`.
    pub fn ensure_valid(&self) -> Result<(), ConfigError> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                message: problems.join("; "),
            })
        }
    }
}

/// Longest timeout any setting may ask for (one day).
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

fn check_timeout(problems: &mut Vec<String>, key: &str, secs: u64) {
    if secs == 0 {
        problems.push(format!("{key} must be non-zero"));
    } else if secs > MAX_TIMEOUT_SECS {
        problems.push(format!("{key} ({secs}) exceeds the maximum of {MAX_TIMEOUT_SECS}"));
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "athenaeum", "athenaeum")
}

/// Load configuration from all sources, merging them in priority order.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `ATHENAEUM_`)
/// 3. Workspace-local config (`.athenaeum/config.toml`)
/// 4. User config (`<config dir>/athenaeum/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&AthenaeumConfig>,
) -> Result<AthenaeumConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AthenaeumConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".athenaeum").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // ATHENAEUM_RETRIEVAL__RRF_K, ATHENAEUM_AGENT__MAX_ITERATIONS, ...
    figment = figment.merge(Env::prefixed("ATHENAEUM_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load a single TOML file on top of the defaults, without consulting the
/// environment or user config.
pub fn load_config_file(path: &Path) -> Result<AthenaeumConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Figment::from(Serialized::defaults(AthenaeumConfig::default()))
        .merge(Toml::file(path))
        .extract()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = AthenaeumConfig::default();
        assert_eq!(config.retrieval.dense_top_k, 5);
        assert_eq!(config.retrieval.fusion_top_k, 10);
        assert_eq!(config.retrieval.rrf_k, 60.0);
        assert_eq!(config.retrieval.rerank_top_n, 3);
        assert_eq!(config.agent.max_iterations, 8);
        assert_eq!(config.tools.max_file_chars, 50_000);
        assert!(!config.memory.enable_persistence);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AthenaeumConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let back: AthenaeumConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AthenaeumConfig = toml::from_str("[retrieval]\nrrf_k = 30.0\n").unwrap();
        assert_eq!(config.retrieval.rrf_k, 30.0);
        assert_eq!(config.retrieval.dense_top_k, 5);
        assert_eq!(config.agent.max_iterations, 8);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = AthenaeumConfig::default();
        overrides.agent.max_iterations = 3;
        overrides.retrieval.rrf_k = 10.0;

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.agent.max_iterations, 3);
        assert_eq!(config.retrieval.rrf_k, 10.0);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ws_dir = dir.path().join(".athenaeum");
        std::fs::create_dir_all(&ws_dir).unwrap();
        std::fs::write(
            ws_dir.join("config.toml"),
            r#"
[retrieval]
fusion_top_k = 20
rerank_top_n = 5

[cross_exam]
branch_timeout_secs = 5
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.retrieval.fusion_top_k, 20);
        assert_eq!(config.retrieval.rerank_top_n, 5);
        assert_eq!(config.cross_exam.branch_timeout_secs, 5);
        assert_eq!(config.cross_exam.chunk_size, 800);
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_dir(".athenaeum")?;
            jail.create_file(".athenaeum/config.toml", "[agent]\nmax_iterations = 4\n")?;
            jail.set_env("ATHENAEUM_AGENT__MAX_ITERATIONS", "6");
            jail.set_env("ATHENAEUM_RETRIEVAL__RRF_K", "42.5");

            let config = load_config(Some(jail.directory()), None).map_err(|e| *e)?;
            assert_eq!(config.agent.max_iterations, 6);
            assert_eq!(config.retrieval.rrf_k, 42.5);
            Ok(())
        });
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut config = AthenaeumConfig::default();
        config.retrieval.rrf_k = 0.0;
        config.retrieval.rerank_top_n = 20;
        config.retrieval.dense_top_k = 0;
        config.cross_exam.chunk_overlap = 900;

        let problems = config.validate();
        assert_eq!(problems.len(), 4);
        assert!(problems.iter().any(|p| p.contains("rrf_k")));
        assert!(problems.iter().any(|p| p.contains("exceeds")));
        assert!(matches!(
            config.ensure_valid(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unbounded_timeouts() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ATHENAEUM_AGENT__REQUEST_TIMEOUT_SECS", "18446744073709551615");
            let config = load_config(Some(jail.directory()), None).map_err(|e| *e)?;
            assert_eq!(config.agent.request_timeout_secs, u64::MAX);

            let problems = config.validate();
            assert_eq!(problems.len(), 1);
            assert!(problems[0].starts_with("agent.request_timeout_secs"));
            Ok(())
        });

        let mut config = AthenaeumConfig::default();
        config.cross_exam.branch_timeout_secs = MAX_TIMEOUT_SECS + 1;
        config.tools.default_timeout_secs = 0;
        assert_eq!(config.validate().len(), 2);

        config.cross_exam.branch_timeout_secs = MAX_TIMEOUT_SECS;
        config.tools.default_timeout_secs = 1;
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_load_config_file_missing() {
        let err = load_config_file(Path::new("/nonexistent/athenaeum.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_config_file_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[retrieval]\nrrf_k = \"sixty\"\n").unwrap();
        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_persist_dir_only_when_enabled() {
        let mut memory = MemoryConfig {
            enable_persistence: false,
            persist_dir: Some(PathBuf::from("/tmp/threads")),
        };
        assert!(memory.resolved_persist_dir().is_none());
        memory.enable_persistence = true;
        assert_eq!(
            memory.resolved_persist_dir(),
            Some(PathBuf::from("/tmp/threads"))
        );
    }
}
