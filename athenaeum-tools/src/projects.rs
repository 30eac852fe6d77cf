//! Research project listing.

use async_trait::async_trait;
use athenaeum_core::error::ToolError;
use athenaeum_core::registry::Tool;
use athenaeum_core::retrieval::CollaboratorError;
use athenaeum_core::types::ToolOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Summary of one research project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// Source of the available research projects.
#[async_trait]
pub trait ProjectCatalog: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, CollaboratorError>;
}

/// One subdirectory per project, optionally holding a `project.json`.
#[derive(Debug, Clone)]
pub struct DirProjectCatalog {
    root: PathBuf,
}

impl DirProjectCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ProjectCatalog for DirProjectCatalog {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, CollaboratorError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CollaboratorError::new(format!(
                    "Failed to read {}: {e}",
                    self.root.display()
                )));
            }
        };

        let mut projects = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CollaboratorError::new(e.to_string()))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();

            let manifest = path.join("project.json");
            match tokio::fs::read_to_string(&manifest).await {
                Ok(raw) => match serde_json::from_str::<ProjectSummary>(&raw) {
                    Ok(summary) => projects.push(summary),
                    Err(e) => {
                        warn!(project = %dir_name, error = %e, "Skipping unreadable project manifest");
                    }
                },
                Err(_) => {
                    let modified_at = entry
                        .metadata()
                        .await
                        .ok()
                        .and_then(|m| m.modified().ok())
                        .map(DateTime::<Utc>::from);
                    projects.push(ProjectSummary {
                        name: dir_name,
                        description: None,
                        modified_at,
                    });
                }
            }
        }
        Ok(projects)
    }
}

/// Most recently modified first; undated projects last, then by name.
pub fn sort_projects(projects: &mut [ProjectSummary]) {
    projects.sort_by(|a, b| {
        b.modified_at
            .cmp(&a.modified_at)
            .then_with(|| a.name.cmp(&b.name))
    });
}

pub fn format_projects(projects: &[ProjectSummary]) -> String {
    if projects.is_empty() {
        return "No projects found.".to_string();
    }
    let mut out = String::from("Available projects:\n");
    for project in projects {
        let modified = project
            .modified_at
            .map_or_else(|| "Unknown".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string());
        out.push_str(&format!(
            "\n• {}\n  {}\n  Last modified: {}\n",
            project.name,
            project.description.as_deref().unwrap_or("No description"),
            modified
        ));
    }
    out.trim_end().to_string()
}

/// Lists the research projects known to the catalog.
pub struct ListProjectsTool {
    catalog: Arc<dyn ProjectCatalog>,
    timeout: Duration,
}

impl ListProjectsTool {
    pub fn new(catalog: Arc<dyn ProjectCatalog>) -> Self {
        Self {
            catalog,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for ListProjectsTool {
    fn name(&self) -> &str {
        "list_projects"
    }

    fn description(&self) -> &str {
        "List all available research projects with their descriptions, \
         most recently modified first. Takes no input."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, _args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let mut projects =
            self.catalog
                .list_projects()
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    name: "list_projects".into(),
                    message: format!("Failed to list projects: {e}"),
                })?;
        sort_projects(&mut projects);
        Ok(ToolOutput::text(format_projects(&projects))
            .with_metadata("count", serde_json::json!(projects.len())))
    }
}
