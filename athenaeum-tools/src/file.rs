//! Local file reading.

use async_trait::async_trait;
use athenaeum_core::crossexam::expand_home;
use athenaeum_core::error::ToolError;
use athenaeum_core::registry::Tool;
use athenaeum_core::types::ToolOutput;
use std::time::Duration;
use tracing::debug;

const TRUNCATION_MARKER: &str = "\n\n[... truncated ...]";

/// Read a local text file, truncated to a character budget.
pub struct ReadFileTool {
    max_chars: usize,
    timeout: Duration,
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new(50_000)
    }
}

impl ReadFileTool {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Keep the first `max_chars` characters. Returns whether anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]), true),
        None => (text.to_string(), false),
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a local text file such as a draft chapter or notes. \
         Input is a file path; '~' expands to the home directory. \
         Long files are truncated."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file"
                }
            },
            "required": ["path"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path_str = args
            .get("path")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "read_file".into(),
                reason: "Missing required parameter: path".into(),
            })?;

        let path = expand_home(path_str);
        let failed = |message: String| ToolError::ExecutionFailed {
            name: "read_file".into(),
            message,
        };

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                failed(format!("File not found: {}", path.display()))
            } else {
                failed(format!("Failed to stat {}: {e}", path.display()))
            }
        })?;
        if !metadata.is_file() {
            return Err(failed(format!("Not a file: {}", path.display())));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| failed(format!("Failed to read {}: {e}", path.display())))?;
        let text = String::from_utf8_lossy(&bytes);
        let (content, truncated) = truncate_chars(&text, self.max_chars);
        debug!(path = %path.display(), bytes = bytes.len(), truncated, "Read file");

        Ok(ToolOutput::text(content)
            .with_metadata("path", serde_json::json!(path.display().to_string()))
            .with_metadata("truncated", serde_json::json!(truncated)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_file_returns_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Notes\n\nHabit and inquiry.").unwrap();

        let out = ReadFileTool::default()
            .execute(serde_json::json!({"path": path.to_str().unwrap()}))
            .await
            .unwrap();
        assert_eq!(out.content, "# Notes\n\nHabit and inquiry.");
        assert_eq!(out.metadata["truncated"], false);
    }

    #[tokio::test]
    async fn test_read_file_truncates_on_char_boundary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("long.txt");
        std::fs::write(&path, "é".repeat(40)).unwrap();

        let out = ReadFileTool::new(10)
            .execute(serde_json::json!({"path": path.to_str().unwrap()}))
            .await
            .unwrap();
        assert_eq!(out.content, format!("{}{TRUNCATION_MARKER}", "é".repeat(10)));
        assert_eq!(out.metadata["truncated"], true);
    }

    #[tokio::test]
    async fn test_read_file_invalid_utf8_is_lossy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.txt");
        std::fs::write(&path, [b'o', b'k', 0xff, b'!']).unwrap();

        let out = ReadFileTool::default()
            .execute(serde_json::json!({"path": path.to_str().unwrap()}))
            .await
            .unwrap();
        assert_eq!(out.content, "ok\u{FFFD}!");
    }

    #[tokio::test]
    async fn test_read_file_missing_and_directory() {
        let dir = TempDir::new().unwrap();
        let tool = ReadFileTool::default();

        let missing = dir.path().join("absent.md");
        let err = tool
            .execute(serde_json::json!({"path": missing.to_str().unwrap()}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("File not found"));

        let err = tool
            .execute(serde_json::json!({"path": dir.path().to_str().unwrap()}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Not a file"));

        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn test_truncate_chars_short_text_untouched() {
        assert_eq!(truncate_chars("abc", 3), ("abc".to_string(), false));
        assert_eq!(truncate_chars("", 0), (String::new(), false));
    }
}
