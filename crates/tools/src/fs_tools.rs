//! File tools: read, write, edit, ls.

use crate::workspace;
use async_trait::async_trait;
use everclaw_core::error::ToolError;
use everclaw_core::tool::{Tool, ToolOutcome};
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

fn arg_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

/// Read a file from the workspace.
pub struct ReadTool {
    root: PathBuf,
}

impl ReadTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read a file from the workspace. Returns the file contents as text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let path = workspace::resolve(&self.root, arg_str(&arguments, "path")?)?;
        debug!(path = %path.display(), "read");
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolOutcome::ok(crate::truncate_output(content))),
            Err(e) => Ok(ToolOutcome::error(format!(
                "Cannot read {}: {e}",
                path.display()
            ))),
        }
    }
}

/// Write (create or overwrite) a file in the workspace.
pub struct WriteTool {
    root: PathBuf,
}

impl WriteTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace, creating it (and parent directories) if needed. Overwrites existing content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "content": { "type": "string", "description": "Full file content to write" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let path = workspace::resolve(&self.root, arg_str(&arguments, "path")?)?;
        let content = arg_str(&arguments, "content")?;

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return Ok(ToolOutcome::error(format!("Cannot create parent dirs: {e}")));
            }
        }
        match fs::write(&path, content).await {
            Ok(()) => Ok(ToolOutcome::ok(format!(
                "Wrote {} bytes to {}",
                content.len(),
                arg_str(&arguments, "path")?
            ))),
            Err(e) => Ok(ToolOutcome::error(format!(
                "Cannot write {}: {e}",
                path.display()
            ))),
        }
    }
}

/// Exact string replacement in a workspace file.
pub struct EditTool {
    root: PathBuf,
}

impl EditTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace an exact string in a file with a new string. The old string must appear exactly once."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "old": { "type": "string", "description": "Exact text to replace" },
                "new": { "type": "string", "description": "Replacement text" }
            },
            "required": ["path", "old", "new"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let path = workspace::resolve(&self.root, arg_str(&arguments, "path")?)?;
        let old = arg_str(&arguments, "old")?;
        let new = arg_str(&arguments, "new")?;

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                return Ok(ToolOutcome::error(format!(
                    "Cannot read {}: {e}",
                    path.display()
                )))
            }
        };

        let occurrences = content.matches(old).count();
        if occurrences == 0 {
            return Ok(ToolOutcome::error("Old string not found in file"));
        }
        if occurrences > 1 {
            return Ok(ToolOutcome::error(format!(
                "Old string appears {occurrences} times; it must be unique"
            )));
        }

        let updated = content.replacen(old, new, 1);
        match fs::write(&path, updated).await {
            Ok(()) => Ok(ToolOutcome::ok("Edit applied")),
            Err(e) => Ok(ToolOutcome::error(format!(
                "Cannot write {}: {e}",
                path.display()
            ))),
        }
    }
}

/// List a workspace directory.
pub struct LsTool {
    root: PathBuf,
}

impl LsTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "List the entries of a workspace directory. Directories are suffixed with '/'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path relative to the workspace root; defaults to the root" }
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let relative = arguments["path"].as_str().unwrap_or(".");
        let path = workspace::resolve(&self.root, relative)?;

        let mut reader = match fs::read_dir(&path).await {
            Ok(r) => r,
            Err(e) => {
                return Ok(ToolOutcome::error(format!(
                    "Cannot list {}: {e}",
                    path.display()
                )))
            }
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = reader.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();

        if entries.is_empty() {
            Ok(ToolOutcome::ok("(empty directory)"))
        } else {
            Ok(ToolOutcome::ok(crate::truncate_output(entries.join("\n"))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn read_returns_contents() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "hello file").unwrap();

        let tool = ReadTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"path": "a.md"}))
            .await
            .unwrap();
        assert!(!outcome.is_error);
        assert_eq!(outcome.text, "hello file");
    }

    #[tokio::test]
    async fn read_missing_file_is_error_outcome() {
        let tmp = TempDir::new().unwrap();
        let tool = ReadTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"path": "absent.md"}))
            .await
            .unwrap();
        assert!(outcome.is_error);
    }

    #[tokio::test]
    async fn read_rejects_escape() {
        let tmp = TempDir::new().unwrap();
        let tool = ReadTool::new(tmp.path());
        let result = tool
            .execute(serde_json::json!({"path": "../outside.md"}))
            .await;
        assert!(matches!(result, Err(ToolError::PathEscape(_))));
    }

    #[tokio::test]
    async fn write_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let tool = WriteTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"path": "deep/nested/file.md", "content": "data"}))
            .await
            .unwrap();
        assert!(!outcome.is_error);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("deep/nested/file.md")).unwrap(),
            "data"
        );
    }

    #[tokio::test]
    async fn edit_replaces_unique_match() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "one two three").unwrap();

        let tool = EditTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"path": "a.txt", "old": "two", "new": "2"}))
            .await
            .unwrap();
        assert!(!outcome.is_error);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(),
            "one 2 three"
        );
    }

    #[tokio::test]
    async fn edit_rejects_ambiguous_match() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "dup dup").unwrap();

        let tool = EditTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"path": "a.txt", "old": "dup", "new": "x"}))
            .await
            .unwrap();
        assert!(outcome.is_error);
        assert!(outcome.text.contains("2 times"));
    }

    #[tokio::test]
    async fn edit_rejects_missing_needle() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "content").unwrap();

        let tool = EditTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"path": "a.txt", "old": "absent", "new": "x"}))
            .await
            .unwrap();
        assert!(outcome.is_error);
    }

    #[tokio::test]
    async fn ls_sorts_and_marks_directories() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("b.txt"), "").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "").unwrap();

        let tool = LsTool::new(tmp.path());
        let outcome = tool.execute(serde_json::json!({})).await.unwrap();
        assert_eq!(outcome.text, "a.txt\nb.txt\nsub/");
    }
}
