//! Search tools: grep (content substring) and find (filename substring).
//!
//! Both walk the workspace recursively, skipping hidden entries, and cap
//! their result counts so a broad pattern cannot flood the conversation.

use crate::workspace;
use async_trait::async_trait;
use everclaw_core::error::ToolError;
use everclaw_core::tool::{Tool, ToolOutcome};
use std::path::{Path, PathBuf};

const MAX_MATCHES: usize = 200;

fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(reader) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in reader.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

/// Substring search over file contents.
pub struct GrepTool {
    root: PathBuf,
}

impl GrepTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search workspace files for lines containing a pattern. Returns 'path:line: text' matches."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Substring to search for" },
                "path": { "type": "string", "description": "Directory to search, relative to the workspace root; defaults to the root" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let pattern = arguments["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'pattern' argument".into()))?
            .to_string();
        let relative = arguments["path"].as_str().unwrap_or(".");
        let search_root = workspace::resolve(&self.root, relative)?;
        let workspace_root = self.root.clone();

        // Directory walking is blocking I/O
        let result = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            'outer: for file in walk_files(&search_root) {
                let Ok(content) = std::fs::read_to_string(&file) else {
                    continue; // binary or unreadable
                };
                for (number, line) in content.lines().enumerate() {
                    if line.contains(&pattern) {
                        let display = file
                            .strip_prefix(&workspace_root)
                            .unwrap_or(&file)
                            .display();
                        matches.push(format!("{}:{}: {}", display, number + 1, line.trim_end()));
                        if matches.len() >= MAX_MATCHES {
                            break 'outer;
                        }
                    }
                }
            }
            matches
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: "grep".into(),
            reason: e.to_string(),
        })?;

        if result.is_empty() {
            Ok(ToolOutcome::ok("No matches"))
        } else {
            Ok(ToolOutcome::ok(crate::truncate_output(result.join("\n"))))
        }
    }
}

/// Filename search.
pub struct FindTool {
    root: PathBuf,
}

impl FindTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for FindTool {
    fn name(&self) -> &str {
        "find"
    }

    fn description(&self) -> &str {
        "Find workspace files whose name contains a pattern. Returns matching paths."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Substring of the file name" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let pattern = arguments["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'pattern' argument".into()))?
            .to_string();
        let root = self.root.clone();

        let result = tokio::task::spawn_blocking(move || {
            walk_files(&root)
                .into_iter()
                .filter(|path| {
                    path.file_name()
                        .map(|n| n.to_string_lossy().contains(&pattern))
                        .unwrap_or(false)
                })
                .take(MAX_MATCHES)
                .map(|path| {
                    path.strip_prefix(&root)
                        .unwrap_or(&path)
                        .display()
                        .to_string()
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: "find".into(),
            reason: e.to_string(),
        })?;

        if result.is_empty() {
            Ok(ToolOutcome::ok("No matches"))
        } else {
            Ok(ToolOutcome::ok(crate::truncate_output(result.join("\n"))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("notes")).unwrap();
        std::fs::write(tmp.path().join("notes/todo.md"), "buy milk\nfix the bug\n").unwrap();
        std::fs::write(tmp.path().join("readme.md"), "the bug tracker\n").unwrap();
        std::fs::write(tmp.path().join(".hidden"), "the bug is here too\n").unwrap();
        tmp
    }

    #[tokio::test]
    async fn grep_finds_lines_with_location() {
        let tmp = setup();
        let tool = GrepTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"pattern": "bug"}))
            .await
            .unwrap();
        assert!(outcome.text.contains("notes/todo.md:2: fix the bug"));
        assert!(outcome.text.contains("readme.md:1: the bug tracker"));
    }

    #[tokio::test]
    async fn grep_skips_hidden_files() {
        let tmp = setup();
        let tool = GrepTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"pattern": "bug"}))
            .await
            .unwrap();
        assert!(!outcome.text.contains(".hidden"));
    }

    #[tokio::test]
    async fn grep_no_matches() {
        let tmp = setup();
        let tool = GrepTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"pattern": "unobtainium"}))
            .await
            .unwrap();
        assert_eq!(outcome.text, "No matches");
    }

    #[tokio::test]
    async fn find_matches_file_names() {
        let tmp = setup();
        let tool = FindTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"pattern": "todo"}))
            .await
            .unwrap();
        assert_eq!(outcome.text, "notes/todo.md");
    }
}
