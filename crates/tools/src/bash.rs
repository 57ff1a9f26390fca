//! Bash tool — run shell commands inside the workspace.
//!
//! Commands execute with the workspace as working directory and a 30s
//! timeout. Non-zero exits are reported as error outcomes with the exit
//! code and captured output so the model can react.

use async_trait::async_trait;
use everclaw_core::error::ToolError;
use everclaw_core::tool::{Tool, ToolOutcome};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const SHELL_TIMEOUT_SECS: u64 = 30;

pub struct BashTool {
    workdir: PathBuf,
}

impl BashTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace and return stdout/stderr. Times out after 30 seconds."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to execute" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        debug!(command = %command, "bash");

        let child = Command::new("sh")
            .args(["-c", command])
            .current_dir(&self.workdir)
            .output();

        let output = match tokio::time::timeout(Duration::from_secs(SHELL_TIMEOUT_SECS), child)
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "bash".into(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(command = %command, "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: "bash".into(),
                    timeout_secs: SHELL_TIMEOUT_SECS,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            let text = if stderr.is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            };
            Ok(ToolOutcome::ok(crate::truncate_output(
                text.trim().to_string(),
            )))
        } else {
            let code = output.status.code().unwrap_or(-1);
            Ok(ToolOutcome::error(crate::truncate_output(format!(
                "[exit code: {code}]\n{stdout}\n{stderr}"
            ))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn runs_in_workspace_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "here").unwrap();

        let tool = BashTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"command": "cat marker.txt"}))
            .await
            .unwrap();
        assert!(!outcome.is_error);
        assert_eq!(outcome.text, "here");
    }

    #[tokio::test]
    async fn nonzero_exit_is_error_outcome() {
        let tmp = TempDir::new().unwrap();
        let tool = BashTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"command": "exit 3"}))
            .await
            .unwrap();
        assert!(outcome.is_error);
        assert!(outcome.text.contains("exit code: 3"));
    }

    #[tokio::test]
    async fn stderr_is_captured() {
        let tmp = TempDir::new().unwrap();
        let tool = BashTool::new(tmp.path());
        let outcome = tool
            .execute(serde_json::json!({"command": "echo oops >&2"}))
            .await
            .unwrap();
        assert!(!outcome.is_error);
        assert!(outcome.text.contains("oops"));
    }
}
