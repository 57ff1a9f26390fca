//! Delegation tool declaration.
//!
//! `delegate_task` is declared like any other tool so the model sees it,
//! but the agent loop intercepts calls by name and routes them to the
//! sub-agent spawner. Executing it directly (a sub-agent trying to
//! delegate, or a loop bug) yields an error outcome.

use async_trait::async_trait;
use everclaw_core::error::ToolError;
use everclaw_core::tool::{Tool, ToolOutcome};

pub struct DelegateTaskTool;

#[async_trait]
impl Tool for DelegateTaskTool {
    fn name(&self) -> &str {
        crate::DELEGATE_TASK
    }

    fn description(&self) -> &str {
        "Delegate a self-contained task to a sub-agent that works in its own isolated context and reports back a summary. Use for large explorations that would flood this conversation."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "Complete description of the task, including everything the sub-agent needs to know" }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        Ok(ToolOutcome::error(
            "delegate_task is only available to the main agent",
        ))
    }
}
