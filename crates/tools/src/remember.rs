//! Remember tool — append a note to today's daily log.

use async_trait::async_trait;
use everclaw_core::error::ToolError;
use everclaw_core::tool::{Tool, ToolOutcome};
use everclaw_memory::MemoryStore;

pub struct RememberTool {
    memory: MemoryStore,
}

impl RememberTool {
    pub fn new(memory: MemoryStore) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Save a note to today's daily memory log. Use for facts, decisions, and context worth keeping across conversations."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "note": { "type": "string", "description": "The note to remember" }
            },
            "required": ["note"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let note = arguments["note"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'note' argument".into()))?;

        match self.memory.append_daily(note).await {
            Ok(()) => Ok(ToolOutcome::ok("Noted.")),
            Err(e) => Ok(ToolOutcome::error(format!("Could not save note: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn note_lands_in_todays_log() {
        let tmp = TempDir::new().unwrap();
        let memory = MemoryStore::new(tmp.path());
        let tool = RememberTool::new(memory.clone());

        let outcome = tool
            .execute(serde_json::json!({"note": "the deploy key rotates on Fridays"}))
            .await
            .unwrap();
        assert!(!outcome.is_error);

        let today = chrono::Utc::now().date_naive();
        let log = memory.read_daily_log(today).await.unwrap();
        assert!(log.contains("deploy key"));
        assert!(log.contains("### "));
    }
}
