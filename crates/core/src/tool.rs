//! Tool trait and registry — the abstraction over agent capabilities.
//!
//! Tools are what let the agent act: read and edit files, run commands,
//! fetch URLs, append to memory. The registry validates arguments against
//! each tool's declared parameter schema before dispatching, and captures
//! every failure into an error outcome rather than propagating — tool
//! errors are observations for the model, not run failures.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the provider's tool-call id).
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// What a tool execution produced, folded back into the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "read", "bash").
    fn name(&self) -> &str;

    /// Description sent to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with validated arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolOutcome, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Two registries exist at runtime: the main-agent registry (including
/// `delegate_task`) and the sub-agent registry (excluding it, so a child
/// cannot spawn grandchildren).
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool definitions, sorted by name for deterministic prompts.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute one tool call: look up, validate arguments, dispatch.
    ///
    /// Never returns `Err` for tool-level problems — unknown tools, invalid
    /// arguments, and execution failures all become error outcomes so the
    /// model can observe and recover.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutcome {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolOutcome::error(format!("Unknown tool: {}", call.name));
        };

        if let Err(reason) = validate_arguments(&tool.parameters_schema(), &call.arguments) {
            return ToolOutcome::error(format!("Invalid arguments for {}: {reason}", call.name));
        }

        match tool.execute(call.arguments.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => ToolOutcome::error(format!("Error: {e}")),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate arguments against a parameter schema.
///
/// Covers the subset the built-in tool schemas use: an object with typed
/// properties and a `required` list. Unknown extra properties pass.
pub fn validate_arguments(
    schema: &serde_json::Value,
    arguments: &serde_json::Value,
) -> std::result::Result<(), String> {
    let Some(obj) = arguments.as_object() else {
        return Err("arguments must be an object".into());
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !obj.contains_key(key) {
                return Err(format!("missing required property '{key}'"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in obj {
            let Some(prop) = props.get(key) else { continue };
            let Some(expected) = prop.get("type").and_then(|t| t.as_str()) else {
                continue;
            };
            let matches = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                "object" => value.is_object(),
                "array" => value.is_array(),
                _ => true,
            };
            if !matches {
                return Err(format!("property '{key}' must be a {expected}"));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolOutcome, ToolError> {
            Ok(ToolOutcome::ok(
                arguments["text"].as_str().unwrap_or("").to_string(),
            ))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<ToolOutcome, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "fail".into(),
                reason: "deliberate".into(),
            })
        }
    }

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(Box::new(EchoTool));
        reg.register(Box::new(FailingTool));
        reg
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let reg = registry();
        let outcome = reg
            .execute(&ToolCall {
                id: "c1".into(),
                name: "echo".into(),
                arguments: serde_json::json!({"text": "hello"}),
            })
            .await;
        assert!(!outcome.is_error);
        assert_eq!(outcome.text, "hello");
    }

    #[tokio::test]
    async fn unknown_tool_is_error_outcome() {
        let reg = registry();
        let outcome = reg
            .execute(&ToolCall {
                id: "c1".into(),
                name: "nope".into(),
                arguments: serde_json::json!({}),
            })
            .await;
        assert!(outcome.is_error);
        assert!(outcome.text.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn missing_required_argument_is_error_outcome() {
        let reg = registry();
        let outcome = reg
            .execute(&ToolCall {
                id: "c1".into(),
                name: "echo".into(),
                arguments: serde_json::json!({}),
            })
            .await;
        assert!(outcome.is_error);
        assert!(outcome.text.contains("text"));
    }

    #[tokio::test]
    async fn wrong_argument_type_is_error_outcome() {
        let reg = registry();
        let outcome = reg
            .execute(&ToolCall {
                id: "c1".into(),
                name: "echo".into(),
                arguments: serde_json::json!({"text": 42}),
            })
            .await;
        assert!(outcome.is_error);
        assert!(outcome.text.contains("string"));
    }

    #[tokio::test]
    async fn tool_failure_captured_not_propagated() {
        let reg = registry();
        let outcome = reg
            .execute(&ToolCall {
                id: "c1".into(),
                name: "fail".into(),
                arguments: serde_json::json!({}),
            })
            .await;
        assert!(outcome.is_error);
        assert!(outcome.text.starts_with("Error:"));
    }

    #[test]
    fn definitions_sorted_by_name() {
        let reg = registry();
        let defs = reg.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[1].name, "fail");
    }
}
