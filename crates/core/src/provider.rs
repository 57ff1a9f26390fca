//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send one completion request to an LLM and get
//! an assistant message back. Dialect translation (message shapes, tool
//! schemas, finish reasons) is the provider's job; the agent loop is
//! provider-agnostic.
//!
//! Error policy: application-level failures the provider can describe
//! surface as `StopReason::Error` on the returned message so the loop can
//! classify them (e.g. context overflow). Network errors, timeouts, and
//! 5xx responses are returned as `Err(ProviderError)` so the surrounding
//! durable substep retries.

use crate::error::ProviderError;
use crate::message::{AssistantMessage, ChatMessage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The model identifier (e.g. "claude-sonnet-4-20250514").
    pub model: String,

    /// System prompt, passed out-of-band where the dialect supports it.
    pub system: String,

    /// The conversation so far.
    pub messages: Vec<ChatMessage>,

    /// Tools the model may call. Empty disables tool use.
    pub tools: Vec<ToolDefinition>,

    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: 4096,
        }
    }
}

/// The core Provider trait.
///
/// Every LLM backend implements this. The gateway is stateless and
/// reentrant: concurrent runs may share one provider instance.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get the complete assistant message.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<AssistantMessage, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let req = CompletionRequest::new("test-model", "be helpful");
        assert_eq!(req.max_tokens, 4096);
        assert!(req.messages.is_empty());
        assert!(req.tools.is_empty());
    }

    #[test]
    fn tool_definition_serializes_schema() {
        let tool = ToolDefinition {
            name: "read".into(),
            description: "Read a file".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Relative path" }
                },
                "required": ["path"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("\"read\""));
        assert!(json.contains("required"));
    }
}
