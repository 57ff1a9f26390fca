//! Runtime message types — the in-memory conversation consumed by the
//! LLM gateway.
//!
//! The conversation mixes three shapes: plain user text, assistant output
//! made of ordered text and tool-call blocks, and tool results fed back to
//! the model. Modelled as a sum type so the pruner and the providers can
//! match on exactly the arm they care about.

use serde::{Deserialize, Serialize};

/// One entry in the live conversation of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatMessage {
    /// Text from the end user (or a synthetic system injection).
    User { text: String },

    /// A full assistant turn, possibly containing tool calls.
    Assistant(AssistantMessage),

    /// The outcome of one tool call, folded back into the conversation.
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        text: String,
        is_error: bool,
    },
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            text: text.into(),
            is_error,
        }
    }

    /// The plain text of this message, concatenating assistant text blocks.
    pub fn text(&self) -> String {
        match self {
            Self::User { text } => text.clone(),
            Self::Assistant(msg) => msg.text(),
            Self::ToolResult { text, .. } => text.clone(),
        }
    }

    /// Role label used when rendering transcripts for summarization.
    pub fn role_label(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant(_) => "assistant",
            Self::ToolResult { .. } => "tool",
        }
    }
}

/// What the model produced for one `complete` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Text and tool-call blocks in the order the model produced them.
    pub content: Vec<ContentBlock>,

    /// Token usage for the call, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Why the model stopped.
    pub stop_reason: StopReason,
}

impl AssistantMessage {
    /// An assistant message holding only text (used by tests and mocks).
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            usage: None,
            stop_reason: StopReason::Stop,
        }
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    /// All tool-call blocks, in emission order.
    pub fn tool_calls(&self) -> Vec<crate::tool::ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolCall { id, name, arguments } => Some(crate::tool::ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                }),
                ContentBlock::Text { .. } => None,
            })
            .collect()
    }

    /// The error text when `stop_reason` is `Error`.
    pub fn error_text(&self) -> Option<&str> {
        match &self.stop_reason {
            StopReason::Error(text) => Some(text),
            _ => None,
        }
    }
}

/// A structural block inside an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of turn.
    Stop,
    /// The model wants tool results before continuing.
    ToolCall,
    /// Output token budget exhausted.
    MaxTokens,
    /// Provider-level application error, carried as text.
    Error(String),
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Estimated cost in USD, when the provider prices the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// The outcome of one complete agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// The final textual reply.
    pub response: String,
    /// How many think/act/observe iterations the run used.
    pub iterations: u32,
    /// Total tool calls executed across all iterations.
    pub tool_calls: u32,
    /// Which model produced the reply.
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_text_concatenates_blocks() {
        let msg = AssistantMessage {
            content: vec![
                ContentBlock::Text { text: "one".into() },
                ContentBlock::ToolCall {
                    id: "tc1".into(),
                    name: "read".into(),
                    arguments: serde_json::json!({"path": "a.md"}),
                },
                ContentBlock::Text { text: "two".into() },
            ],
            usage: None,
            stop_reason: StopReason::ToolCall,
        };
        assert_eq!(msg.text(), "one\ntwo");
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read");
    }

    #[test]
    fn blocks_preserve_emission_order() {
        let msg = AssistantMessage {
            content: vec![
                ContentBlock::ToolCall {
                    id: "a".into(),
                    name: "read".into(),
                    arguments: serde_json::json!({}),
                },
                ContentBlock::ToolCall {
                    id: "b".into(),
                    name: "write".into(),
                    arguments: serde_json::json!({}),
                },
            ],
            usage: None,
            stop_reason: StopReason::ToolCall,
        };
        let ids: Vec<String> = msg.tool_calls().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn serialization_roundtrip() {
        let msg = ChatMessage::tool_result("tc1", "bash", "done", false);
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        match back {
            ChatMessage::ToolResult { tool_name, is_error, .. } => {
                assert_eq!(tool_name, "bash");
                assert!(!is_error);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn error_stop_reason_exposes_text() {
        let msg = AssistantMessage {
            content: vec![],
            usage: None,
            stop_reason: StopReason::Error("prompt too large".into()),
        };
        assert_eq!(msg.error_text(), Some("prompt too large"));
        assert!(AssistantMessage::text_only("hi").error_text().is_none());
    }
}
