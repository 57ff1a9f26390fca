//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//!
//! 4xx responses the API can describe (invalid request, prompt too large)
//! come back as `StopReason::Error` so the loop can classify them; 429,
//! 5xx, and network failures are returned as `Err` for substep retry.

use async_trait::async_trait;
use everclaw_core::error::ProviderError;
use everclaw_core::message::{AssistantMessage, ChatMessage, ContentBlock, StopReason, Usage};
use everclaw_core::provider::{CompletionRequest, Provider, ToolDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(crate::COMPLETE_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Custom base URL (testing, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert runtime messages to Anthropic wire format.
    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
        let mut result = Vec::new();
        for msg in messages {
            match msg {
                ChatMessage::User { text } => result.push(ApiMessage {
                    role: "user".into(),
                    content: ApiContent::Text(text.clone()),
                }),
                ChatMessage::Assistant(assistant) => {
                    let blocks: Vec<ApiBlock> = assistant
                        .content
                        .iter()
                        .map(|block| match block {
                            ContentBlock::Text { text } => ApiBlock::Text { text: text.clone() },
                            ContentBlock::ToolCall { id, name, arguments } => ApiBlock::ToolUse {
                                id: id.clone(),
                                name: name.clone(),
                                input: arguments.clone(),
                            },
                        })
                        .collect();
                    result.push(ApiMessage {
                        role: "assistant".into(),
                        content: ApiContent::Blocks(blocks),
                    });
                }
                ChatMessage::ToolResult {
                    tool_call_id,
                    text,
                    is_error,
                    ..
                } => {
                    // Tool results travel as user-role content blocks
                    result.push(ApiMessage {
                        role: "user".into(),
                        content: ApiContent::Blocks(vec![ApiBlock::ToolResult {
                            tool_use_id: tool_call_id.clone(),
                            content: text.clone(),
                            is_error: *is_error,
                        }]),
                    });
                }
            }
        }
        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiTool> {
        tools
            .iter()
            .map(|t| ApiTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn from_api_response(resp: ApiResponse) -> AssistantMessage {
        let content = resp
            .content
            .into_iter()
            .map(|block| match block {
                ResponseBlock::Text { text } => ContentBlock::Text { text },
                ResponseBlock::ToolUse { id, name, input } => ContentBlock::ToolCall {
                    id,
                    name,
                    arguments: input,
                },
            })
            .collect();

        let stop_reason = match resp.stop_reason.as_deref() {
            Some("tool_use") => StopReason::ToolCall,
            Some("max_tokens") => StopReason::MaxTokens,
            _ => StopReason::Stop,
        };

        AssistantMessage {
            content,
            usage: Some(Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
                cost_usd: None,
            }),
            stop_reason,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<AssistantMessage, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": request.max_tokens,
        });
        if !request.system.is_empty() {
            body["system"] = serde_json::json!(request.system);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = "anthropic", model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        match status {
            200 => {}
            429 => {
                return Err(ProviderError::RateLimited {
                    retry_after_secs: 5,
                })
            }
            401 | 403 => {
                return Err(ProviderError::AuthenticationFailed(
                    "Invalid Anthropic API key".into(),
                ))
            }
            400..=499 => {
                // The API described what is wrong with the request; surface
                // as an error stop reason so the loop can classify it
                // (context overflow recovery keys off this text).
                let error_body = response.text().await.unwrap_or_default();
                let message = extract_error_message(&error_body).unwrap_or(error_body);
                warn!(status, message = %message, "Anthropic request rejected");
                return Ok(AssistantMessage {
                    content: vec![],
                    usage: None,
                    stop_reason: StopReason::Error(message),
                });
            }
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Anthropic API error");
                return Err(ProviderError::ApiError {
                    status_code: status,
                    message: error_body,
                });
            }
        }

        let api_resp: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse Anthropic response: {e}"),
        })?;

        Ok(Self::from_api_response(api_resp))
    }
}

/// Pull the human-readable message out of an error body like
/// `{"type":"error","error":{"type":"invalid_request_error","message":"…"}}`.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["message"].as_str().map(|s| s.to_string())
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ApiBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ApiBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ResponseBlock>,
    usage: ApiUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}
