//! OpenAI-compatible provider implementation.
//!
//! Works against any endpoint speaking the Chat Completions dialect
//! (OpenAI, OpenRouter, llama.cpp server, vLLM). Bearer authentication,
//! tool calls via the `tools`/`tool_calls` function-calling shape.

use async_trait::async_trait;
use everclaw_core::error::ProviderError;
use everclaw_core::message::{AssistantMessage, ChatMessage, ContentBlock, StopReason, Usage};
use everclaw_core::provider::{CompletionRequest, Provider, ToolDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat completions provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(crate::COMPLETE_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "openai".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_api_messages(system: &str, messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        let mut result = Vec::new();
        if !system.is_empty() {
            result.push(serde_json::json!({"role": "system", "content": system}));
        }
        for msg in messages {
            match msg {
                ChatMessage::User { text } => {
                    result.push(serde_json::json!({"role": "user", "content": text}));
                }
                ChatMessage::Assistant(assistant) => {
                    let text = assistant.text();
                    let tool_calls: Vec<serde_json::Value> = assistant
                        .tool_calls()
                        .into_iter()
                        .map(|tc| {
                            serde_json::json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments.to_string(),
                                }
                            })
                        })
                        .collect();

                    let mut entry = serde_json::json!({"role": "assistant"});
                    entry["content"] = if text.is_empty() {
                        serde_json::Value::Null
                    } else {
                        serde_json::json!(text)
                    };
                    if !tool_calls.is_empty() {
                        entry["tool_calls"] = serde_json::json!(tool_calls);
                    }
                    result.push(entry);
                }
                ChatMessage::ToolResult {
                    tool_call_id, text, ..
                } => {
                    result.push(serde_json::json!({
                        "role": "tool",
                        "tool_call_id": tool_call_id,
                        "content": text,
                    }));
                }
            }
        }
        result
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    fn from_api_response(resp: ApiResponse) -> Result<AssistantMessage, ProviderError> {
        let choice = resp.choices.into_iter().next().ok_or_else(|| {
            ProviderError::ApiError {
                status_code: 200,
                message: "Response contained no choices".into(),
            }
        })?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentBlock::Text { text });
            }
        }
        for tc in choice.message.tool_calls {
            let arguments = serde_json::from_str(&tc.function.arguments)
                .unwrap_or(serde_json::Value::Object(Default::default()));
            content.push(ContentBlock::ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments,
            });
        }

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => StopReason::ToolCall,
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::Stop,
        };

        Ok(AssistantMessage {
            content,
            usage: resp.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                cost_usd: None,
            }),
            stop_reason,
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<AssistantMessage, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.system, &request.messages),
            "max_tokens": request.max_tokens,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = "openai", model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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
                    "Invalid API key".into(),
                ))
            }
            400..=499 => {
                let error_body = response.text().await.unwrap_or_default();
                let message = extract_error_message(&error_body).unwrap_or(error_body);
                warn!(status, message = %message, "Request rejected");
                return Ok(AssistantMessage {
                    content: vec![],
                    usage: None,
                    stop_reason: StopReason::Error(message),
                });
            }
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "API error");
                return Err(ProviderError::ApiError {
                    status_code: status,
                    message: error_body,
                });
            }
        }

        let api_resp: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        Self::from_api_response(api_resp)
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["message"].as_str().map(|s| s.to_string())
}

// --- OpenAI API types ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_leads_message_list() {
        let api = OpenAiCompatProvider::to_api_messages(
            "be helpful",
            &[ChatMessage::user("hello")],
        );
        assert_eq!(api.len(), 2);
        assert_eq!(api[0]["role"], "system");
        assert_eq!(api[1]["role"], "user");
    }

    #[test]
    fn tool_result_maps_to_tool_role() {
        let api = OpenAiCompatProvider::to_api_messages(
            "",
            &[ChatMessage::tool_result("call_1", "bash", "output", false)],
        );
        assert_eq!(api[0]["role"], "tool");
        assert_eq!(api[0]["tool_call_id"], "call_1");
    }

    #[test]
    fn parse_tool_call_response() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "read", "arguments": "{\"path\":\"a.md\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 7}
            }"#,
        )
        .unwrap();

        let msg = OpenAiCompatProvider::from_api_response(resp).unwrap();
        assert_eq!(msg.stop_reason, StopReason::ToolCall);
        let calls = msg.tool_calls();
        assert_eq!(calls[0].arguments["path"], "a.md");
    }

    #[test]
    fn unparseable_arguments_degrade_to_empty_object() {
        let resp: ApiResponse = serde_json::from_str(
            r#"{
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "read", "arguments": "{broken"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            }"#,
        )
        .unwrap();

        let msg = OpenAiCompatProvider::from_api_response(resp).unwrap();
        assert!(msg.tool_calls()[0].arguments.is_object());
    }

    #[test]
    fn empty_choices_is_api_error() {
        let resp: ApiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(OpenAiCompatProvider::from_api_response(resp).is_err());
    }
}
