//! Web fetch tool — HTTP GET with a timeout and body truncation.

use async_trait::async_trait;
use everclaw_core::error::ToolError;
use everclaw_core::tool::{Tool, ToolOutcome};
use std::time::Duration;
use tracing::debug;

const FETCH_TIMEOUT_SECS: u64 = 30;

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL with HTTP GET and return the response body as text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "The URL to fetch" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutcome, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Ok(ToolOutcome::error("URL must start with http:// or https://"));
        }

        debug!(url = %url, "web_fetch");

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(ToolError::Timeout {
                    tool_name: "web_fetch".into(),
                    timeout_secs: FETCH_TIMEOUT_SECS,
                })
            }
            Err(e) => return Ok(ToolOutcome::error(format!("Fetch failed: {e}"))),
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            Ok(ToolOutcome::ok(crate::truncate_output(body)))
        } else {
            Ok(ToolOutcome::error(crate::truncate_output(format!(
                "HTTP {status}: {body}"
            ))))
        }
    }
}
