//! Slack channel adapter.
//!
//! Normalizer for Events API deliveries and a Web API handler for the
//! outbound direction. Session keys are thread-scoped:
//! `slack-{channel}-{thread_ts}` (falling back to the message `ts` for
//! messages that start a thread), so each thread is its own
//! conversation.
//!
//! Events API retries (`x-slack-retry-num` header) map to a distinct
//! discard event so a slow run does not get the same message twice, and
//! `url_verification` payloads are answered synchronously.

use crate::format::{markdown_to_mrkdwn, split_message};
use crate::Normalized;
use async_trait::async_trait;
use everclaw_core::channel::ChannelHandler;
use everclaw_core::error::ChannelError;
use everclaw_core::event::{Destination, MessageReceived, Sender};
use everclaw_core::session::SessionKey;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

pub const CHANNEL: &str = "slack";

const MESSAGE_LIMIT: usize = 4000;

/// Header carried on Events API redeliveries.
pub const RETRY_HEADER: &str = "x-slack-retry-num";

/// Map an Events API delivery to a canonical event.
///
/// `headers` keys are expected lowercased.
pub fn normalize(payload: &Value, headers: &HashMap<String, String>) -> Normalized {
    if headers.contains_key(RETRY_HEADER) {
        return Normalized::discard("slack/event.retry");
    }

    match payload["type"].as_str() {
        Some("url_verification") => {
            let challenge = payload["challenge"].as_str().unwrap_or_default();
            return Normalized::Challenge {
                body: challenge.to_string(),
            };
        }
        Some("event_callback") => {}
        _ => return Normalized::discard("slack/message.unsupported"),
    }

    let event = &payload["event"];
    if event["type"].as_str() != Some("message") {
        return Normalized::discard("slack/message.unsupported");
    }
    // Bot echoes and message edits would loop the agent on itself
    if event.get("bot_id").is_some() || event.get("subtype").is_some() {
        return Normalized::discard("slack/message.unsupported");
    }

    let (Some(channel), Some(ts)) = (event["channel"].as_str(), event["ts"].as_str()) else {
        return Normalized::discard("slack/transform.failed");
    };
    let Some(text) = event["text"].as_str().filter(|t| !t.is_empty()) else {
        return Normalized::discard("slack/message.unsupported");
    };

    let thread_ts = event["thread_ts"].as_str().unwrap_or(ts);

    Normalized::Event(MessageReceived {
        message: text.to_string(),
        session_key: SessionKey::new(format!("{CHANNEL}-{channel}-{thread_ts}")),
        channel: CHANNEL.to_string(),
        sender: Sender {
            id: event["user"].as_str().unwrap_or("unknown").to_string(),
            name: event["user"].as_str().unwrap_or("unknown").to_string(),
            username: None,
        },
        destination: Destination {
            chat_id: channel.to_string(),
            message_id: Some(ts.to_string()),
            thread_id: Some(thread_ts.to_string()),
        },
        channel_meta: serde_json::json!({
            "channel": channel,
            "thread_ts": thread_ts,
        }),
    })
}

/// Slack channel configuration.
#[derive(Clone)]
pub struct SlackConfig {
    /// Bot token (`xoxb-…`).
    pub bot_token: String,
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &"[REDACTED]")
            .finish()
    }
}

/// Outbound Slack handler.
pub struct SlackChannel {
    config: SlackConfig,
    client: reqwest::Client,
}

impl SlackChannel {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, ChannelError> {
        let response = self
            .client
            .post(format!("https://slack.com/api/{method}"))
            .bearer_auth(&self.config.bot_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: CHANNEL.into(),
                reason: e.to_string(),
            })?;

        let value: Value = response
            .json()
            .await
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: CHANNEL.into(),
                reason: format!("unparseable Slack response: {e}"),
            })?;

        if value["ok"].as_bool() != Some(true) {
            return Err(ChannelError::DeliveryFailed {
                channel: CHANNEL.into(),
                reason: value["error"].as_str().unwrap_or("unknown").to_string(),
            });
        }
        Ok(value)
    }
}

#[async_trait]
impl ChannelHandler for SlackChannel {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn send_reply(
        &self,
        response: &str,
        destination: &Destination,
        channel_meta: &Value,
    ) -> Result<(), ChannelError> {
        let channel = channel_meta["channel"]
            .as_str()
            .unwrap_or(&destination.chat_id)
            .to_string();
        let thread_ts = channel_meta["thread_ts"]
            .as_str()
            .map(|s| s.to_string())
            .or_else(|| destination.thread_id.clone());

        let formatted = markdown_to_mrkdwn(response);
        for chunk in split_message(&formatted, MESSAGE_LIMIT) {
            let mut body = serde_json::json!({
                "channel": channel,
                "text": chunk,
            });
            if let Some(ts) = &thread_ts {
                body["thread_ts"] = serde_json::json!(ts);
            }
            self.call("chat.postMessage", body).await?;
        }
        Ok(())
    }

    async fn acknowledge(
        &self,
        destination: &Destination,
        channel_meta: &Value,
    ) -> Result<(), ChannelError> {
        let channel = channel_meta["channel"]
            .as_str()
            .unwrap_or(&destination.chat_id);
        let Some(ts) = destination.message_id.as_deref() else {
            debug!("No message ts to react to, skipping acknowledge");
            return Ok(());
        };

        self.call(
            "reactions.add",
            serde_json::json!({
                "channel": channel,
                "timestamp": ts,
                "name": "eyes",
            }),
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(event: Value) -> Value {
        serde_json::json!({
            "type": "event_callback",
            "team_id": "T01",
            "event": event,
        })
    }

    fn message_event() -> Value {
        serde_json::json!({
            "type": "message",
            "channel": "C042",
            "user": "U7",
            "text": "hey there",
            "ts": "1714.0021",
        })
    }

    #[test]
    fn message_normalizes_thread_scoped() {
        let normalized = normalize(&delivery(message_event()), &HashMap::new());
        let event = normalized.into_event().unwrap();
        assert_eq!(event.message, "hey there");
        // A message outside a thread starts its own thread at its ts
        assert_eq!(event.session_key.as_str(), "slack-C042-1714.0021");
        assert_eq!(event.destination.thread_id.as_deref(), Some("1714.0021"));
        assert_eq!(event.channel_meta["channel"], "C042");
    }

    #[test]
    fn threaded_reply_shares_the_session() {
        let mut threaded = message_event();
        threaded["ts"] = serde_json::json!("1714.0099");
        threaded["thread_ts"] = serde_json::json!("1714.0021");

        let event = normalize(&delivery(threaded), &HashMap::new())
            .into_event()
            .unwrap();
        assert_eq!(event.session_key.as_str(), "slack-C042-1714.0021");
    }

    #[test]
    fn retry_header_discards_as_retry_event() {
        let headers: HashMap<String, String> =
            [(RETRY_HEADER.to_string(), "1".to_string())].into();
        match normalize(&delivery(message_event()), &headers) {
            Normalized::Discard { event } => assert_eq!(event, "slack/event.retry"),
            _ => panic!("expected discard"),
        }
    }

    #[test]
    fn url_verification_answers_synchronously() {
        let payload = serde_json::json!({
            "type": "url_verification",
            "challenge": "abc123",
        });
        match normalize(&payload, &HashMap::new()) {
            Normalized::Challenge { body } => assert_eq!(body, "abc123"),
            _ => panic!("expected challenge"),
        }
    }

    #[test]
    fn bot_echo_is_discarded() {
        let mut event = message_event();
        event["bot_id"] = serde_json::json!("B99");
        match normalize(&delivery(event), &HashMap::new()) {
            Normalized::Discard { event } => assert_eq!(event, "slack/message.unsupported"),
            _ => panic!("expected discard"),
        }
    }

    #[test]
    fn non_message_event_is_discarded() {
        let event = serde_json::json!({"type": "reaction_added", "user": "U7"});
        assert!(matches!(
            normalize(&delivery(event), &HashMap::new()),
            Normalized::Discard { .. }
        ));
    }

    #[test]
    fn missing_channel_is_transform_failed() {
        let event = serde_json::json!({"type": "message", "text": "hi", "ts": "1.2"});
        match normalize(&delivery(event), &HashMap::new()) {
            Normalized::Discard { event } => assert_eq!(event, "slack/transform.failed"),
            _ => panic!("expected discard"),
        }
    }
}
