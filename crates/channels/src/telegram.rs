//! Telegram channel adapter.
//!
//! Normalizer for Bot API webhook updates and a handler speaking the Bot
//! API for the outbound direction. Session keys are chat-scoped:
//! `telegram-{chat_id}` — every message in one chat belongs to one
//! conversation.

use crate::format::split_message;
use crate::Normalized;
use async_trait::async_trait;
use everclaw_core::channel::ChannelHandler;
use everclaw_core::error::ChannelError;
use everclaw_core::event::{Destination, MessageReceived, Sender};
use everclaw_core::session::SessionKey;
use serde_json::Value;
use tracing::{debug, info, warn};

pub const CHANNEL: &str = "telegram";

/// Telegram's hard message size limit is 4096; splitting at 4000 leaves
/// headroom for formatting entities.
const MESSAGE_LIMIT: usize = 4000;

/// Map a Bot API update to a canonical event.
///
/// Non-text updates (stickers, photos, channel posts, edits) are
/// discarded as `telegram/message.unsupported`; structurally broken
/// payloads as `telegram/transform.failed`.
pub fn normalize(payload: &Value) -> Normalized {
    let Some(message) = payload.get("message") else {
        return Normalized::discard("telegram/message.unsupported");
    };

    let Some(chat_id) = message["chat"]["id"].as_i64() else {
        return Normalized::discard("telegram/transform.failed");
    };

    let Some(text) = message["text"].as_str().filter(|t| !t.is_empty()) else {
        return Normalized::discard("telegram/message.unsupported");
    };

    let from = &message["from"];
    let sender = Sender {
        id: from["id"]
            .as_i64()
            .map(|id| id.to_string())
            .unwrap_or_default(),
        name: from["first_name"].as_str().unwrap_or("unknown").to_string(),
        username: from["username"].as_str().map(|s| s.to_string()),
    };

    let destination = Destination {
        chat_id: chat_id.to_string(),
        message_id: message["message_id"].as_i64().map(|id| id.to_string()),
        thread_id: None,
    };

    Normalized::Event(MessageReceived {
        message: text.to_string(),
        session_key: SessionKey::new(format!("{CHANNEL}-{chat_id}")),
        channel: CHANNEL.to_string(),
        sender,
        destination,
        channel_meta: serde_json::json!({
            "chat_id": chat_id,
            "chat_type": message["chat"]["type"].as_str().unwrap_or("private"),
        }),
    })
}

/// Telegram channel configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub bot_token: String,
    /// Public webhook URL to register on setup, when known.
    pub webhook_url: Option<String>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

/// Outbound Telegram handler.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.config.bot_token
        )
    }

    async fn call(&self, method: &str, body: Value) -> Result<reqwest::Response, ChannelError> {
        self.client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: CHANNEL.into(),
                reason: e.to_string(),
            })
    }

    /// Send one chunk, falling back to plain text when Telegram rejects
    /// the markdown entities.
    async fn send_chunk(&self, chat_id: &str, chunk: &str) -> Result<(), ChannelError> {
        let response = self
            .call(
                "sendMessage",
                serde_json::json!({
                    "chat_id": chat_id,
                    "text": chunk,
                    "parse_mode": "Markdown",
                }),
            )
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        // A 400 here is almost always a markdown entity the Bot API could
        // not parse; resend without parse_mode.
        let status = response.status().as_u16();
        if status == 400 {
            debug!("Markdown rejected, resending as plain text");
            let retry = self
                .call(
                    "sendMessage",
                    serde_json::json!({"chat_id": chat_id, "text": chunk}),
                )
                .await?;
            if retry.status().is_success() {
                return Ok(());
            }
        }

        Err(ChannelError::DeliveryFailed {
            channel: CHANNEL.into(),
            reason: format!("sendMessage returned HTTP {status}"),
        })
    }
}

#[async_trait]
impl ChannelHandler for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn send_reply(
        &self,
        response: &str,
        destination: &Destination,
        channel_meta: &Value,
    ) -> Result<(), ChannelError> {
        // channel_meta is authoritative for routing; destination.chat_id
        // is the documented fallback.
        let chat_id = channel_meta["chat_id"]
            .as_i64()
            .map(|id| id.to_string())
            .unwrap_or_else(|| destination.chat_id.clone());

        for chunk in split_message(response, MESSAGE_LIMIT) {
            self.send_chunk(&chat_id, &chunk).await?;
        }
        Ok(())
    }

    async fn acknowledge(
        &self,
        destination: &Destination,
        channel_meta: &Value,
    ) -> Result<(), ChannelError> {
        let chat_id = channel_meta["chat_id"]
            .as_i64()
            .map(|id| id.to_string())
            .unwrap_or_else(|| destination.chat_id.clone());

        let _ = self
            .call(
                "sendChatAction",
                serde_json::json!({"chat_id": chat_id, "action": "typing"}),
            )
            .await?;
        Ok(())
    }

    async fn setup(&self) -> Result<(), ChannelError> {
        let Some(webhook_url) = &self.config.webhook_url else {
            debug!("No webhook URL configured, skipping Telegram setup");
            return Ok(());
        };

        let response = self
            .call("setWebhook", serde_json::json!({"url": webhook_url}))
            .await
            .map_err(|e| ChannelError::SetupFailed(e.to_string()))?;

        if response.status().is_success() {
            info!(url = %webhook_url, "Telegram webhook registered");
            Ok(())
        } else {
            warn!(status = response.status().as_u16(), "setWebhook failed");
            Err(ChannelError::SetupFailed(format!(
                "setWebhook returned HTTP {}",
                response.status()
            )))
        }
    }
}
