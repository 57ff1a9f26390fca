//! Canonical events — the protocol between channels and the agent.
//!
//! Two event names form the core protocol: `agent.message.received`
//! (normalized inbound message) and `agent.reply.ready` (outbound reply).
//! Channel payloads are normalized at the ingest boundary; after that the
//! runtime only ever sees these shapes. `channel_meta` flows through
//! opaquely — the core never inspects it, handlers read their own
//! platform fields back out.

use crate::session::SessionKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event name for normalized inbound messages.
pub const MESSAGE_RECEIVED: &str = "agent.message.received";

/// Event name for finished replies.
pub const REPLY_READY: &str = "agent.reply.ready";

/// Where a reply should go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub chat_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl Destination {
    pub fn chat(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            message_id: None,
            thread_id: None,
        }
    }
}

/// Who sent the inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// The canonical normalized inbound event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReceived {
    /// The user's message text.
    pub message: String,
    pub session_key: SessionKey,
    /// Originating channel name (e.g. "telegram").
    pub channel: String,
    pub sender: Sender,
    pub destination: Destination,
    /// Opaque per-channel payload, passed through to the handler.
    #[serde(default)]
    pub channel_meta: serde_json::Value,
}

/// The finished-reply event, routed to the originating channel handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyReady {
    pub response: String,
    pub channel: String,
    pub destination: Destination,
    #[serde(default)]
    pub channel_meta: serde_json::Value,
}

/// Events observable on the runtime bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RuntimeEvent {
    MessageReceived(MessageReceived),
    ReplyReady(ReplyReady),
    /// A run failed terminally (after retries); carries the origin event.
    RunFailed {
        origin: MessageReceived,
        error: String,
    },
}

impl RuntimeEvent {
    /// The canonical event name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageReceived(_) => MESSAGE_RECEIVED,
            Self::ReplyReady(_) => REPLY_READY,
            Self::RunFailed { .. } => "function.failed",
        }
    }
}

/// A broadcast-based event bus.
///
/// Components subscribe to observe the canonical protocol without tight
/// coupling; publishing with no subscribers is fine.
pub struct EventBus {
    sender: broadcast::Sender<Arc<RuntimeEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: RuntimeEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RuntimeEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> MessageReceived {
        MessageReceived {
            message: "hello".into(),
            session_key: SessionKey::new("telegram-42"),
            channel: "telegram".into(),
            sender: Sender {
                id: "1".into(),
                name: "Alice".into(),
                username: None,
            },
            destination: Destination::chat("42"),
            channel_meta: serde_json::json!({"chat_type": "private"}),
        }
    }

    #[test]
    fn event_names() {
        assert_eq!(
            RuntimeEvent::MessageReceived(sample_message()).name(),
            "agent.message.received"
        );
        assert_eq!(
            RuntimeEvent::ReplyReady(ReplyReady {
                response: "hi".into(),
                channel: "telegram".into(),
                destination: Destination::chat("42"),
                channel_meta: serde_json::Value::Null,
            })
            .name(),
            "agent.reply.ready"
        );
    }

    #[tokio::test]
    async fn bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(RuntimeEvent::MessageReceived(sample_message()));

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            RuntimeEvent::MessageReceived(msg) => assert_eq!(msg.message, "hello"),
            _ => panic!("expected MessageReceived"),
        }
    }

    #[test]
    fn bus_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(RuntimeEvent::MessageReceived(sample_message()));
    }

    #[test]
    fn message_received_roundtrip() {
        let event = sample_message();
        let json = serde_json::to_string(&event).unwrap();
        let back: MessageReceived = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_key, SessionKey::new("telegram-42"));
        assert_eq!(back.channel_meta["chat_type"], "private");
    }
}
