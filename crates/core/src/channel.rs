//! ChannelHandler trait — the abstraction over chat platforms.
//!
//! A handler knows how to deliver a finished reply to its platform and to
//! signal receipt of an inbound message. Normalization of inbound payloads
//! lives with the handler's channel crate; the runtime only dispatches
//! through this trait.

use crate::error::ChannelError;
use crate::event::Destination;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// The closed capability set every channel implements.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// Channel name, matching the `channel` field of canonical events.
    fn name(&self) -> &str;

    /// Deliver a reply: format markdown to the platform's dialect, split
    /// at the platform's size limit, send. On a formatting-parse error the
    /// handler falls back to plain text.
    async fn send_reply(
        &self,
        response: &str,
        destination: &Destination,
        channel_meta: &serde_json::Value,
    ) -> std::result::Result<(), ChannelError>;

    /// Best-effort receipt signal (typing indicator, reaction). Failures
    /// are swallowed by the dispatcher; implementations should still avoid
    /// panicking.
    async fn acknowledge(
        &self,
        destination: &Destination,
        channel_meta: &serde_json::Value,
    ) -> std::result::Result<(), ChannelError>;

    /// Idempotent registration of the webhook with the platform.
    async fn setup(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }
}

/// Maps channel names to handlers.
pub struct ChannelRegistry {
    handlers: HashMap<String, Arc<dyn ChannelHandler>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn ChannelHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ChannelHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run setup on every registered handler, surfacing the first failure.
    pub async fn setup_all(&self) -> std::result::Result<(), ChannelError> {
        for handler in self.handlers.values() {
            handler.setup().await?;
        }
        Ok(())
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
