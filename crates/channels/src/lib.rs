//! Channel adapters for Everclaw.
//!
//! Each channel contributes two things:
//!
//! - a **normalizer**: a pure function `(payload, headers) -> Normalized`
//!   that runs at the ingest boundary and maps platform webhooks to the
//!   canonical `agent.message.received` event, a discard event name, or a
//!   synchronous platform challenge;
//! - a **handler** implementing [`everclaw_core::ChannelHandler`] for the
//!   outbound direction (replies, receipt signals, webhook setup).
//!
//! Session key policy is per channel: chat-scoped for DM-style platforms
//! (Telegram), thread-scoped where threads exist (Slack).

pub mod format;
pub mod slack;
pub mod telegram;

pub use slack::{SlackChannel, SlackConfig};
pub use telegram::{TelegramChannel, TelegramConfig};

use everclaw_core::event::MessageReceived;

/// What a normalizer produced from one webhook delivery.
#[derive(Debug, Clone)]
pub enum Normalized {
    /// A canonical inbound message event for the agent.
    Event(MessageReceived),

    /// Not for the agent; named so duplicates and noise are observable
    /// (`{channel}/message.unsupported`, `{channel}/transform.failed`,
    /// `{channel}/event.retry`).
    Discard { event: String },

    /// The platform requires a synchronous response (URL verification).
    Challenge { body: String },
}

impl Normalized {
    pub fn discard(event: impl Into<String>) -> Self {
        Self::Discard {
            event: event.into(),
        }
    }

    /// The contained event, for tests and dispatch plumbing.
    pub fn into_event(self) -> Option<MessageReceived> {
        match self {
            Self::Event(event) => Some(event),
            _ => None,
        }
    }
}
