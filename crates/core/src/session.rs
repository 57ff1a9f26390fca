//! Persisted session types.
//!
//! A session is an append-only log of conversation turns for one logical
//! conversation, stored as one JSON object per line. Tool traffic inside a
//! run is never persisted here — only user and assistant turns survive the
//! run (plus tool-result records written by the compactor's rewrite path).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier for one logical conversation.
///
/// Two messages share a key iff they belong to the same conversation.
/// Channels construct keys per their own policy (chat-scoped for DMs,
/// thread-scoped where threads exist), e.g. `telegram-12345` or
/// `slack-C042-1714.0021`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Who produced a persisted turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionRole {
    User,
    Assistant,
    ToolResult,
}

/// Per-turn bookkeeping stored alongside assistant replies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// Iterations the run used to produce this turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,

    /// Tool calls the run executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<u32>,
}

/// One line in a session JSONL file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub role: SessionRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TurnMetadata>,
}

impl SessionRecord {
    pub fn new(role: SessionRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: TurnMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
