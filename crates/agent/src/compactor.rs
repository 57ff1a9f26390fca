//! Compactor — LLM-assisted summarization of old conversation.
//!
//! When a session's history crosses the token threshold, everything but a
//! recent tail is summarized into a structured checkpoint and replaced by
//! one synthetic user message. The kept tail is preserved verbatim and the
//! persisted session is rewritten atomically to the compacted form.

use crate::token;
use everclaw_core::error::Error;
use everclaw_core::message::{ChatMessage, StopReason};
use everclaw_core::provider::{CompletionRequest, Provider};
use everclaw_core::session::{SessionKey, SessionRecord, SessionRole};
use everclaw_memory::SessionStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Compactor tuning, loaded from configuration.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    pub max_tokens: usize,
    pub threshold: f64,
    pub keep_recent_tokens: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            max_tokens: 150_000,
            threshold: 0.8,
            keep_recent_tokens: 20_000,
        }
    }
}

const SUMMARIZE_SYSTEM_PROMPT: &str = "\
You summarize agent conversations into structured checkpoints. Be factual \
and terse. Preserve identifiers, file paths, commands, and decisions \
exactly as they appear.";

const CHECKPOINT_TEMPLATE: &str = "\
## Goal
## Constraints
## Progress
### Done
### In Progress
### Blocked
## Key Decisions
## Next Steps
## Critical Context";

pub struct Compactor {
    provider: Arc<dyn Provider>,
    model: String,
    config: CompactionConfig,
}

impl Compactor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, config: CompactionConfig) -> Self {
        Self {
            provider,
            model: model.into(),
            config,
        }
    }

    /// Whether the conversation has outgrown the context budget.
    pub fn should_compact(&self, messages: &[ChatMessage]) -> bool {
        let total = token::total_tokens(messages);
        let limit = (self.config.max_tokens as f64 * self.config.threshold) as usize;
        total > limit
    }

    /// Index of the first kept message: walk back from the tail until the
    /// kept suffix reaches `keep_recent_tokens`.
    fn cut_index(&self, messages: &[ChatMessage]) -> usize {
        let mut accumulated = 0usize;
        let mut cut = messages.len();
        for (i, message) in messages.iter().enumerate().rev() {
            accumulated += token::message_tokens(message);
            cut = i;
            if accumulated >= self.config.keep_recent_tokens {
                break;
            }
        }
        cut
    }

    /// Serialize older messages into a role-prefixed transcript.
    fn render_transcript(messages: &[ChatMessage]) -> String {
        let mut out = String::new();
        for message in messages {
            let text = message.text();
            match message {
                ChatMessage::ToolResult { tool_name, .. } => {
                    out.push_str(&format!("tool ({tool_name}): {text}\n"));
                }
                _ => out.push_str(&format!("{}: {text}\n", message.role_label())),
            }
        }
        out
    }

    /// Compact the conversation, rewriting the persisted session.
    ///
    /// Returns the compacted message list; when nothing is worth
    /// summarizing, returns the input unchanged (and leaves the session
    /// file alone).
    pub async fn compact(
        &self,
        messages: Vec<ChatMessage>,
        key: &SessionKey,
        sessions: &SessionStore,
    ) -> Result<Vec<ChatMessage>, Error> {
        let cut = self.cut_index(&messages);
        if cut <= 1 {
            debug!(session = %key, "Compaction skipped: nothing before the kept tail");
            return Ok(messages);
        }

        let (older, kept) = messages.split_at(cut);
        let transcript = Self::render_transcript(older);

        let prompt = format!(
            "Summarize the conversation below into a checkpoint using exactly \
this markdown template:\n\n{CHECKPOINT_TEMPLATE}\n\nConversation:\n\n{transcript}"
        );

        let mut request = CompletionRequest::new(&self.model, SUMMARIZE_SYSTEM_PROMPT);
        request.messages = vec![ChatMessage::user(prompt)];

        let reply = self.provider.complete(request).await?;
        if let StopReason::Error(text) = &reply.stop_reason {
            return Err(everclaw_core::error::ProviderError::ApiError {
                status_code: 0,
                message: format!("Summarization failed: {text}"),
            }
            .into());
        }
        let summary = reply.text();

        let synthetic = ChatMessage::user(format!(
            "The conversation history before this point was compacted into the \
following summary: <summary>\n{summary}\n</summary>"
        ));

        let mut compacted = Vec::with_capacity(kept.len() + 1);
        compacted.push(synthetic);
        compacted.extend_from_slice(kept);

        let records: Vec<SessionRecord> = compacted
            .iter()
            .map(|message| {
                let role = match message {
                    ChatMessage::User { .. } => SessionRole::User,
                    ChatMessage::Assistant(_) => SessionRole::Assistant,
                    ChatMessage::ToolResult { .. } => SessionRole::ToolResult,
                };
                SessionRecord::new(role, message.text())
            })
            .collect();
        sessions.rewrite(key, &records).await?;

        info!(
            session = %key,
            summarized = older.len(),
            kept = kept.len(),
            "Compacted conversation"
        );
        Ok(compacted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use everclaw_core::error::ProviderError;
    use everclaw_core::message::AssistantMessage;
    use tempfile::TempDir;

    struct FixedSummaryProvider;

    #[async_trait]
    impl Provider for FixedSummaryProvider {
        fn name(&self) -> &str {
            "mock"
        }
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<AssistantMessage, ProviderError> {
            // The summarization prompt must carry the transcript
            assert!(request.messages[0].text().contains("Conversation:"));
            Ok(AssistantMessage::text_only("## Goal\nShip the thing."))
        }
    }

    fn compactor(keep_recent_tokens: usize) -> Compactor {
        Compactor::new(
            Arc::new(FixedSummaryProvider),
            "mock-model",
            CompactionConfig {
                max_tokens: 150_000,
                threshold: 0.8,
                keep_recent_tokens,
            },
        )
    }

    #[test]
    fn threshold_check() {
        let c = compactor(20_000);
        let small = vec![ChatMessage::user("short")];
        assert!(!c.should_compact(&small));

        // 150_000 × 0.8 = 120_000 tokens → 480_000+ bytes
        let big: Vec<ChatMessage> = (0..50)
            .map(|_| ChatMessage::user("x".repeat(10_000)))
            .collect();
        assert!(c.should_compact(&big));
    }

    #[tokio::test]
    async fn compaction_preserves_kept_tail_verbatim() {
        let tmp = TempDir::new().unwrap();
        let sessions = SessionStore::new(tmp.path().join("sessions"));
        let key = SessionKey::new("c1");

        // keep_recent_tokens = 50 → roughly the last message (200 bytes)
        let c = compactor(50);
        let messages: Vec<ChatMessage> = (0..6)
            .map(|i| ChatMessage::user(format!("{i}-{}", "x".repeat(200))))
            .collect();
        let tail_texts: Vec<String> = messages.iter().map(|m| m.text()).collect();

        let compacted = c.compact(messages, &key, &sessions).await.unwrap();

        // Summary strictly first
        assert!(compacted[0].text().contains("<summary>"));
        assert!(compacted[0].text().contains("Ship the thing."));

        // Kept messages byte-for-byte equal to the input suffix, in order
        let kept: Vec<String> = compacted[1..].iter().map(|m| m.text()).collect();
        assert_eq!(kept.as_slice(), &tail_texts[tail_texts.len() - kept.len()..]);
        assert!(!kept.is_empty());
    }

    #[tokio::test]
    async fn compaction_rewrites_persisted_session() {
        let tmp = TempDir::new().unwrap();
        let sessions = SessionStore::new(tmp.path().join("sessions"));
        let key = SessionKey::new("c1");

        let c = compactor(50);
        let messages: Vec<ChatMessage> = (0..6)
            .map(|i| ChatMessage::user(format!("msg {i} {}", "x".repeat(200))))
            .collect();

        let compacted = c.compact(messages, &key, &sessions).await.unwrap();

        let records = sessions.load(&key, 100).await.unwrap();
        assert_eq!(records.len(), compacted.len());
        assert!(records[0].content.contains("<summary>"));
        assert_eq!(records[0].role, SessionRole::User);
    }

    #[tokio::test]
    async fn nothing_to_summarize_returns_unchanged() {
        let tmp = TempDir::new().unwrap();
        let sessions = SessionStore::new(tmp.path().join("sessions"));
        let key = SessionKey::new("c1");

        // Huge keep window → cut lands at or before index 1
        let c = compactor(1_000_000);
        let messages = vec![
            ChatMessage::user("first"),
            ChatMessage::user("second"),
            ChatMessage::user("third"),
        ];
        let compacted = c.compact(messages.clone(), &key, &sessions).await.unwrap();

        assert_eq!(compacted.len(), 3);
        assert_eq!(compacted[0].text(), "first");
        // Session file untouched
        assert!(sessions.load(&key, 10).await.unwrap().is_empty());
    }
}
