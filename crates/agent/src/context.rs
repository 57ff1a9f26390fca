//! Context assembly — system prompt composition and history loading.
//!
//! The system prompt concatenates, in order: identity (SOUL.md when
//! present, else a default naming the agent), user context (USER.md),
//! a memory block (curated memory plus yesterday's and today's daily
//! logs), and fixed behavioral guidelines. Absent files are skipped
//! silently.
//!
//! History replays only user and assistant turns: tool results exist
//! within a live run and are never rehydrated from persistence.

use chrono::{Duration, Utc};
use everclaw_core::error::SessionError;
use everclaw_core::message::{AssistantMessage, ChatMessage, ContentBlock, StopReason};
use everclaw_core::session::{SessionKey, SessionRole};
use everclaw_memory::{MemoryStore, SessionStore};

/// Fixed behavioral guidelines appended to every system prompt.
const GUIDELINES: &str = "\
## Guidelines

- Use tools when they help you accomplish the task; do not guess at \
file contents or command output you could check.
- Call one tool at a time when steps depend on each other.
- Use the remember tool for facts worth keeping across conversations.
- Your text reply ends the turn and is sent to the user. Do not \
narrate that you are about to answer; just answer.";

/// Compose the system prompt for a run.
pub async fn build_system_prompt(memory: &MemoryStore, agent_name: &str) -> String {
    let mut sections: Vec<String> = Vec::new();

    match memory.read_soul().await {
        Some(soul) => sections.push(soul.trim().to_string()),
        None => sections.push(format!(
            "You are {agent_name}, a capable assistant reachable over chat. \
You have tools for working with files, running commands, and fetching \
the web inside your workspace."
        )),
    }

    if let Some(user) = memory.read_user().await {
        sections.push(format!("## About the user\n\n{}", user.trim()));
    }

    let mut memory_block = String::new();
    if let Some(curated) = memory.read_curated().await {
        memory_block.push_str(MemoryStore::strip_last_heartbeat(&curated).trim());
    }
    let today = Utc::now().date_naive();
    if let Some(yesterday_log) = memory.read_daily_log(today - Duration::days(1)).await {
        if !memory_block.is_empty() {
            memory_block.push_str("\n\n");
        }
        memory_block.push_str("### Yesterday\n\n");
        memory_block.push_str(yesterday_log.trim());
    }
    if let Some(today_log) = memory.read_daily_log(today).await {
        if !memory_block.is_empty() {
            memory_block.push_str("\n\n");
        }
        memory_block.push_str("### Today\n\n");
        memory_block.push_str(today_log.trim());
    }
    if !memory_block.is_empty() {
        sections.push(format!("## Memory\n\n{memory_block}"));
    }

    sections.push(GUIDELINES.to_string());
    sections.join("\n\n")
}

/// Load the conversation history for a run.
///
/// Returns the last `max_messages` persisted turns with role user or
/// assistant, mapped to runtime messages in insertion order.
pub async fn build_history(
    sessions: &SessionStore,
    key: &SessionKey,
    max_messages: usize,
) -> Result<Vec<ChatMessage>, SessionError> {
    let records = sessions.load(key, max_messages).await?;

    Ok(records
        .into_iter()
        .filter_map(|record| match record.role {
            SessionRole::User => Some(ChatMessage::user(record.content)),
            SessionRole::Assistant => Some(ChatMessage::Assistant(AssistantMessage {
                content: vec![ContentBlock::Text {
                    text: record.content,
                }],
                usage: None,
                stop_reason: StopReason::Stop,
            })),
            SessionRole::ToolResult => None,
        })
        .collect())
}
