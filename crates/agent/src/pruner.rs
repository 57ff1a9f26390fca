//! Pruner — in-place trimming of old tool-result text.
//!
//! Tool outputs dominate context growth inside a run. After the first few
//! iterations the loop prunes tool results that have fallen behind the
//! recent window, using a two-tier policy: if the old results are
//! collectively huge they are cleared outright, otherwise each oversized
//! one is trimmed to head + tail. Only the runtime message array is
//! touched; the persisted session never contains these texts.

use everclaw_core::message::ChatMessage;

/// Assistant turns whose tool results are always left intact.
pub const KEEP_LAST_ASSISTANT_TURNS: usize = 3;

/// Total old-tool-result size that triggers the hard clear.
const HARD_CLEAR_THRESHOLD: usize = 50_000;

/// Per-result size that triggers the soft trim.
const SOFT_TRIM_MAX_CHARS: usize = 4_000;

/// Kept on each side by the soft trim.
const SOFT_TRIM_KEEP: usize = 1_500;

/// Placeholder written by the hard clear.
pub const CLEARED_PLACEHOLDER: &str = "[Tool result cleared — old context]";

/// Prune old tool results in place.
///
/// Only tool results older than the last `2 × KEEP_LAST_ASSISTANT_TURNS`
/// positions are considered. Idempotent: pruning a pruned array changes
/// nothing.
pub fn prune(messages: &mut [ChatMessage]) {
    let protected_from = messages
        .len()
        .saturating_sub(2 * KEEP_LAST_ASSISTANT_TURNS);

    let old_total: usize = messages[..protected_from]
        .iter()
        .filter_map(|m| match m {
            ChatMessage::ToolResult { text, .. } => Some(text.len()),
            _ => None,
        })
        .sum();

    let hard_clear = old_total > HARD_CLEAR_THRESHOLD;

    for message in &mut messages[..protected_from] {
        let ChatMessage::ToolResult { text, .. } = message else {
            continue;
        };
        if hard_clear {
            if text != CLEARED_PLACEHOLDER {
                *text = CLEARED_PLACEHOLDER.to_string();
            }
        } else if text.chars().count() > SOFT_TRIM_MAX_CHARS {
            *text = soft_trim(text);
        }
    }
}

fn soft_trim(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let head: String = chars[..SOFT_TRIM_KEEP].iter().collect();
    let tail: String = chars[chars.len() - SOFT_TRIM_KEEP..].iter().collect();
    let trimmed = chars.len() - 2 * SOFT_TRIM_KEEP;
    format!("{head}\n\n... [{trimmed} chars trimmed] ...\n\n{tail}")
}
