//! The durable agent engine — the heart of Everclaw.
//!
//! A run follows a **think → act → observe** cycle:
//!
//! 1. Assemble context (identity + memory + conversation history)
//! 2. Compact the history if it has grown past the token threshold
//! 3. Send to the LLM via the configured provider
//! 4. If tool calls: execute them sequentially, append results, loop
//! 5. If text: that reply ends the turn
//!
//! Every LLM call and tool execution is a named durable substep, so a
//! retried run replays completed work instead of re-executing it. The
//! loop is bounded; exhausting the budget produces a fixed reply rather
//! than an error.

pub mod compactor;
pub mod context;
pub mod loop_runner;
pub mod pruner;
pub mod subagent;
pub mod token;

pub use compactor::{CompactionConfig, Compactor};
pub use loop_runner::AgentLoop;
