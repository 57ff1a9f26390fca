//! # Everclaw Core
//!
//! Domain types, traits, and error definitions for the Everclaw durable
//! agent runtime. This crate has **zero framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (LLM provider, channel handler, tool) is
//! defined as a trait here. Implementations live in their respective
//! crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod channel;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use channel::{ChannelHandler, ChannelRegistry};
pub use error::{
    ChannelError, DurableError, Error, MemoryError, ProviderError, Result, SessionError,
    ToolError,
};
pub use event::{Destination, EventBus, MessageReceived, ReplyReady, RuntimeEvent, Sender};
pub use message::{AssistantMessage, ChatMessage, ContentBlock, RunResult, StopReason, Usage};
pub use provider::{CompletionRequest, Provider, ToolDefinition};
pub use session::{SessionKey, SessionRecord, SessionRole, TurnMetadata};
pub use tool::{Tool, ToolCall, ToolOutcome, ToolRegistry};
