//! Built-in tool implementations for Everclaw.
//!
//! Tools give the agent the ability to act: read and edit files, search
//! the workspace, run commands, fetch URLs, and append notes to memory.
//! Everything filesystem-shaped is rooted at the agent workspace; paths
//! that escape it are rejected before any I/O happens.
//!
//! Two registries exist at runtime: the main-agent registry includes
//! `delegate_task`, the sub-agent registry excludes it so a child agent
//! cannot spawn grandchildren.

pub mod bash;
pub mod delegate;
pub mod fs_tools;
pub mod remember;
pub mod search;
pub mod web_fetch;
pub mod workspace;

use everclaw_core::tool::ToolRegistry;
use everclaw_memory::MemoryStore;
use std::path::Path;

/// Tool output cap, in characters.
pub const MAX_OUTPUT_CHARS: usize = 50_000;

/// Name of the delegation tool the loop intercepts.
pub const DELEGATE_TASK: &str = "delegate_task";

/// Truncate tool output at [`MAX_OUTPUT_CHARS`], marking the cut.
pub fn truncate_output(text: String) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text;
    }
    let kept: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
    format!("{kept}\n... [output truncated]")
}

fn register_common(registry: &mut ToolRegistry, workspace: &Path, memory: MemoryStore) {
    registry.register(Box::new(fs_tools::ReadTool::new(workspace)));
    registry.register(Box::new(fs_tools::WriteTool::new(workspace)));
    registry.register(Box::new(fs_tools::EditTool::new(workspace)));
    registry.register(Box::new(fs_tools::LsTool::new(workspace)));
    registry.register(Box::new(search::GrepTool::new(workspace)));
    registry.register(Box::new(search::FindTool::new(workspace)));
    registry.register(Box::new(bash::BashTool::new(workspace)));
    registry.register(Box::new(web_fetch::WebFetchTool::new()));
    registry.register(Box::new(remember::RememberTool::new(memory)));
}

/// Registry for main agents: all tools, including `delegate_task`.
pub fn main_registry(workspace: &Path, memory: MemoryStore) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_common(&mut registry, workspace, memory);
    registry.register(Box::new(delegate::DelegateTaskTool));
    registry
}

/// Registry for sub-agents: no `delegate_task`, recursion is forbidden.
pub fn sub_agent_registry(workspace: &Path, memory: MemoryStore) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_common(&mut registry, workspace, memory);
    registry
}
