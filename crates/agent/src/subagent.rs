//! Sub-agent delegation.
//!
//! `delegate_task` spawns an isolated child agent: fresh session key, its
//! own context window, the sub-agent tool registry (no further
//! delegation). The parent folds only the child's final response into its
//! conversation; the child's tool traffic stays in the child's own
//! session and step log. A child failure becomes an error tool-result in
//! the parent rather than a parent-run failure — cancellation is the one
//! exception, since it must stop the whole tree.

use crate::loop_runner::AgentLoop;
use everclaw_core::error::Error;
use everclaw_core::message::RunResult;
use everclaw_core::session::SessionKey;
use everclaw_core::tool::{ToolCall, ToolOutcome};
use everclaw_durable::RunContext;
use tracing::{info, warn};

/// Framing wrapped around the delegated task text.
pub fn sub_agent_prompt(task: &str) -> String {
    format!(
        "## Sub-Agent Context\n\
You are a sub-agent working on a task delegated by a main agent. You \
have your own context window and tools, but no access to the main \
conversation. Work autonomously: do not ask questions, complete the \
task and respond with a concise summary of what you did and found. \
Your final reply is the only thing the main agent will see.\n\n\
## Your Task\n{task}"
    )
}

impl AgentLoop {
    /// Route a `delegate_task` call to an isolated child run.
    pub(crate) async fn delegate(
        &self,
        ctx: &RunContext,
        parent_key: &SessionKey,
        call: &ToolCall,
    ) -> Result<ToolOutcome, Error> {
        let task = call.arguments["task"].as_str().unwrap_or("").to_string();
        if task.trim().is_empty() {
            return Ok(ToolOutcome::error("delegate_task requires a 'task' argument"));
        }

        // The key embeds a wall-clock read, so it is generated inside a
        // substep and replayed on retry.
        let parent = parent_key.clone();
        let sub_key: String = ctx
            .step("subagent-key", || async move {
                Ok(format!(
                    "sub-{parent}-{}",
                    chrono::Utc::now().timestamp_millis()
                ))
            })
            .await?;

        info!(parent = %parent_key, sub = %sub_key, "Spawning sub-agent");

        let prompt = sub_agent_prompt(&task);
        let child_name = sub_key.clone();

        let outcome: ToolOutcome = ctx
            .step("subagent", || async {
                let child_ctx = ctx.child(&child_name).map_err(Error::from)?;
                let child_key = SessionKey::new(sub_key.clone());
                match self.run_inner(&child_ctx, &child_key, &prompt, true).await {
                    Ok(RunResult { response, iterations, tool_calls, .. }) => {
                        info!(
                            sub = %child_key,
                            iterations,
                            tool_calls,
                            "Sub-agent finished"
                        );
                        Ok(ToolOutcome::ok(response))
                    }
                    Err(e) if e.is_cancelled() => Err(e),
                    Err(e) => {
                        warn!(sub = %child_key, error = %e, "Sub-agent failed");
                        Ok(ToolOutcome::error(format!("Sub-agent failed: {e}")))
                    }
                }
            })
            .await?;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_frames_the_task() {
        let prompt = sub_agent_prompt("refactor X");
        assert!(prompt.starts_with("## Sub-Agent Context"));
        assert!(prompt.contains("## Your Task\nrefactor X"));
        assert!(prompt.contains("only thing the main agent will see"));
    }
}
