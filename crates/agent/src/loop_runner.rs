//! The bounded think → act → observe loop.
//!
//! One run handles one inbound message: assemble context, consult the
//! model, execute requested tools sequentially, feed results back, and
//! stop when the model answers with text and no tool calls. Every model
//! call and tool execution is a named durable substep (`think`,
//! `tool:{name}`, `subagent`), auto-indexed across iterations, so a
//! retried run replays completed work.
//!
//! Context overflow reported by the provider is trapped once per run and
//! recovered with an in-place coarse truncation; any other provider-level
//! error fails the `think` substep so the substrate retries it.

use crate::compactor::{CompactionConfig, Compactor};
use crate::context;
use crate::pruner;
use everclaw_core::error::{Error, ProviderError};
use everclaw_core::message::{AssistantMessage, ChatMessage, RunResult};
use everclaw_core::provider::{CompletionRequest, Provider};
use everclaw_core::session::{SessionKey, SessionRole, TurnMetadata};
use everclaw_core::tool::{ToolOutcome, ToolRegistry};
use everclaw_durable::RunContext;
use everclaw_memory::{MemoryStore, SessionStore};
use regex::Regex;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Persisted turns loaded into a fresh run.
const HISTORY_WINDOW: usize = 10;

/// Patterns that identify a context-overflow error across providers.
const OVERFLOW_PATTERN: &str =
    r"(?i)context.?overflow|prompt.?too.?large|too many tokens|maximum context|token limit";

/// The durable agent engine.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    agent_name: String,
    max_iterations: u32,
    main_tools: Arc<ToolRegistry>,
    sub_tools: Arc<ToolRegistry>,
    sessions: SessionStore,
    memory: MemoryStore,
    compaction: CompactionConfig,
    overflow: Regex,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        agent_name: impl Into<String>,
        main_tools: Arc<ToolRegistry>,
        sub_tools: Arc<ToolRegistry>,
        sessions: SessionStore,
        memory: MemoryStore,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            agent_name: agent_name.into(),
            max_iterations: 20,
            main_tools,
            sub_tools,
            sessions,
            memory,
            compaction: CompactionConfig::default(),
            overflow: Regex::new(OVERFLOW_PATTERN).expect("overflow pattern is valid"),
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_compaction(mut self, config: CompactionConfig) -> Self {
        self.compaction = config;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Process one inbound message as a main agent.
    pub async fn run(
        &self,
        ctx: &RunContext,
        key: &SessionKey,
        incoming: &str,
    ) -> Result<RunResult, Error> {
        self.run_inner(ctx, key, incoming, false).await
    }

    /// The loop body, shared by main and sub-agent runs. Boxed because
    /// sub-agent delegation recurses through it.
    pub(crate) fn run_inner<'a>(
        &'a self,
        ctx: &'a RunContext,
        key: &'a SessionKey,
        incoming: &'a str,
        is_sub_agent: bool,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<RunResult, Error>> + Send + 'a>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(self.memory.workspace())
                .await
                .map_err(|e| Error::Internal(format!("create workspace: {e}")))?;

            info!(session = %key, run = %ctx.run_id(), is_sub_agent, "Starting run");

            let system_prompt: String = ctx
                .step("context", || async {
                    Ok(context::build_system_prompt(&self.memory, &self.agent_name).await)
                })
                .await?;

            let mut messages: Vec<ChatMessage> = ctx
                .step("load-history", || async {
                    Ok(context::build_history(&self.sessions, key, HISTORY_WINDOW).await?)
                })
                .await?;

            let compactor =
                Compactor::new(self.provider.clone(), &self.model, self.compaction.clone());
            if compactor.should_compact(&messages) {
                let to_compact = messages.clone();
                messages = ctx
                    .step("compact", || async {
                        compactor.compact(to_compact, key, &self.sessions).await
                    })
                    .await?;
            }

            messages.push(ChatMessage::user(incoming));

            let tools = if is_sub_agent {
                self.sub_tools.definitions()
            } else {
                self.main_tools.definitions()
            };

            let mut iterations: u32 = 0;
            let mut total_tool_calls: u32 = 0;
            let mut final_response: Option<String> = None;
            let mut has_compacted_this_run = false;

            while final_response.is_none() && iterations < self.max_iterations {
                iterations += 1;

                if iterations as usize > pruner::KEEP_LAST_ASSISTANT_TURNS {
                    pruner::prune(&mut messages);
                }

                if iterations >= self.max_iterations.saturating_sub(3) {
                    messages.push(ChatMessage::user(format!(
                        "[SYSTEM: You are on iteration {iterations} of {}. Respond NOW \
with your best answer. Do not call any more tools.]",
                        self.max_iterations
                    )));
                } else if iterations >= self.max_iterations.saturating_sub(10) {
                    messages.push(ChatMessage::user(format!(
                        "[SYSTEM: You are on iteration {iterations} of {}. Wrap up your \
work and prepare to answer.]",
                        self.max_iterations
                    )));
                }

                let reply: AssistantMessage = ctx
                    .step("think", || async {
                        let request = CompletionRequest {
                            model: self.model.clone(),
                            system: system_prompt.clone(),
                            messages: messages.clone(),
                            tools: tools.clone(),
                            max_tokens: 4096,
                        };
                        let reply = self.provider.complete(request).await?;
                        if let Some(text) = reply.error_text() {
                            // Overflow is handled by the loop; anything else
                            // fails the substep so the substrate retries it.
                            if !self.overflow.is_match(text) {
                                return Err(ProviderError::ApiError {
                                    status_code: 0,
                                    message: text.to_string(),
                                }
                                .into());
                            }
                        }
                        Ok(reply)
                    })
                    .await?;

                if let Some(error_text) = reply.error_text() {
                    if has_compacted_this_run {
                        return Err(ProviderError::ApiError {
                            status_code: 0,
                            message: format!("Context overflow after recovery: {error_text}"),
                        }
                        .into());
                    }
                    warn!(session = %key, "Context overflow — emergency truncation");
                    emergency_truncate(&mut messages);
                    has_compacted_this_run = true;
                    iterations -= 1;
                    continue;
                }

                let tool_calls = reply.tool_calls();
                let text = reply.text();

                if tool_calls.is_empty() && !text.is_empty() {
                    final_response = Some(text);
                    break;
                }

                debug!(
                    session = %key,
                    iteration = iterations,
                    tool_count = tool_calls.len(),
                    "Executing tool calls"
                );
                messages.push(ChatMessage::Assistant(reply));

                // Sequential, in the order the model emitted them
                for call in tool_calls {
                    let outcome: ToolOutcome =
                        if call.name == everclaw_tools::DELEGATE_TASK && !is_sub_agent {
                            self.delegate(ctx, key, &call).await?
                        } else {
                            let registry = if is_sub_agent {
                                &self.sub_tools
                            } else {
                                &self.main_tools
                            };
                            ctx.step(&format!("tool:{}", call.name), || async {
                                Ok(registry.execute(&call).await)
                            })
                            .await?
                        };

                    messages.push(ChatMessage::tool_result(
                        &call.id,
                        &call.name,
                        outcome.text,
                        outcome.is_error,
                    ));
                    total_tool_calls += 1;
                }
            }

            let response = final_response
                .unwrap_or_else(|| format!("(Reached max iterations: {})", self.max_iterations));

            let _: bool = ctx
                .step("persist", || async {
                    self.sessions
                        .append(key, SessionRole::User, incoming, None)
                        .await?;
                    self.sessions
                        .append(
                            key,
                            SessionRole::Assistant,
                            &response,
                            Some(TurnMetadata {
                                iterations: Some(iterations),
                                tool_calls: Some(total_tool_calls),
                            }),
                        )
                        .await?;
                    Ok(true)
                })
                .await?;

            info!(
                session = %key,
                iterations,
                tool_calls = total_tool_calls,
                "Run finished"
            );

            Ok(RunResult {
                response,
                iterations,
                tool_calls: total_tool_calls,
                model: self.model.clone(),
            })
        })
    }
}

/// Last-resort in-place truncation when the provider reports overflow.
///
/// Keeps the most recent `min(6, len)` messages and collapses everything
/// older into one synthetic user message with each entry cut to 200
/// characters. Runs at most once per run.
fn emergency_truncate(messages: &mut Vec<ChatMessage>) {
    let keep = messages.len().min(6);
    let cut = messages.len() - keep;
    if cut == 0 {
        return;
    }

    let mut lines = Vec::with_capacity(cut);
    for message in &messages[..cut] {
        let text: String = message.text().chars().take(200).collect();
        lines.push(format!("{}: {text}", message.role_label()));
    }
    let synthetic = ChatMessage::user(format!(
        "The conversation history before this point was truncated to recover \
from a context overflow:\n{}",
        lines.join("\n")
    ));

    let mut replacement = Vec::with_capacity(keep + 1);
    replacement.push(synthetic);
    replacement.extend_from_slice(&messages[cut..]);
    *messages = replacement;
}
