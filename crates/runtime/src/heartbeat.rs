//! Heartbeat — adaptive distillation of daily logs into curated memory.
//!
//! Runs on a cron schedule. The check phase is cheap and LLM-free: it
//! reads curated memory, parses the `last_heartbeat` marker, and measures
//! today's daily log. Distillation happens only when the log has grown
//! past a size threshold or too many hours have passed since the last
//! heartbeat; otherwise the tick exits early. Each phase is its own
//! durable substep.

use chrono::{NaiveDate, Utc};
use everclaw_core::error::Error;
use everclaw_core::message::{ChatMessage, StopReason};
use everclaw_core::provider::{CompletionRequest, Provider};
use everclaw_durable::RunContext;
use everclaw_memory::MemoryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Daily-log size that forces a distillation, in bytes.
pub const LOG_SIZE_THRESHOLD: u64 = 4096;

/// Hours since the last heartbeat that force a distillation.
pub const MAX_HOURS_BETWEEN: i64 = 8;

/// How many days of logs feed one distillation.
const DAYS_TO_LOAD: u32 = 7;

const DISTILL_SYSTEM_PROMPT: &str = "\
You maintain the long-term memory file of a personal agent. You integrate \
recent daily logs into the curated memory: keep durable facts, \
preferences, and open threads; drop ephemera and resolved items; merge \
duplicates. Output only the new memory file content, as markdown.";

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeartbeatOutcome {
    /// Below both thresholds; no model call was made.
    Skipped,
    /// Memory was rewritten; `pruned` daily logs were deleted.
    Distilled { pruned: usize },
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckResult {
    curated: Option<String>,
    today: NaiveDate,
    should_distill: bool,
}

pub struct Heartbeat {
    provider: Arc<dyn Provider>,
    model: String,
    memory: MemoryStore,
    retention_days: u32,
}

impl Heartbeat {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        memory: MemoryStore,
        retention_days: u32,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            memory,
            retention_days,
        }
    }

    /// Run one heartbeat tick.
    pub async fn tick(&self, ctx: &RunContext) -> Result<HeartbeatOutcome, Error> {
        let check: CheckResult = ctx
            .step("check", || async {
                let now = Utc::now();
                let today = now.date_naive();
                let curated = self.memory.read_curated().await;

                let log_size = self.memory.daily_log_size(today).await;
                let hours_since = curated
                    .as_deref()
                    .and_then(MemoryStore::parse_last_heartbeat)
                    .map(|at| (now - at).num_hours())
                    .unwrap_or(i64::MAX);

                let should_distill =
                    log_size > LOG_SIZE_THRESHOLD || hours_since > MAX_HOURS_BETWEEN;
                debug!(log_size, hours_since, should_distill, "Heartbeat check");
                Ok(CheckResult {
                    curated,
                    today,
                    should_distill,
                })
            })
            .await?;

        if !check.should_distill {
            debug!("Heartbeat below thresholds, skipping");
            return Ok(HeartbeatOutcome::Skipped);
        }

        let logs: Vec<(NaiveDate, String)> = ctx
            .step("load", || async {
                Ok(self
                    .memory
                    .recent_daily_logs(check.today, DAYS_TO_LOAD)
                    .await)
            })
            .await?;

        let distilled: String = ctx
            .step("distill", || async {
                let current = check
                    .curated
                    .as_deref()
                    .map(MemoryStore::strip_last_heartbeat)
                    .unwrap_or_default();
                let rendered: String = logs
                    .iter()
                    .map(|(date, content)| format!("## {date}\n\n{content}\n"))
                    .collect();

                let prompt = format!(
                    "Current long-term memory:\n\n{current}\n\n\
Recent daily logs:\n\n{rendered}\n\n\
Rewrite the long-term memory file now."
                );

                let mut request = CompletionRequest::new(&self.model, DISTILL_SYSTEM_PROMPT);
                request.messages = vec![ChatMessage::user(prompt)];
                // tools deliberately empty: distillation is a pure rewrite

                let reply = self.provider.complete(request).await?;
                if let StopReason::Error(text) = &reply.stop_reason {
                    return Err(everclaw_core::error::ProviderError::ApiError {
                        status_code: 0,
                        message: format!("Distillation failed: {text}"),
                    }
                    .into());
                }
                Ok(reply.text())
            })
            .await?;

        let _: bool = ctx
            .step("write", || async {
                let content = MemoryStore::with_last_heartbeat(&distilled, Utc::now());
                self.memory.write_curated(&content).await?;
                Ok(true)
            })
            .await?;

        let pruned: usize = ctx
            .step("prune", || async {
                Ok(self
                    .memory
                    .prune_daily_logs(check.today, self.retention_days)
                    .await?)
            })
            .await?;

        info!(pruned, "Heartbeat distilled memory");
        Ok(HeartbeatOutcome::Distilled { pruned })
    }
}
