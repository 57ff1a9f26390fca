//! Run context — named substeps with replay and cancellation.
//!
//! Every suspension point of a run (LLM call, tool execution, sub-agent
//! spawn, session I/O) executes through [`RunContext::step`]. The body
//! between substeps must stay deterministic given the replayed outputs:
//! wall-clock reads and random IDs belong inside substep bodies so they are
//! folded into the recorded value.

use crate::log::StepLog;
use everclaw_core::error::{DurableError, Error};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{watch, Mutex};
use tracing::debug;

/// Cancellation signal checked at substep boundaries.
///
/// Cloneable; the supervisor holds the sending side.
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires (cron jobs, tests).
    pub fn none() -> Self {
        // Dropping the sender is fine: `borrow` keeps returning the last
        // value, which stays `false` forever.
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// The durable execution context of one run.
///
/// Substep names recur across iterations (`think`, `tool:bash`); the
/// context auto-indexes each occurrence so replay lines up positionally.
pub struct RunContext {
    base_dir: PathBuf,
    run_id: String,
    log: Mutex<StepLog>,
    counters: Mutex<HashMap<String, u32>>,
    cancel: CancelSignal,
}

impl RunContext {
    /// Open the context for `run_id`, loading any prior step log so a
    /// retried run replays its completed substeps.
    pub fn new(base_dir: &Path, run_id: &str, cancel: CancelSignal) -> Result<Self, DurableError> {
        let log = StepLog::open(base_dir, run_id)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            run_id: run_id.to_string(),
            log: Mutex::new(log),
            counters: Mutex::new(HashMap::new()),
            cancel,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Execute a named substep.
    ///
    /// - Cancellation is checked before the body runs; a cancelled run
    ///   commits no further substeps.
    /// - If a prior attempt of this run recorded this substep, the recorded
    ///   output is returned without re-executing the body.
    /// - A successful output is recorded before it is returned. If the run
    ///   was cancelled while the body was in flight, the output is still
    ///   recorded but the run observes `Cancelled` instead.
    /// - A failed body is not recorded; the error propagates so the caller
    ///   can retry the whole run against the same log.
    pub async fn step<T, F, Fut>(&self, name: &str, body: F) -> Result<T, Error>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        if self.cancel.is_cancelled() {
            return Err(DurableError::Cancelled.into());
        }

        let indexed = {
            let mut counters = self.counters.lock().await;
            let n = counters.entry(name.to_string()).or_insert(0);
            let indexed = format!("{name}:{n}");
            *n += 1;
            indexed
        };

        {
            let log = self.log.lock().await;
            if let Some(recorded) = log.get(&indexed) {
                debug!(run = %self.run_id, step = %indexed, "Replaying recorded substep");
                return serde_json::from_value(recorded.clone()).map_err(|e| {
                    Error::from(DurableError::ReplayMismatch {
                        step: indexed.clone(),
                        reason: e.to_string(),
                    })
                });
            }
        }

        debug!(run = %self.run_id, step = %indexed, "Executing substep");
        let output = body().await?;

        let value = serde_json::to_value(&output)
            .map_err(|e| Error::from(DurableError::Log(format!("serialize step output: {e}"))))?;
        self.log.lock().await.record(&indexed, value)?;

        if self.cancel.is_cancelled() {
            // The in-flight substep completed and its output is recorded,
            // but the cancelled run must not act on it.
            return Err(DurableError::Cancelled.into());
        }

        Ok(output)
    }

    /// A child run context with its own namespaced step log.
    ///
    /// The child shares the parent's cancellation signal: cancelling the
    /// parent stops the child at its next substep boundary too.
    pub fn child(&self, name: &str) -> Result<RunContext, DurableError> {
        let child_id = format!("{}/{}", self.run_id, name);
        let log = StepLog::open(&self.base_dir, &child_id)?;
        Ok(RunContext {
            base_dir: self.base_dir.clone(),
            run_id: child_id,
            log: Mutex::new(log),
            counters: Mutex::new(HashMap::new()),
            cancel: self.cancel.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    #[tokio::test]
    async fn steps_auto_index_recurring_names() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path(), "run-1", CancelSignal::none()).unwrap();

        let a: u32 = ctx.step("think", || async { Ok(1u32) }).await.unwrap();
        let b: u32 = ctx.step("think", || async { Ok(2u32) }).await.unwrap();
        assert_eq!((a, b), (1, 2));

        let log = StepLog::open(tmp.path(), "run-1").unwrap();
        assert!(log.get("think:0").is_some());
        assert!(log.get("think:1").is_some());
    }

    #[tokio::test]
    async fn retry_replays_recorded_outputs() {
        let tmp = TempDir::new().unwrap();
        let executions = AtomicU32::new(0);

        {
            let ctx = RunContext::new(tmp.path(), "run-1", CancelSignal::none()).unwrap();
            let _: String = ctx
                .step("think", || async {
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok("first".to_string())
                })
                .await
                .unwrap();
        }

        // Retry: same run id, fresh context — the body must not re-execute.
        let ctx = RunContext::new(tmp.path(), "run-1", CancelSignal::none()).unwrap();
        let replayed: String = ctx
            .step("think", || async {
                executions.fetch_add(1, Ordering::SeqCst);
                Ok("second".to_string())
            })
            .await
            .unwrap();

        assert_eq!(replayed, "first");
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_step_is_not_recorded() {
        let tmp = TempDir::new().unwrap();
        let ctx = RunContext::new(tmp.path(), "run-1", CancelSignal::none()).unwrap();

        let result: Result<u32, _> = ctx
            .step("think", || async { Err(Error::Internal("boom".into())) })
            .await;
        assert!(result.is_err());

        let log = StepLog::open(tmp.path(), "run-1").unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_commits_no_further_steps() {
        let tmp = TempDir::new().unwrap();
        let (tx, rx) = watch::channel(false);
        let ctx = RunContext::new(tmp.path(), "run-1", CancelSignal::from_receiver(rx)).unwrap();

        let _: u32 = ctx.step("think", || async { Ok(1u32) }).await.unwrap();

        tx.send(true).unwrap();

        let result: Result<u32, _> = ctx.step("think", || async { Ok(2u32) }).await;
        assert!(result.unwrap_err().is_cancelled());

        // Only the first step committed
        let log = StepLog::open(tmp.path(), "run-1").unwrap();
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_mid_step_records_but_discards() {
        let tmp = TempDir::new().unwrap();
        let (tx, rx) = watch::channel(false);
        let ctx = RunContext::new(tmp.path(), "run-1", CancelSignal::from_receiver(rx)).unwrap();

        let result: Result<u32, _> = ctx
            .step("think", || async {
                // Cancellation lands while the substep is in flight
                tx.send(true).unwrap();
                Ok(7u32)
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
        // The output was recorded so a later inspection sees it…
        let log = StepLog::open(tmp.path(), "run-1").unwrap();
        assert_eq!(*log.get("think:0").unwrap(), serde_json::json!(7));
    }

    #[tokio::test]
    async fn child_context_is_isolated_but_shares_cancellation() {
        let tmp = TempDir::new().unwrap();
        let (tx, rx) = watch::channel(false);
        let ctx = RunContext::new(tmp.path(), "run-1", CancelSignal::from_receiver(rx)).unwrap();

        let child = ctx.child("sub-0").unwrap();
        let _: u32 = child.step("think", || async { Ok(1u32) }).await.unwrap();

        // Parent log untouched by child's steps
        let parent_log = StepLog::open(tmp.path(), "run-1").unwrap();
        assert!(parent_log.is_empty());
        let child_log = StepLog::open(tmp.path(), "run-1/sub-0").unwrap();
        assert_eq!(child_log.len(), 1);

        tx.send(true).unwrap();
        let r: Result<u32, _> = child.step("think", || async { Ok(2u32) }).await;
        assert!(r.unwrap_err().is_cancelled());
    }
}
