//! Per-session singleton concurrency with cancel-on-new-message.
//!
//! At any instant at most one run is in a non-terminal state per session
//! key. Submitting a run for a key that already has one in flight signals
//! cancellation and waits for the old run to stop before the new run
//! starts, so the cancelled run commits no substep after the new one
//! begins. Runs for distinct keys proceed in parallel.

use crate::run::CancelSignal;
use everclaw_core::session::SessionKey;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct ActiveRun {
    generation: u64,
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Observes one submitted run's completion.
pub struct RunTicket {
    done: oneshot::Receiver<bool>,
}

impl RunTicket {
    /// Wait for the run to terminate. Returns `true` if it ran to
    /// completion, `false` if it was cancelled or panicked.
    pub async fn wait(self) -> bool {
        self.done.await.unwrap_or(false)
    }
}

/// Keyed singleton supervisor.
pub struct SessionSupervisor {
    active: Arc<Mutex<HashMap<SessionKey, ActiveRun>>>,
    next_generation: Mutex<u64>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Mutex::new(0),
        }
    }

    /// Submit a run for `key`, cancelling and draining any in-flight run
    /// for the same key first.
    ///
    /// `make_run` receives the cancellation signal the run must thread into
    /// its [`crate::RunContext`]; its future resolves to `true` when the
    /// run completed (not cancelled).
    pub async fn submit<F, Fut>(&self, key: SessionKey, make_run: F) -> RunTicket
    where
        F: FnOnce(CancelSignal) -> Fut,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let generation = {
            let mut gen = self.next_generation.lock().await;
            *gen += 1;
            *gen
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = oneshot::channel();
        // The new run starts only after this fires, which happens once the
        // evicted predecessor (if any) has fully stopped. Registering the
        // gated entry first closes the window in which a concurrent submit
        // for the same key could see an empty slot.
        let (ready_tx, ready_rx) = oneshot::channel::<()>();

        let fut = make_run(CancelSignal::from_receiver(cancel_rx));
        let active = Arc::clone(&self.active);
        let cleanup_key = key.clone();

        let handle = tokio::spawn(async move {
            if ready_rx.await.is_err() {
                let _ = done_tx.send(false);
                return;
            }
            let completed = fut.await;
            // Remove our own entry unless a newer run already replaced it.
            let mut map = active.lock().await;
            if map
                .get(&cleanup_key)
                .is_some_and(|run| run.generation == generation)
            {
                map.remove(&cleanup_key);
            }
            let _ = done_tx.send(completed);
        });

        // Swap ourselves in, evicting the previous run for this key.
        let previous = {
            let mut map = self.active.lock().await;
            map.insert(
                key.clone(),
                ActiveRun {
                    generation,
                    cancel_tx,
                    handle,
                },
            )
        };

        if let Some(prev) = previous {
            debug!(session = %key, "Cancelling in-flight run for newer message");
            let _ = prev.cancel_tx.send(true);
            // The cancelled run stops at its next substep boundary; wait so
            // no further substeps commit after the new run begins.
            if let Err(e) = prev.handle.await {
                warn!(session = %key, error = %e, "Cancelled run task panicked");
            }
        }

        let _ = ready_tx.send(());
        RunTicket { done: done_rx }
    }

    /// Whether a run is currently in flight for `key`.
    pub async fn is_active(&self, key: &SessionKey) -> bool {
        self.active.lock().await.contains_key(key)
    }

    /// Number of in-flight runs across all keys.
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
