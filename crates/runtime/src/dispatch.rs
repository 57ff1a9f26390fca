//! Event dispatchers — the fan-out around one inbound message.
//!
//! A `MessageReceived` event triggers, in parallel:
//!
//! - **acknowledge**: best-effort receipt signal, no retries;
//! - **handle**: the agent run, under the session supervisor (one run per
//!   session key, cancel-on-new-message) with run-level retries that
//!   replay completed substeps;
//!
//! and when the run finishes, **send_reply** routes the `ReplyReady`
//! event to the originating channel handler with up to 3 attempts. A run
//! that fails terminally goes through the failure handler, which tells
//! the user something went wrong instead of staying silent.

use crate::Runtime;
use everclaw_core::event::{MessageReceived, ReplyReady, RuntimeEvent};
use everclaw_durable::{RunContext, RunTicket};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Run-level retry budget; substeps replay across attempts.
const MAX_RUN_ATTEMPTS: u32 = 3;

/// Outbound delivery attempts for one reply.
const MAX_SEND_ATTEMPTS: u32 = 3;

/// Entry point for one normalized inbound event.
///
/// Returns the supervisor ticket so callers (tests, ingest) can await
/// run completion; production ingest fires and forgets.
pub async fn on_message_received(rt: Arc<Runtime>, event: MessageReceived) -> RunTicket {
    rt.bus
        .publish(RuntimeEvent::MessageReceived(event.clone()));

    // Acknowledge in parallel with the run, best-effort
    {
        let rt = rt.clone();
        let event = event.clone();
        tokio::spawn(async move {
            acknowledge(&rt, &event).await;
        });
    }

    let key = event.session_key.clone();
    let rt_run = rt.clone();
    rt.supervisor
        .clone()
        .submit(key, move |cancel| async move {
            handle_message(rt_run, event, cancel).await
        })
        .await
}

/// Best-effort receipt signal. Failures are logged and swallowed.
async fn acknowledge(rt: &Runtime, event: &MessageReceived) {
    let Some(handler) = rt.channels.get(&event.channel) else {
        return;
    };
    if let Err(e) = handler
        .acknowledge(&event.destination, &event.channel_meta)
        .await
    {
        debug!(channel = %event.channel, error = %e, "Acknowledge failed (ignored)");
    }
}

/// Drive one agent run with durable retries, then dispatch the reply.
///
/// Returns `true` when the run completed (reply sent or reply dispatch
/// exhausted), `false` when it was cancelled by a newer message.
async fn handle_message(
    rt: Arc<Runtime>,
    event: MessageReceived,
    cancel: everclaw_durable::CancelSignal,
) -> bool {
    // One durable identity per inbound message: every attempt replays
    // the substeps recorded by earlier attempts.
    let run_id = format!("run-{}", uuid::Uuid::new_v4());

    let mut last_error: Option<everclaw_core::Error> = None;
    for attempt in 1..=MAX_RUN_ATTEMPTS {
        let ctx = match RunContext::new(&rt.steps_dir, &run_id, cancel.clone()) {
            Ok(ctx) => ctx,
            Err(e) => {
                last_error = Some(e.into());
                break;
            }
        };

        match rt.agent.run(&ctx, &event.session_key, &event.message).await {
            Ok(result) => {
                info!(
                    session = %event.session_key,
                    iterations = result.iterations,
                    tool_calls = result.tool_calls,
                    "Run complete"
                );
                let reply = ReplyReady {
                    response: result.response,
                    channel: event.channel.clone(),
                    destination: event.destination.clone(),
                    channel_meta: event.channel_meta.clone(),
                };
                rt.bus.publish(RuntimeEvent::ReplyReady(reply.clone()));
                send_reply(&rt, reply).await;
                return true;
            }
            Err(e) if e.is_cancelled() => {
                info!(session = %event.session_key, "Run cancelled by newer message");
                return false;
            }
            Err(e) => {
                warn!(
                    session = %event.session_key,
                    attempt,
                    error = %e,
                    "Run attempt failed"
                );
                last_error = Some(e);
            }
        }
    }

    let error = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown".into());
    on_run_failed(&rt, event, error).await;
    true
}

/// Route one finished reply to its channel handler, up to 3 attempts.
pub async fn send_reply(rt: &Runtime, reply: ReplyReady) {
    let Some(handler) = rt.channels.get(&reply.channel) else {
        error!(channel = %reply.channel, "No handler for reply channel");
        return;
    };

    for attempt in 1..=MAX_SEND_ATTEMPTS {
        match handler
            .send_reply(&reply.response, &reply.destination, &reply.channel_meta)
            .await
        {
            Ok(()) => return,
            Err(e) if attempt < MAX_SEND_ATTEMPTS => {
                warn!(channel = %reply.channel, attempt, error = %e, "Reply delivery failed, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(200 * attempt as u64)).await;
            }
            Err(e) => {
                error!(channel = %reply.channel, error = %e, "Reply delivery exhausted retries");
            }
        }
    }
}

/// Global failure handler: a terminally-failed run still answers the
/// user with a short apology via the originating channel.
async fn on_run_failed(rt: &Runtime, origin: MessageReceived, error: String) {
    error!(session = %origin.session_key, error = %error, "Run failed terminally");
    rt.bus.publish(RuntimeEvent::RunFailed {
        origin: origin.clone(),
        error,
    });

    let Some(handler) = rt.channels.get(&origin.channel) else {
        return;
    };
    let apology = "Sorry — something went wrong while handling your message. Please try again.";
    if let Err(e) = handler
        .send_reply(apology, &origin.destination, &origin.channel_meta)
        .await
    {
        warn!(channel = %origin.channel, error = %e, "Could not deliver failure notice");
    }
}
