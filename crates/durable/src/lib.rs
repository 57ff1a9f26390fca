//! Minimal durable execution substrate.
//!
//! The agent engine assumes a substrate that provides named substeps with
//! replayed outputs, singleton concurrency keys with cancel-on-match, child
//! function invocation, and cron triggers. This crate implements that
//! substrate directly:
//!
//! - [`StepLog`]: a write-ahead log of substep outputs keyed by
//!   `(run, step name)`, one JSON object per line.
//! - [`RunContext`]: executes named substeps, auto-indexing recurring names
//!   (`think:0`, `think:1`, …), replaying recorded outputs on retry, and
//!   checking the cancellation signal at every substep boundary.
//! - [`SessionSupervisor`]: at most one in-flight run per session key; a
//!   newer submission cancels the current run and waits for it to stop
//!   before the new run commits any substep.
//! - [`cron`]: a 5-field cron matcher and a minute-granularity scheduler.

pub mod cron;
pub mod log;
pub mod run;
pub mod supervisor;

pub use cron::{cron_matches, CronSchedule};
pub use log::StepLog;
pub use run::{CancelSignal, RunContext};
pub use supervisor::{RunTicket, SessionSupervisor};
