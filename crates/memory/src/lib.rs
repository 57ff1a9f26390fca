//! Persistent state for Everclaw: session logs and the memory workspace.
//!
//! Two independent stores live under the workspace root:
//!
//! - `sessions/{key}.jsonl` — append-only conversation logs, one JSON
//!   record per line, rewritten atomically only by compaction.
//! - `MEMORY.md`, `SOUL.md`, `USER.md`, `memory/YYYY-MM-DD.md` — curated
//!   long-term memory, identity files, and dated append-only daily logs.

pub mod session;
pub mod store;

pub use session::SessionStore;
pub use store::MemoryStore;
