//! Memory store — curated long-term memory, identity files, daily logs.
//!
//! Layout under the workspace root:
//!
//! ```text
//! MEMORY.md            curated memory, optional `last_heartbeat:` marker
//! SOUL.md, USER.md     optional identity / user context
//! memory/2026-08-02.md daily append-only logs, `### HH:MM:SS` headers
//! ```
//!
//! Curated memory is rewritten atomically (the heartbeat and `remember`
//! may race); daily logs rely on append atomicity. Reads never create
//! files.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use everclaw_core::error::MemoryError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Marker line embedded in curated memory.
const HEARTBEAT_PREFIX: &str = "last_heartbeat:";

/// File-backed memory store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    workspace: PathBuf,
}

impl MemoryStore {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn memory_dir(&self) -> PathBuf {
        self.workspace.join("memory")
    }

    fn curated_path(&self) -> PathBuf {
        self.workspace.join("MEMORY.md")
    }

    /// Path of the daily log for a given date.
    pub fn daily_log_path(&self, date: NaiveDate) -> PathBuf {
        self.memory_dir()
            .join(format!("{}.md", date.format("%Y-%m-%d")))
    }

    async fn read_optional(path: &Path) -> Option<String> {
        match fs::read_to_string(path).await {
            Ok(content) if !content.trim().is_empty() => Some(content),
            _ => None,
        }
    }

    /// SOUL.md contents, if present and non-empty.
    pub async fn read_soul(&self) -> Option<String> {
        Self::read_optional(&self.workspace.join("SOUL.md")).await
    }

    /// USER.md contents, if present and non-empty.
    pub async fn read_user(&self) -> Option<String> {
        Self::read_optional(&self.workspace.join("USER.md")).await
    }

    /// Curated memory, if present. Never creates the file.
    pub async fn read_curated(&self) -> Option<String> {
        Self::read_optional(&self.curated_path()).await
    }

    /// Atomically replace curated memory.
    pub async fn write_curated(&self, content: &str) -> Result<(), MemoryError> {
        fs::create_dir_all(&self.workspace)
            .await
            .map_err(|e| MemoryError::Storage(format!("create workspace: {e}")))?;

        let tmp = self
            .workspace
            .join(format!(".MEMORY.md.tmp-{}", uuid::Uuid::new_v4()));
        fs::write(&tmp, content)
            .await
            .map_err(|e| MemoryError::Storage(format!("write curated temp: {e}")))?;
        fs::rename(&tmp, self.curated_path())
            .await
            .map_err(|e| MemoryError::Storage(format!("rename curated temp: {e}")))?;
        Ok(())
    }

    /// A day's log, if present and non-empty.
    pub async fn read_daily_log(&self, date: NaiveDate) -> Option<String> {
        Self::read_optional(&self.daily_log_path(date)).await
    }

    /// Size in bytes of a day's log (0 when absent).
    pub async fn daily_log_size(&self, date: NaiveDate) -> u64 {
        match fs::metadata(self.daily_log_path(date)).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        }
    }

    /// Append a timestamped entry to today's log, creating `memory/` as
    /// needed. Each entry gets a `### HH:MM:SS` section header.
    pub async fn append_daily(&self, note: &str) -> Result<(), MemoryError> {
        let now = Utc::now();
        self.append_daily_at(note, now).await
    }

    /// Append with an explicit instant (heartbeat tests pin the clock).
    pub async fn append_daily_at(
        &self,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<(), MemoryError> {
        fs::create_dir_all(self.memory_dir())
            .await
            .map_err(|e| MemoryError::Storage(format!("create memory dir: {e}")))?;

        let path = self.daily_log_path(at.date_naive());
        let entry = format!("### {}\n{}\n\n", at.format("%H:%M:%S"), note.trim_end());

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| MemoryError::Storage(format!("open {}: {e}", path.display())))?;
        file.write_all(entry.as_bytes())
            .await
            .map_err(|e| MemoryError::Storage(format!("append {}: {e}", path.display())))?;
        Ok(())
    }

    /// Parse the `last_heartbeat:` marker out of curated memory text.
    pub fn parse_last_heartbeat(content: &str) -> Option<DateTime<Utc>> {
        content.lines().find_map(|line| {
            let rest = line.trim().strip_prefix(HEARTBEAT_PREFIX)?;
            DateTime::parse_from_rfc3339(rest.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
    }

    /// Remove any marker lines. Applying twice yields the same result.
    pub fn strip_last_heartbeat(content: &str) -> String {
        let stripped: Vec<&str> = content
            .lines()
            .filter(|line| !line.trim().starts_with(HEARTBEAT_PREFIX))
            .collect();
        stripped.join("\n")
    }

    /// Curated memory text with a fresh marker appended.
    pub fn with_last_heartbeat(content: &str, at: DateTime<Utc>) -> String {
        let body = Self::strip_last_heartbeat(content);
        format!(
            "{}\n\n{HEARTBEAT_PREFIX} {}\n",
            body.trim_end(),
            at.to_rfc3339()
        )
    }

    /// The last `days` of non-empty daily logs ending at `today`, oldest
    /// first, as `(date, content)` pairs.
    pub async fn recent_daily_logs(
        &self,
        today: NaiveDate,
        days: u32,
    ) -> Vec<(NaiveDate, String)> {
        let mut logs = Vec::new();
        for offset in (0..days as i64).rev() {
            let date = today - Duration::days(offset);
            if let Some(content) = self.read_daily_log(date).await {
                logs.push((date, content));
            }
        }
        logs
    }

    /// Delete daily log files older than `retention_days` relative to
    /// `today`. Returns how many files were removed.
    pub async fn prune_daily_logs(
        &self,
        today: NaiveDate,
        retention_days: u32,
    ) -> Result<usize, MemoryError> {
        let dir = self.memory_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(MemoryError::Storage(format!("read memory dir: {e}"))),
        };

        let cutoff = today - Duration::days(retention_days as i64);
        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(stem) = Path::new(&name)
                .file_stem()
                .and_then(|s| s.to_str())
            else {
                continue;
            };
            let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") else {
                continue; // not a daily log
            };
            if date < cutoff {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => {
                        debug!(file = %entry.path().display(), "Pruned old daily log");
                        removed += 1;
                    }
                    Err(e) => warn!(file = %entry.path().display(), error = %e, "Failed to prune daily log"),
                }
            }
        }
        Ok(removed)
    }
}
