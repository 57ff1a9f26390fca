//! Write-ahead log of substep outputs.
//!
//! One file per run, one JSON object per line: `{"step": "think:0",
//! "output": …}`. The log is loaded on open and appended after each
//! substep completes, so a retry of the run sees every output that was
//! recorded before the crash. Corrupted lines are skipped with a warning —
//! one bad line must not make a run unreplayable.

use everclaw_core::error::DurableError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
struct StepEntry {
    step: String,
    output: serde_json::Value,
}

/// The persisted substep outputs of one run.
pub struct StepLog {
    path: PathBuf,
    recorded: HashMap<String, serde_json::Value>,
}

impl StepLog {
    /// Open (or create) the log for `run_id` under `dir`.
    ///
    /// Slashes in the run id (child runs) become subdirectories.
    pub fn open(dir: &Path, run_id: &str) -> Result<Self, DurableError> {
        let path = dir.join(format!("{run_id}.jsonl"));
        let recorded = Self::load(&path);
        Ok(Self { path, recorded })
    }

    fn load(path: &Path) -> HashMap<String, serde_json::Value> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return HashMap::new(), // no log yet — fresh run
        };

        let mut recorded = HashMap::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<StepEntry>(line) {
                Ok(entry) => {
                    recorded.insert(entry.step, entry.output);
                }
                Err(e) => warn!(error = %e, "Skipping corrupted step log line"),
            }
        }
        recorded
    }

    /// The recorded output for a step, if the step already completed.
    pub fn get(&self, step: &str) -> Option<&serde_json::Value> {
        self.recorded.get(step)
    }

    /// Number of recorded substeps.
    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }

    /// Record a completed substep's output, appending to the file before
    /// the in-memory map is updated.
    pub fn record(&mut self, step: &str, output: serde_json::Value) -> Result<(), DurableError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DurableError::Log(format!("create log dir: {e}")))?;
        }

        let entry = StepEntry {
            step: step.to_string(),
            output: output.clone(),
        };
        let mut line = serde_json::to_string(&entry)
            .map_err(|e| DurableError::Log(format!("serialize step entry: {e}")))?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DurableError::Log(format!("open step log: {e}")))?;
        file.write_all(line.as_bytes())
            .map_err(|e| DurableError::Log(format!("append step log: {e}")))?;

        self.recorded.insert(step.to_string(), output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fresh_log_is_empty() {
        let tmp = TempDir::new().unwrap();
        let log = StepLog::open(tmp.path(), "run-1").unwrap();
        assert!(log.is_empty());
        assert!(log.get("think:0").is_none());
    }

    #[test]
    fn record_then_reopen_replays() {
        let tmp = TempDir::new().unwrap();

        let mut log = StepLog::open(tmp.path(), "run-1").unwrap();
        log.record("think:0", serde_json::json!({"text": "hi"}))
            .unwrap();
        log.record("tool:read:0", serde_json::json!("contents"))
            .unwrap();

        let reopened = StepLog::open(tmp.path(), "run-1").unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened.get("think:0").unwrap()["text"].as_str(),
            Some("hi")
        );
    }

    #[test]
    fn runs_do_not_share_logs() {
        let tmp = TempDir::new().unwrap();

        let mut a = StepLog::open(tmp.path(), "run-a").unwrap();
        a.record("think:0", serde_json::json!(1)).unwrap();

        let b = StepLog::open(tmp.path(), "run-b").unwrap();
        assert!(b.is_empty());
    }

    #[test]
    fn corrupted_line_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run-x.jsonl");
        std::fs::write(
            &path,
            "{\"step\":\"think:0\",\"output\":\"ok\"}\nnot json\n{\"step\":\"think:1\",\"output\":\"fine\"}\n",
        )
        .unwrap();

        let log = StepLog::open(tmp.path(), "run-x").unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(*log.get("think:1").unwrap(), serde_json::json!("fine"));
    }

    #[test]
    fn child_run_ids_create_subdirectories() {
        let tmp = TempDir::new().unwrap();
        let mut log = StepLog::open(tmp.path(), "parent/sub-0").unwrap();
        log.record("think:0", serde_json::json!(null)).unwrap();
        assert!(tmp.path().join("parent").join("sub-0.jsonl").exists());
    }
}
