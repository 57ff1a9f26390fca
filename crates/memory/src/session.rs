//! Session store — append-only JSONL conversation logs.
//!
//! One file per session key under `sessions/`. Appends create the parent
//! directory on demand; loads tolerate a missing file (empty history) and
//! skip malformed lines with a warning. The only in-place mutation is the
//! compactor's atomic rewrite (temp file + rename).
//!
//! Callers serialize writes per key through the session supervisor, so
//! the store itself only relies on file-append atomicity.

use everclaw_core::error::SessionError;
use everclaw_core::session::{SessionKey, SessionRecord, SessionRole, TurnMetadata};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// File-backed session store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at `sessions_dir`. The directory is created
    /// lazily on first append.
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Path of the JSONL file for one session key.
    pub fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.sessions_dir.join(format!("{}.jsonl", key.as_str()))
    }

    /// Append one record to the session.
    pub async fn append(
        &self,
        key: &SessionKey,
        role: SessionRole,
        content: &str,
        metadata: Option<TurnMetadata>,
    ) -> Result<(), SessionError> {
        let record = SessionRecord {
            role,
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
            metadata,
        };
        self.append_record(key, &record).await
    }

    /// Append a pre-built record (used by tests that need fixed timestamps).
    pub async fn append_record(
        &self,
        key: &SessionKey,
        record: &SessionRecord,
    ) -> Result<(), SessionError> {
        fs::create_dir_all(&self.sessions_dir)
            .await
            .map_err(|e| SessionError::Storage(format!("create sessions dir: {e}")))?;

        let mut line = serde_json::to_string(record)
            .map_err(|e| SessionError::Storage(format!("serialize record: {e}")))?;
        line.push('\n');

        let path = self.path_for(key);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| SessionError::Storage(format!("open {}: {e}", path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| SessionError::Storage(format!("append {}: {e}", path.display())))?;

        Ok(())
    }

    /// Load the last `max_messages` records in insertion order.
    ///
    /// A missing file is an empty history, not an error. Malformed lines
    /// are skipped; one bad line never aborts the load.
    pub async fn load(
        &self,
        key: &SessionKey,
        max_messages: usize,
    ) -> Result<Vec<SessionRecord>, SessionError> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SessionError::Storage(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };

        let mut records: Vec<SessionRecord> = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<SessionRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(session = %key, error = %e, "Skipping malformed session line"),
            }
        }

        if records.len() > max_messages {
            records.drain(..records.len() - max_messages);
        }
        Ok(records)
    }

    /// Atomically replace the session's contents. Used only by compaction.
    pub async fn rewrite(
        &self,
        key: &SessionKey,
        records: &[SessionRecord],
    ) -> Result<(), SessionError> {
        fs::create_dir_all(&self.sessions_dir)
            .await
            .map_err(|e| SessionError::Storage(format!("create sessions dir: {e}")))?;

        let mut content = String::new();
        for record in records {
            let line = serde_json::to_string(record).map_err(|e| SessionError::RewriteFailed {
                key: key.to_string(),
                reason: format!("serialize record: {e}"),
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        // Temp file in the same directory so the rename stays on one
        // filesystem and is atomic.
        let path = self.path_for(key);
        let tmp = self
            .sessions_dir
            .join(format!(".{}.tmp-{}", key.as_str(), uuid::Uuid::new_v4()));
        fs::write(&tmp, &content)
            .await
            .map_err(|e| SessionError::RewriteFailed {
                key: key.to_string(),
                reason: format!("write temp file: {e}"),
            })?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| SessionError::RewriteFailed {
                key: key.to_string(),
                reason: format!("rename temp file: {e}"),
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, SessionStore) {
        let tmp = TempDir::new().unwrap();
        let store = SessionStore::new(tmp.path().join("sessions"));
        (tmp, store)
    }

    #[tokio::test]
    async fn missing_session_loads_empty() {
        let (_tmp, store) = store();
        let records = store.load(&SessionKey::new("absent"), 10).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn append_preserves_insertion_order_and_monotonic_timestamps() {
        let (_tmp, store) = store();
        let key = SessionKey::new("c1");

        for i in 0..5 {
            store
                .append(&key, SessionRole::User, &format!("msg {i}"), None)
                .await
                .unwrap();
        }

        let records = store.load(&key, 100).await.unwrap();
        assert_eq!(records.len(), 5);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.content, format!("msg {i}"));
        }
        for pair in records.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn load_returns_only_the_tail() {
        let (_tmp, store) = store();
        let key = SessionKey::new("c1");
        for i in 0..20 {
            store
                .append(&key, SessionRole::User, &format!("msg {i}"), None)
                .await
                .unwrap();
        }

        let records = store.load(&key, 10).await.unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(records[0].content, "msg 10");
        assert_eq!(records[9].content, "msg 19");
    }

    #[tokio::test]
    async fn malformed_line_is_skipped() {
        let (_tmp, store) = store();
        let key = SessionKey::new("c1");
        store.append(&key, SessionRole::User, "good", None).await.unwrap();

        // Corrupt the file by hand
        let path = store.path_for(&key);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{ this is not json\n");
        std::fs::write(&path, content).unwrap();

        store
            .append(&key, SessionRole::Assistant, "also good", None)
            .await
            .unwrap();

        let records = store.load(&key, 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].content, "also good");
    }

    #[tokio::test]
    async fn rewrite_replaces_contents_atomically() {
        let (_tmp, store) = store();
        let key = SessionKey::new("c1");
        for i in 0..4 {
            store
                .append(&key, SessionRole::User, &format!("old {i}"), None)
                .await
                .unwrap();
        }

        let replacement = vec![
            SessionRecord::new(SessionRole::User, "summary"),
            SessionRecord::new(SessionRole::Assistant, "kept"),
        ];
        store.rewrite(&key, &replacement).await.unwrap();

        let records = store.load(&key, 100).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content, "summary");

        // No temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(store.sessions_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_key() {
        let (_tmp, store) = store();
        store
            .append(&SessionKey::new("a"), SessionRole::User, "for a", None)
            .await
            .unwrap();
        store
            .append(&SessionKey::new("b"), SessionRole::User, "for b", None)
            .await
            .unwrap();

        let a = store.load(&SessionKey::new("a"), 10).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].content, "for a");
    }
}
