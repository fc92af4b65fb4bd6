//! Session store (C16): transcript append/load, override state, group index.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::types::{SessionKey, SessionState, TranscriptEntry};

/// Owns per-session override state (in memory), the `group_id → sessions`
/// index, and append-only JSONL transcripts on disk under
/// `<workspace>/sessions/<session_key>.jsonl` (§6 Persisted state layout).
pub struct SessionStore {
    sessions_dir: PathBuf,
    overrides: DashMap<SessionKey, SessionState>,
    groups: DashMap<String, Vec<SessionKey>>,
    append_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(workspace_dir: impl AsRef<Path>) -> Result<Self> {
        let sessions_dir = workspace_dir.as_ref().join("sessions");
        std::fs::create_dir_all(&sessions_dir)?;
        Ok(Self {
            sessions_dir,
            overrides: DashMap::new(),
            groups: DashMap::new(),
            append_lock: Mutex::new(()),
        })
    }

    fn transcript_path(&self, key: &SessionKey) -> PathBuf {
        self.sessions_dir.join(format!("{}.jsonl", key.format()))
    }

    /// Return the existing override state, or a freshly-initialized one.
    pub fn get_or_create_override(&self, key: &SessionKey) -> SessionState {
        self.overrides
            .entry(key.clone())
            .or_insert_with(|| SessionState::new(key))
            .clone()
    }

    pub fn get_override(&self, key: &SessionKey) -> Option<SessionState> {
        self.overrides.get(key).map(|entry| entry.clone())
    }

    /// Replace the override state for `key`, re-indexing `group_id` if it
    /// changed (`session.override.set`, §4.10).
    #[instrument(skip(self, state), fields(key = %key))]
    pub fn set_override(&self, key: &SessionKey, mut state: SessionState) {
        let old_group = self.overrides.get(key).and_then(|s| s.group_id.clone());
        state.updated_at = chrono::Utc::now().to_rfc3339();
        let new_group = state.group_id.clone();
        self.overrides.insert(key.clone(), state);

        if old_group != new_group {
            if let Some(old) = old_group {
                self.remove_from_group(&old, key);
            }
            if let Some(new) = new_group {
                self.groups.entry(new).or_default().push(key.clone());
            }
        }
        debug!("session override updated");
    }

    fn remove_from_group(&self, group_id: &str, key: &SessionKey) {
        if let Some(mut members) = self.groups.get_mut(group_id) {
            members.retain(|k| k != key);
        }
    }

    /// Enumerate sessions tagged with `group_id` (`session.group.list`, §4.10).
    pub fn list_by_group(&self, group_id: &str) -> Vec<SessionKey> {
        self.groups.get(group_id).map(|m| m.clone()).unwrap_or_default()
    }

    /// Enumerate every session with override state on record — i.e. every
    /// session that has been touched at least once (`session.list`, §4.10).
    pub fn list_all(&self) -> Vec<SessionKey> {
        self.overrides.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Append one transcript entry. Writes are serialized by a single lock
    /// since the per-session lane (C19) already guarantees at most one
    /// writer per session at a time; the lock only protects concurrent
    /// sessions sharing this store.
    #[instrument(skip(self, entry), fields(key = %key))]
    pub fn append_transcript(&self, key: &SessionKey, entry: &TranscriptEntry) -> Result<()> {
        let _guard = self.append_lock.lock().expect("append lock poisoned");
        let path = self.transcript_path(key);
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Load up to `limit` most-recent transcript entries (0 = unbounded).
    /// Malformed lines are skipped rather than failing the whole read,
    /// matching the tolerant-reader rule in §6.
    pub fn load_transcript(&self, key: &SessionKey, limit: usize) -> Result<Vec<TranscriptEntry>> {
        let path = self.transcript_path(key);
        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries: Vec<TranscriptEntry> = BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();

        if limit > 0 && entries.len() > limit {
            entries = entries.split_off(entries.len() - limit);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn key() -> SessionKey {
        SessionKey::new("ghostclaw", "webhook", "alice")
    }

    #[test]
    fn appends_and_loads_transcript_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let k = key();
        store.append_transcript(&k, &TranscriptEntry::new(Role::User, "hi")).unwrap();
        store.append_transcript(&k, &TranscriptEntry::new(Role::Assistant, "hello")).unwrap();

        let loaded = store.load_transcript(&k, 0).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content, "hi");
        assert_eq!(loaded[1].content, "hello");
    }

    #[test]
    fn load_respects_limit_keeping_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let k = key();
        for i in 0..5 {
            store
                .append_transcript(&k, &TranscriptEntry::new(Role::User, format!("msg-{i}")))
                .unwrap();
        }
        let loaded = store.load_transcript(&k, 2).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content, "msg-3");
        assert_eq!(loaded[1].content, "msg-4");
    }

    #[test]
    fn missing_transcript_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        assert!(store.load_transcript(&key(), 0).unwrap().is_empty());
    }

    #[test]
    fn group_index_tracks_membership_across_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let k = key();
        let mut state = store.get_or_create_override(&k);
        state.group_id = Some("family".to_string());
        store.set_override(&k, state.clone());
        assert_eq!(store.list_by_group("family"), vec![k.clone()]);

        state.group_id = Some("work".to_string());
        store.set_override(&k, state);
        assert!(store.list_by_group("family").is_empty());
        assert_eq!(store.list_by_group("work"), vec![k]);
    }

    #[test]
    fn list_all_returns_every_touched_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let a = SessionKey::new("ghostclaw", "webhook", "alice");
        let b = SessionKey::new("ghostclaw", "webhook", "bob");
        store.get_or_create_override(&a);
        store.get_or_create_override(&b);
        let mut all = store.list_all();
        all.sort_by_key(|k| k.peer_id.clone());
        assert_eq!(all, vec![a, b]);
    }
}
