// SPDX-License-Identifier: MIT

//! In-memory checkpoint store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::retention::{self, KeepAll, RetentionPolicy};
use super::{Checkpoint, CheckpointStore, History};
use crate::sdk::error::CheckpointError;
use crate::stepflow::workflow::state::{PartialState, StateRecord};

type SessionLog = Arc<Mutex<Vec<Arc<Checkpoint>>>>;

/// Checkpoint store backed by process memory.
///
/// Each session owns its own mutex-guarded log, so writes to one session are
/// serialized while other sessions proceed independently. Cloning the store
/// shares the same underlying logs.
#[derive(Clone)]
pub struct MemoryCheckpointStore {
    sessions: Arc<RwLock<HashMap<String, SessionLog>>>,
    retention: Arc<dyn RetentionPolicy>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::with_retention(Arc::new(KeepAll))
    }

    pub fn with_retention(retention: Arc<dyn RetentionPolicy>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    async fn existing(&self, session_id: &str) -> Option<SessionLog> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    async fn session(&self, session_id: &str) -> SessionLog {
        if let Some(log) = self.existing(session_id).await {
            return log;
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    fn append(
        &self,
        entries: &mut Vec<Arc<Checkpoint>>,
        session_id: &str,
        step_name: &str,
        manual: bool,
        state: StateRecord,
    ) -> u64 {
        let checkpoint = Checkpoint::following(
            entries.last().map(|c| c.as_ref()),
            session_id,
            step_name,
            manual,
            state,
        );
        let sequence = checkpoint.sequence;
        entries.push(Arc::new(checkpoint));

        let removed = retention::apply(self.retention.as_ref(), entries);
        if removed > 0 {
            log::debug!("Session {}: pruned {} checkpoints", session_id, removed);
        }
        sequence
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn put(
        &self,
        session_id: &str,
        snapshot: StateRecord,
        step_name: &str,
    ) -> Result<u64, CheckpointError> {
        let log = self.session(session_id).await;
        let mut entries = log.lock().await;
        Ok(self.append(&mut entries, session_id, step_name, false, snapshot))
    }

    async fn get_latest(
        &self,
        session_id: &str,
    ) -> Result<Option<Arc<Checkpoint>>, CheckpointError> {
        let Some(log) = self.existing(session_id).await else {
            return Ok(None);
        };
        let entries = log.lock().await;
        Ok(entries.last().cloned())
    }

    async fn get_history(&self, session_id: &str) -> Result<History, CheckpointError> {
        let Some(log) = self.existing(session_id).await else {
            return Ok(History::default());
        };
        let entries = log.lock().await;
        Ok(History::from_oldest_first(entries.clone()))
    }

    async fn update_state(
        &self,
        session_id: &str,
        overrides: PartialState,
        as_step: &str,
    ) -> Result<u64, CheckpointError> {
        let log = self
            .existing(session_id)
            .await
            .ok_or_else(|| CheckpointError::SessionNotFound(session_id.to_string()))?;

        // Read and append under one lock so no step checkpoint slips in between
        let mut entries = log.lock().await;
        let merged = entries
            .last()
            .map(|latest| latest.state.merged(overrides))
            .ok_or_else(|| CheckpointError::SessionNotFound(session_id.to_string()))?;

        Ok(self.append(&mut entries, session_id, as_step, true, merged))
    }

    async fn sessions(&self) -> Result<Vec<String>, CheckpointError> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn prune(&self, session_id: &str) -> Result<usize, CheckpointError> {
        let Some(log) = self.existing(session_id).await else {
            return Ok(0);
        };
        let mut entries = log.lock().await;
        Ok(retention::apply(self.retention.as_ref(), &mut entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepflow::checkpoint::KeepLast;
    use serde_json::json;

    fn state(pairs: &[(&str, serde_json::Value)]) -> StateRecord {
        pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    #[tokio::test]
    async fn test_put_assigns_consecutive_sequences() {
        let store = MemoryCheckpointStore::new();

        assert_eq!(store.put("s1", state(&[]), "a").await.unwrap(), 1);
        assert_eq!(store.put("s1", state(&[]), "b").await.unwrap(), 2);
        assert_eq!(store.put("s2", state(&[]), "a").await.unwrap(), 1);
        assert_eq!(store.put("s1", state(&[]), "c").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_get_latest_unknown_session_is_none() {
        let store = MemoryCheckpointStore::new();
        assert!(store.get_latest("missing").await.unwrap().is_none());
        assert!(store.get_history("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_latest_returns_highest_sequence() {
        let store = MemoryCheckpointStore::new();
        store
            .put("s1", state(&[("count", json!(1))]), "load")
            .await
            .unwrap();
        store
            .put("s1", state(&[("count", json!(2))]), "process")
            .await
            .unwrap();

        let latest = store.get_latest("s1").await.unwrap().unwrap();
        assert_eq!(latest.sequence, 2);
        assert_eq!(latest.parent_sequence, Some(1));
        assert_eq!(latest.step_name, "process");
        assert!(!latest.manual);
        assert_eq!(latest.state.get("count"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_history_is_descending_and_repeatable() {
        let store = MemoryCheckpointStore::new();
        for step in ["a", "b", "c", "d"] {
            store.put("s1", state(&[]), step).await.unwrap();
        }

        let first = store.get_history("s1").await.unwrap();
        let second = store.get_history("s1").await.unwrap();

        assert_eq!(first.len(), 4);
        assert_eq!(first.sequences(), vec![4, 3, 2, 1]);
        assert_eq!(first.sequences(), second.sequences());
    }

    #[tokio::test]
    async fn test_history_is_a_snapshot() {
        let store = MemoryCheckpointStore::new();
        store.put("s1", state(&[]), "a").await.unwrap();

        let history = store.get_history("s1").await.unwrap();
        store.put("s1", state(&[]), "b").await.unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(store.get_history("s1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_state_merges_and_marks_manual() {
        let store = MemoryCheckpointStore::new();
        store
            .put(
                "s1",
                state(&[("total_count", json!(1)), ("notes", json!(["start"]))]),
                "process_batch",
            )
            .await
            .unwrap();

        let seq = store
            .update_state(
                "s1",
                PartialState::new().with("total_count", json!(5)),
                "process_batch",
            )
            .await
            .unwrap();

        assert_eq!(seq, 2);
        let latest = store.get_latest("s1").await.unwrap().unwrap();
        assert!(latest.manual);
        assert_eq!(latest.step_name, "process_batch");
        assert_eq!(latest.state.get("total_count"), Some(&json!(5)));
        assert_eq!(latest.state.get("notes"), Some(&json!(["start"])));
    }

    #[tokio::test]
    async fn test_update_state_unknown_session() {
        let store = MemoryCheckpointStore::new();
        let err = store
            .update_state("ghost", PartialState::new(), "a")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::SessionNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_concurrent_puts_same_session_have_no_gaps() {
        let store = Arc::new(MemoryCheckpointStore::new());

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .put("shared", state(&[("i", json!(i))]), "step")
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut seqs = Vec::new();
        for handle in handles {
            seqs.push(handle.await.unwrap());
        }
        seqs.sort();
        assert_eq!(seqs, (1..=50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_retention_keeps_numbering() {
        let store = MemoryCheckpointStore::with_retention(Arc::new(KeepLast(2)));
        for step in ["a", "b", "c", "d"] {
            store.put("s1", state(&[]), step).await.unwrap();
        }

        assert_eq!(store.get_history("s1").await.unwrap().sequences(), vec![4, 3]);
        assert_eq!(store.put("s1", state(&[]), "e").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_sessions_are_sorted() {
        let store = MemoryCheckpointStore::new();
        store.put("zeta", state(&[]), "a").await.unwrap();
        store.put("alpha", state(&[]), "a").await.unwrap();

        assert_eq!(store.sessions().await.unwrap(), vec!["alpha", "zeta"]);
    }
}
