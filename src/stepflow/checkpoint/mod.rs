// SPDX-License-Identifier: MIT

//! Checkpoint persistence
//!
//! A checkpoint is an immutable, sequence-numbered snapshot of the fully merged
//! state of one session, taken after a step completes (or after a manual
//! update). Stores are append-only per session: sequence numbers start at 1,
//! grow by one per write, and are never reused, even after retention pruning.

mod file;
mod memory;
pub mod retention;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;
pub use retention::{KeepAll, KeepLast, MaxAge, RetentionPolicy};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::sdk::error::CheckpointError;
use crate::stepflow::workflow::state::{PartialState, StateRecord};

/// Persisted snapshot of a session's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub session_id: String,
    #[serde(rename = "sequence_number")]
    pub sequence: u64,
    /// Sequence number of the previous checkpoint in this session
    pub parent_sequence: Option<u64>,
    /// Step just executed, or the step a manual update is attributed to
    pub step_name: String,
    /// True when written by a manual update instead of a step
    #[serde(default)]
    pub manual: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "state_snapshot")]
    pub state: StateRecord,
}

impl Checkpoint {
    /// Build the checkpoint that follows `previous` in a session log
    pub(crate) fn following(
        previous: Option<&Checkpoint>,
        session_id: &str,
        step_name: &str,
        manual: bool,
        state: StateRecord,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            sequence: previous.map(|p| p.sequence + 1).unwrap_or(1),
            parent_sequence: previous.map(|p| p.sequence),
            step_name: step_name.to_string(),
            manual,
            timestamp: Utc::now(),
            state,
        }
    }
}

/// Checkpoints of one session, newest first.
///
/// A history is a snapshot of the store's contents at call time; iterate it as
/// often as needed, or call `get_history` again to observe newer writes.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<Arc<Checkpoint>>,
}

impl History {
    pub(crate) fn from_oldest_first(mut entries: Vec<Arc<Checkpoint>>) -> Self {
        entries.reverse();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&Arc<Checkpoint>> {
        self.entries.first()
    }

    /// Iterate newest first
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Checkpoint>> {
        self.entries.iter()
    }

    /// Sequence numbers, newest first
    pub fn sequences(&self) -> Vec<u64> {
        self.entries.iter().map(|c| c.sequence).collect()
    }
}

impl IntoIterator for History {
    type Item = Arc<Checkpoint>;
    type IntoIter = std::vec::IntoIter<Arc<Checkpoint>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Arc<Checkpoint>;
    type IntoIter = std::slice::Iter<'a, Arc<Checkpoint>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Append-only, session-keyed log of state snapshots.
///
/// Implementations serialize writes per session so concurrent `put`s for the
/// same session get consecutive sequence numbers, while different sessions
/// never block each other beyond a brief map lookup.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Append a checkpoint and return its sequence number
    async fn put(
        &self,
        session_id: &str,
        snapshot: StateRecord,
        step_name: &str,
    ) -> Result<u64, CheckpointError>;

    /// Newest checkpoint of a session, `None` if the session is unknown
    async fn get_latest(
        &self,
        session_id: &str,
    ) -> Result<Option<Arc<Checkpoint>>, CheckpointError>;

    /// All retained checkpoints of a session, newest first
    async fn get_history(&self, session_id: &str) -> Result<History, CheckpointError>;

    /// Merge `overrides` into the latest snapshot and append the result as a
    /// manual checkpoint attributed to `as_step`. No step function runs.
    async fn update_state(
        &self,
        session_id: &str,
        overrides: PartialState,
        as_step: &str,
    ) -> Result<u64, CheckpointError>;

    /// Known session ids
    async fn sessions(&self) -> Result<Vec<String>, CheckpointError>;

    /// Apply the retention policy to a session now; returns how many were removed
    async fn prune(&self, session_id: &str) -> Result<usize, CheckpointError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_following_numbers_from_one() {
        let first = Checkpoint::following(None, "s1", "load", false, StateRecord::new());
        assert_eq!(first.sequence, 1);
        assert_eq!(first.parent_sequence, None);

        let second =
            Checkpoint::following(Some(&first), "s1", "process", true, StateRecord::new());
        assert_eq!(second.sequence, 2);
        assert_eq!(second.parent_sequence, Some(1));
        assert!(second.manual);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_checkpoint_record_layout() {
        let mut state = StateRecord::new();
        state.set("count", json!(2));
        let cp = Checkpoint::following(None, "s1", "load", false, state);

        let value = serde_json::to_value(&cp).unwrap();
        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["sequence_number"], 1);
        assert_eq!(value["step_name"], "load");
        assert_eq!(value["manual"], false);
        assert_eq!(value["state_snapshot"], json!({"count": 2}));
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_history_is_newest_first_and_repeatable() {
        let a = Arc::new(Checkpoint::following(
            None,
            "s1",
            "a",
            false,
            StateRecord::new(),
        ));
        let b = Arc::new(Checkpoint::following(
            Some(a.as_ref()),
            "s1",
            "b",
            false,
            StateRecord::new(),
        ));
        let history = History::from_oldest_first(vec![a, b]);

        assert_eq!(history.sequences(), vec![2, 1]);
        assert_eq!(history.latest().unwrap().step_name, "b");

        let first_pass: Vec<u64> = history.iter().map(|c| c.sequence).collect();
        let second_pass: Vec<u64> = (&history).into_iter().map(|c| c.sequence).collect();
        assert_eq!(first_pass, second_pass);
    }
}
