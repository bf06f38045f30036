// SPDX-License-Identifier: MIT

//! JSON Lines checkpoint store
//!
//! One file per session under a base directory, one checkpoint per line.
//! File names are derived from the session id (UUID v5), so arbitrary session
//! strings are safe; the session id itself is stored in every record.
//!
//! The store assumes it is the only writer of its directory. The latest
//! checkpoint of each session is cached after the first access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::retention::{self, KeepAll, RetentionPolicy};
use super::{Checkpoint, CheckpointStore, History};
use crate::sdk::error::CheckpointError;
use crate::stepflow::workflow::state::{PartialState, StateRecord};

type LatestSlot = Arc<Mutex<Option<Arc<Checkpoint>>>>;

/// Durable checkpoint store writing JSONL files
pub struct FileCheckpointStore {
    dir: PathBuf,
    slots: Mutex<HashMap<String, LatestSlot>>,
    retention: Arc<dyn RetentionPolicy>,
}

impl FileCheckpointStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        Self::open_with_retention(dir, Arc::new(KeepAll)).await
    }

    pub async fn open_with_retention(
        dir: impl Into<PathBuf>,
        retention: Arc<dyn RetentionPolicy>,
    ) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        log::debug!("Checkpoint directory: {}", dir.display());
        Ok(Self {
            dir,
            slots: Mutex::new(HashMap::new()),
            retention,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        let name = Uuid::new_v5(&Uuid::NAMESPACE_OID, session_id.as_bytes());
        self.dir.join(format!("{}.jsonl", name))
    }

    async fn slot(&self, session_id: &str) -> LatestSlot {
        let mut slots = self.slots.lock().await;
        slots
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Slot for a read; `None` when the session has neither a slot nor a file
    async fn existing_slot(
        &self,
        session_id: &str,
    ) -> Result<Option<LatestSlot>, CheckpointError> {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get(session_id) {
            return Ok(Some(slot.clone()));
        }
        let exists = fs::try_exists(self.session_path(session_id))
            .await
            .map_err(|e| CheckpointError::read(session_id, e))?;
        if !exists {
            return Ok(None);
        }
        let slot = slots
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        Ok(Some(slot))
    }

    /// Read every checkpoint of a session, oldest first.
    /// The flag reports a torn final line left behind by an interrupted write.
    async fn read_log(
        &self,
        session_id: &str,
    ) -> Result<(Vec<Arc<Checkpoint>>, bool), CheckpointError> {
        let path = self.session_path(session_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((Vec::new(), false));
            }
            Err(e) => return Err(CheckpointError::read(session_id, e)),
        };

        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut entries = Vec::with_capacity(lines.len());
        let mut torn = false;

        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str::<Checkpoint>(line) {
                Ok(checkpoint) => entries.push(Arc::new(checkpoint)),
                Err(e) if i + 1 == lines.len() && !content.ends_with('\n') => {
                    log::warn!(
                        "Session {}: ignoring incomplete trailing checkpoint: {}",
                        session_id,
                        e
                    );
                    torn = true;
                }
                Err(e) => {
                    return Err(CheckpointError::read(
                        session_id,
                        format!("line {}: {}", i + 1, e),
                    ));
                }
            }
        }

        Ok((entries, torn))
    }

    /// Replace a session file with the given entries
    async fn rewrite(
        &self,
        session_id: &str,
        entries: &[Arc<Checkpoint>],
    ) -> Result<(), CheckpointError> {
        let path = self.session_path(session_id);
        let tmp = path.with_extension("jsonl.tmp");

        let mut body = String::new();
        for checkpoint in entries {
            body.push_str(&serde_json::to_string(checkpoint.as_ref())?);
            body.push('\n');
        }

        fs::write(&tmp, body)
            .await
            .map_err(|e| CheckpointError::write(session_id, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| CheckpointError::write(session_id, e))
    }

    /// Fill the cached latest checkpoint from disk if it is not loaded yet
    async fn load_latest(
        &self,
        session_id: &str,
        cached: &mut Option<Arc<Checkpoint>>,
    ) -> Result<(), CheckpointError> {
        if cached.is_some() {
            return Ok(());
        }
        let (entries, torn) = self.read_log(session_id).await?;
        if torn {
            self.rewrite(session_id, &entries).await?;
        }
        *cached = entries.last().cloned();
        Ok(())
    }

    /// Append one record. A failed write is rolled back to the previous file
    /// length and drops the cached latest, so the next access re-reads the log.
    async fn append(
        &self,
        session_id: &str,
        cached: &mut Option<Arc<Checkpoint>>,
        step_name: &str,
        manual: bool,
        state: StateRecord,
    ) -> Result<u64, CheckpointError> {
        let checkpoint = Arc::new(Checkpoint::following(
            cached.as_deref(),
            session_id,
            step_name,
            manual,
            state,
        ));

        let mut line = serde_json::to_string(checkpoint.as_ref())?;
        line.push('\n');

        let path = self.session_path(session_id);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CheckpointError::write(session_id, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| CheckpointError::write(session_id, e))?
            .len();

        if let Err(e) = write_line(&mut file, &line).await {
            *cached = None;
            if let Err(rollback) = file.set_len(len).await {
                log::warn!(
                    "Session {}: could not roll back failed append: {}",
                    session_id,
                    rollback
                );
            }
            return Err(CheckpointError::write(session_id, e));
        }

        let sequence = checkpoint.sequence;
        *cached = Some(checkpoint);

        if !self.retention.keeps_everything() {
            self.prune_locked(session_id).await?;
        }
        Ok(sequence)
    }

    async fn prune_locked(&self, session_id: &str) -> Result<usize, CheckpointError> {
        let (mut entries, _) = self.read_log(session_id).await?;
        let removed = retention::apply(self.retention.as_ref(), &mut entries);
        if removed > 0 {
            self.rewrite(session_id, &entries).await?;
            log::debug!("Session {}: pruned {} checkpoints", session_id, removed);
        }
        Ok(removed)
    }
}

async fn write_line(file: &mut fs::File, line: &str) -> std::io::Result<()> {
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn put(
        &self,
        session_id: &str,
        snapshot: StateRecord,
        step_name: &str,
    ) -> Result<u64, CheckpointError> {
        let slot = self.slot(session_id).await;
        let mut cached = slot.lock().await;
        self.load_latest(session_id, &mut cached).await?;
        self.append(session_id, &mut cached, step_name, false, snapshot)
            .await
    }

    async fn get_latest(
        &self,
        session_id: &str,
    ) -> Result<Option<Arc<Checkpoint>>, CheckpointError> {
        let Some(slot) = self.existing_slot(session_id).await? else {
            return Ok(None);
        };
        let mut cached = slot.lock().await;
        self.load_latest(session_id, &mut cached).await?;
        Ok(cached.clone())
    }

    async fn get_history(&self, session_id: &str) -> Result<History, CheckpointError> {
        let Some(slot) = self.existing_slot(session_id).await? else {
            return Ok(History::default());
        };
        let _guard = slot.lock().await;
        let (entries, _) = self.read_log(session_id).await?;
        Ok(History::from_oldest_first(entries))
    }

    async fn update_state(
        &self,
        session_id: &str,
        overrides: PartialState,
        as_step: &str,
    ) -> Result<u64, CheckpointError> {
        let slot = self
            .existing_slot(session_id)
            .await?
            .ok_or_else(|| CheckpointError::SessionNotFound(session_id.to_string()))?;
        let mut cached = slot.lock().await;
        self.load_latest(session_id, &mut cached).await?;

        let merged = cached
            .as_ref()
            .map(|latest| latest.state.merged(overrides))
            .ok_or_else(|| CheckpointError::SessionNotFound(session_id.to_string()))?;

        self.append(session_id, &mut cached, as_step, true, merged)
            .await
    }

    async fn sessions(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| CheckpointError::read("*", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CheckpointError::read("*", e))?
        {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "jsonl") {
                continue;
            }
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| CheckpointError::read("*", e))?;
            if let Some(first) = content.lines().next() {
                match serde_json::from_str::<Checkpoint>(first) {
                    Ok(checkpoint) => ids.push(checkpoint.session_id),
                    Err(e) => log::warn!("Skipping unreadable log {}: {}", path.display(), e),
                }
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn prune(&self, session_id: &str) -> Result<usize, CheckpointError> {
        let Some(slot) = self.existing_slot(session_id).await? else {
            return Ok(0);
        };
        let _guard = slot.lock().await;
        self.prune_locked(session_id).await
    }
}
