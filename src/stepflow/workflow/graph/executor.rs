//! Checkpointing workflow executor

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::topology::CompiledGraph;
use crate::sdk::error::{ExecutionError, StepError};
use crate::sdk::observer::{ExecutionEvent, ExecutionObserver, LogObserver};
use crate::stepflow::checkpoint::{Checkpoint, CheckpointStore, History};
use crate::stepflow::workflow::state::{PartialState, StateRecord};

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum steps a single `run` call may execute on a cyclic graph
    pub max_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_steps: 100 }
    }
}

/// One async lock per session id.
///
/// `run` holds its session's lock until it returns and `update_state` takes
/// the same lock, so a session only ever has one writer. Clones share the
/// table, which lets several engines over one store exclude each other.
#[derive(Clone, Default)]
pub struct SessionLocks {
    table: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().await;
            table.entry(session_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Drives compiled graphs and persists a checkpoint after every step.
///
/// The engine holds no per-run state, so one instance can serve many sessions
/// concurrently. Sessions are isolated by id in the checkpoint store, and
/// calls on the same session are serialized through [`SessionLocks`].
pub struct Engine {
    store: Arc<dyn CheckpointStore>,
    observer: Arc<dyn ExecutionObserver>,
    config: EngineConfig,
    locks: SessionLocks,
}

impl Engine {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            observer: Arc::new(LogObserver),
            config: EngineConfig::default(),
            locks: SessionLocks::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share session exclusion with other engines over the same store
    pub fn with_session_locks(mut self, locks: SessionLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Run `graph` for `session_id`.
    ///
    /// A session with checkpoints resumes after the step its latest checkpoint
    /// names and ignores `initial_state`; a fresh session starts from
    /// `initial_state` (schema defaults filled in) at the entry step. A failing
    /// step leaves no checkpoint behind, so calling `run` again retries it.
    ///
    /// Only graphs compiled with `allow_cycles` are held to
    /// [`EngineConfig::max_steps`]; acyclic graphs always reach their end.
    pub async fn run(
        &self,
        graph: &CompiledGraph,
        initial_state: StateRecord,
        session_id: &str,
    ) -> Result<StateRecord, ExecutionError> {
        let _guard = self.locks.acquire(session_id).await;
        let limit = graph.options().allow_cycles.then_some(self.config.max_steps);

        let (mut state, mut current, mut last_sequence) =
            match self.store.get_latest(session_id).await? {
                Some(checkpoint) => {
                    let next = self.resume_point(graph, &checkpoint)?;
                    self.emit(ExecutionEvent::RunResumed {
                        session_id: session_id.to_string(),
                        from_sequence: checkpoint.sequence,
                        after_step: checkpoint.step_name.clone(),
                    });
                    (checkpoint.state.clone(), next, Some(checkpoint.sequence))
                }
                None => {
                    let mut state = initial_state;
                    graph.schema().apply_defaults(&mut state);
                    graph.schema().check_record(&state)?;
                    self.emit(ExecutionEvent::RunStarted {
                        session_id: session_id.to_string(),
                        entry: graph.entry().to_string(),
                    });
                    (state, Some(graph.entry()), None)
                }
            };

        let mut executed = 0;
        while let Some(step_name) = current {
            if let Some(limit) = limit.filter(|&limit| executed >= limit) {
                return Err(ExecutionError::StepLimitExceeded {
                    session_id: session_id.to_string(),
                    limit,
                });
            }

            let update = self
                .execute_step(graph, step_name, &state, session_id, last_sequence)
                .await?;
            let changed = state.merge(update);
            self.emit(ExecutionEvent::StepCompleted {
                session_id: session_id.to_string(),
                step: step_name.to_string(),
                changed,
            });

            let sequence = self
                .store
                .put(session_id, state.clone(), step_name)
                .await?;
            self.emit(ExecutionEvent::CheckpointWritten {
                session_id: session_id.to_string(),
                step: step_name.to_string(),
                sequence,
            });

            last_sequence = Some(sequence);
            executed += 1;
            current = graph.successor(step_name);
        }

        self.emit(ExecutionEvent::RunCompleted {
            session_id: session_id.to_string(),
            steps_executed: executed,
        });
        Ok(state)
    }

    /// Latest checkpoint of a session
    pub async fn get_state(
        &self,
        session_id: &str,
    ) -> Result<Option<Arc<Checkpoint>>, ExecutionError> {
        Ok(self.store.get_latest(session_id).await?)
    }

    /// Checkpoints of a session, newest first
    pub async fn get_history(&self, session_id: &str) -> Result<History, ExecutionError> {
        Ok(self.store.get_history(session_id).await?)
    }

    /// Step the next `run` of this session would execute first.
    /// `None` means the session has finished; unknown sessions start at the entry.
    pub async fn next_step(
        &self,
        graph: &CompiledGraph,
        session_id: &str,
    ) -> Result<Option<String>, ExecutionError> {
        match self.store.get_latest(session_id).await? {
            Some(checkpoint) => Ok(self
                .resume_point(graph, &checkpoint)?
                .map(|s| s.to_string())),
            None => Ok(Some(graph.entry().to_string())),
        }
    }

    /// Manually amend a session's state as if `as_step` had produced `overrides`.
    ///
    /// The step name must belong to `graph` and the overrides must satisfy its
    /// schema. The next `run` continues after `as_step`. Waits for any `run`
    /// in progress on the session to finish first.
    pub async fn update_state(
        &self,
        graph: &CompiledGraph,
        session_id: &str,
        overrides: PartialState,
        as_step: &str,
    ) -> Result<u64, ExecutionError> {
        if !graph.contains(as_step) {
            return Err(ExecutionError::UnknownStep(as_step.to_string()));
        }
        graph.schema().check_update(&overrides)?;

        let _guard = self.locks.acquire(session_id).await;
        let sequence = self
            .store
            .update_state(session_id, overrides, as_step)
            .await?;
        log::info!(
            "Session {}: manual update recorded as checkpoint {} (as '{}')",
            session_id,
            sequence,
            as_step
        );
        Ok(sequence)
    }

    fn resume_point<'g>(
        &self,
        graph: &'g CompiledGraph,
        checkpoint: &Checkpoint,
    ) -> Result<Option<&'g str>, ExecutionError> {
        if !graph.contains(&checkpoint.step_name) {
            return Err(ExecutionError::UnknownResumePoint {
                session_id: checkpoint.session_id.clone(),
                step: checkpoint.step_name.clone(),
            });
        }
        Ok(graph.successor(&checkpoint.step_name))
    }

    async fn execute_step(
        &self,
        graph: &CompiledGraph,
        step_name: &str,
        state: &StateRecord,
        session_id: &str,
        last_sequence: Option<u64>,
    ) -> Result<PartialState, ExecutionError> {
        let step = graph
            .step(step_name)
            .ok_or_else(|| ExecutionError::UnknownStep(step_name.to_string()))?;

        self.emit(ExecutionEvent::StepStarted {
            session_id: session_id.to_string(),
            step: step_name.to_string(),
        });

        let outcome = match step.run(state).await {
            Ok(update) => graph
                .schema()
                .check_update(&update)
                .map(|_| update)
                .map_err(StepError::from),
            Err(e) => Err(e),
        };

        outcome.map_err(|source| {
            self.emit(ExecutionEvent::StepFailed {
                session_id: session_id.to_string(),
                step: step_name.to_string(),
                error: source.to_string(),
            });
            ExecutionError::StepExecution {
                session_id: session_id.to_string(),
                step: step_name.to_string(),
                last_sequence,
                source,
            }
        })
    }

    fn emit(&self, event: ExecutionEvent) {
        self.observer.on_event(&event);
    }
}
