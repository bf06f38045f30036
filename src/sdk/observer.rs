// SPDX-License-Identifier: MIT

//! Execution events and the observers that receive them
//!
//! The engine never logs through a global directly; it reports to the observer
//! it was constructed with. `LogObserver` forwards to the `log` facade and
//! `ChannelObserver` feeds an mpsc channel for streaming surfaces.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStarted {
        session_id: String,
        entry: String,
    },
    RunResumed {
        session_id: String,
        from_sequence: u64,
        after_step: String,
    },
    StepStarted {
        session_id: String,
        step: String,
    },
    StepCompleted {
        session_id: String,
        step: String,
        changed: Vec<String>,
    },
    CheckpointWritten {
        session_id: String,
        step: String,
        sequence: u64,
    },
    StepFailed {
        session_id: String,
        step: String,
        error: String,
    },
    RunCompleted {
        session_id: String,
        steps_executed: usize,
    },
}

impl ExecutionEvent {
    /// Same value as the serialized `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::RunResumed { .. } => "run_resumed",
            Self::StepStarted { .. } => "step_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::CheckpointWritten { .. } => "checkpoint_written",
            Self::StepFailed { .. } => "step_failed",
            Self::RunCompleted { .. } => "run_completed",
        }
    }
}

/// Receives execution events from the engine
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Forwards execution events to the `log` facade
#[derive(Debug, Default, Clone)]
pub struct LogObserver;

impl ExecutionObserver for LogObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::RunStarted { session_id, entry } => {
                log::info!("Session {}: starting at step '{}'", session_id, entry);
            }
            ExecutionEvent::RunResumed {
                session_id,
                from_sequence,
                after_step,
            } => {
                log::info!(
                    "Session {}: resuming from checkpoint {} after step '{}'",
                    session_id,
                    from_sequence,
                    after_step
                );
            }
            ExecutionEvent::StepStarted { session_id, step } => {
                log::info!("Session {}: executing step '{}'", session_id, step);
            }
            ExecutionEvent::StepCompleted {
                session_id,
                step,
                changed,
            } => {
                log::debug!(
                    "Session {}: step '{}' changed {:?}",
                    session_id,
                    step,
                    changed
                );
            }
            ExecutionEvent::CheckpointWritten {
                session_id,
                step,
                sequence,
            } => {
                log::info!(
                    "Session {}: checkpoint {} written after '{}'",
                    session_id,
                    sequence,
                    step
                );
            }
            ExecutionEvent::StepFailed {
                session_id,
                step,
                error,
            } => {
                log::error!("Session {}: step '{}' failed: {}", session_id, step, error);
            }
            ExecutionEvent::RunCompleted {
                session_id,
                steps_executed,
            } => {
                log::info!(
                    "Session {}: completed ({} steps executed)",
                    session_id,
                    steps_executed
                );
            }
        }
    }
}

/// Sends execution events into a channel, logging them as well
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
        Self { tx }
    }
}

impl ExecutionObserver for ChannelObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        LogObserver.on_event(event);
        // Receiver gone means nobody is listening anymore
        let _ = self.tx.send(event.clone());
    }
}
