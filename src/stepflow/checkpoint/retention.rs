// SPDX-License-Identifier: MIT

//! Pluggable checkpoint retention policies

use chrono::{Duration, Utc};
use std::sync::Arc;

use super::Checkpoint;

/// Decides which checkpoints of a session may be discarded.
///
/// Stores call `expired` with the session's checkpoints ordered oldest first
/// and drop the returned sequence numbers. The newest checkpoint is never
/// dropped regardless of what a policy returns.
pub trait RetentionPolicy: Send + Sync {
    fn expired(&self, oldest_first: &[Arc<Checkpoint>]) -> Vec<u64>;

    /// True when the policy never expires anything, letting stores skip work
    fn keeps_everything(&self) -> bool {
        false
    }
}

/// Retain every checkpoint (the default)
#[derive(Debug, Default, Clone)]
pub struct KeepAll;

impl RetentionPolicy for KeepAll {
    fn expired(&self, _oldest_first: &[Arc<Checkpoint>]) -> Vec<u64> {
        Vec::new()
    }

    fn keeps_everything(&self) -> bool {
        true
    }
}

/// Retain only the newest `n` checkpoints (at least one)
#[derive(Debug, Clone)]
pub struct KeepLast(pub usize);

impl RetentionPolicy for KeepLast {
    fn expired(&self, oldest_first: &[Arc<Checkpoint>]) -> Vec<u64> {
        let keep = self.0.max(1);
        let excess = oldest_first.len().saturating_sub(keep);
        oldest_first[..excess].iter().map(|c| c.sequence).collect()
    }
}

/// Retain checkpoints younger than the given age
#[derive(Debug, Clone)]
pub struct MaxAge(pub Duration);

impl RetentionPolicy for MaxAge {
    fn expired(&self, oldest_first: &[Arc<Checkpoint>]) -> Vec<u64> {
        let cutoff = Utc::now() - self.0;
        oldest_first
            .iter()
            .filter(|c| c.timestamp < cutoff)
            .map(|c| c.sequence)
            .collect()
    }
}

/// Apply a policy to an ordered log, always keeping the newest entry.
/// Returns the number of checkpoints removed.
pub(crate) fn apply(policy: &dyn RetentionPolicy, entries: &mut Vec<Arc<Checkpoint>>) -> usize {
    if policy.keeps_everything() || entries.len() <= 1 {
        return 0;
    }

    let latest = entries.last().map(|c| c.sequence);
    let expired: Vec<u64> = policy
        .expired(entries)
        .into_iter()
        .filter(|seq| Some(*seq) != latest)
        .collect();

    let before = entries.len();
    entries.retain(|c| !expired.contains(&c.sequence));
    before - entries.len()
}
