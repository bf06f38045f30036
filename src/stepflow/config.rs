// SPDX-License-Identifier: MIT

//! Runtime configuration read from the environment (and `.env` via dotenv)

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::sdk::error::StepflowError;
use crate::stepflow::checkpoint::{
    CheckpointStore, FileCheckpointStore, KeepAll, KeepLast, MemoryCheckpointStore,
    RetentionPolicy,
};
use crate::stepflow::workflow::graph::EngineConfig;

pub const STORE_DIR_VAR: &str = "STEPFLOW_STORE_DIR";
pub const MAX_STEPS_VAR: &str = "STEPFLOW_MAX_STEPS";
pub const KEEP_LAST_VAR: &str = "STEPFLOW_KEEP_LAST";
pub const PORT_VAR: &str = "STEPFLOW_PORT";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory for the file backend; the in-memory store is used when unset
    pub store_dir: Option<PathBuf>,
    pub max_steps: usize,
    /// Keep only this many checkpoints per session
    pub keep_last: Option<usize>,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: None,
            max_steps: EngineConfig::default().max_steps,
            keep_last: None,
            port: 3000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, StepflowError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StepflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            store_dir: lookup(STORE_DIR_VAR)
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            max_steps: parse_var(&lookup, MAX_STEPS_VAR)?.unwrap_or(defaults.max_steps),
            keep_last: parse_var(&lookup, KEEP_LAST_VAR)?,
            port: parse_var(&lookup, PORT_VAR)?.unwrap_or(defaults.port),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but make no sense; call again after overrides
    pub fn validate(&self) -> Result<(), StepflowError> {
        if self.keep_last == Some(0) {
            return Err(StepflowError::config(format!(
                "{} (--keep-last) must be at least 1",
                KEEP_LAST_VAR
            )));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_steps: self.max_steps,
        }
    }

    pub fn retention(&self) -> Arc<dyn RetentionPolicy> {
        match self.keep_last {
            Some(n) => Arc::new(KeepLast(n)),
            None => Arc::new(KeepAll),
        }
    }

    /// Open the configured checkpoint store
    pub async fn open_store(&self) -> Result<Arc<dyn CheckpointStore>, StepflowError> {
        match &self.store_dir {
            Some(dir) => {
                let store = FileCheckpointStore::open_with_retention(dir, self.retention()).await?;
                log::info!("Using file checkpoint store at {}", dir.display());
                Ok(Arc::new(store))
            }
            None => {
                log::info!("Using in-memory checkpoint store");
                Ok(Arc::new(MemoryCheckpointStore::with_retention(
                    self.retention(),
                )))
            }
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, StepflowError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StepflowError::config(format!("{} has invalid value '{}'", key, raw))),
    }
}
