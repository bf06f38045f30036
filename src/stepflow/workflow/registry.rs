// SPDX-License-Identifier: MIT

use crate::sdk::step::Step;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// User-provided steps that YAML definitions bind by name
#[derive(Clone)]
pub struct StepRegistry {
    steps: Arc<RwLock<HashMap<String, Arc<dyn Step>>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            steps: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a step under its own name. Returns the step it replaced, if any.
    pub async fn register(&self, step: Arc<dyn Step>) -> Option<Arc<dyn Step>> {
        let mut steps = self.steps.write().await;
        let previous = steps.insert(step.name().to_string(), step);
        if let Some(replaced) = &previous {
            log::warn!("Step '{}' registered twice; replacing", replaced.name());
        }
        previous
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Step>> {
        let steps = self.steps.read().await;
        steps.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let steps = self.steps.read().await;
        let mut names: Vec<String> = steps.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
