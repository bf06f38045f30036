// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::sdk::error::StepError;
use crate::sdk::step::Step;
use crate::stepflow::workflow::state::{PartialState, StateRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyParams {
    pub from: String,
    pub to: String,
}

/// Copies one field's value into another field
pub struct CopyStep {
    name: String,
    params: CopyParams,
}

impl CopyStep {
    pub fn new(name: impl Into<String>, params: CopyParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

#[async_trait]
impl Step for CopyStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &StateRecord) -> Result<PartialState, StepError> {
        let value = state
            .get(&self.params.from)
            .cloned()
            .ok_or_else(|| format!("field '{}' is not set", self.params.from))?;
        Ok(PartialState::new().with(self.params.to.clone(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step() -> CopyStep {
        CopyStep::new(
            "mirror",
            CopyParams {
                from: "draft".to_string(),
                to: "final".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_copy_value() {
        let state: StateRecord = [("draft", json!({"title": "x"}))].into_iter().collect();
        let update = step().run(&state).await.unwrap();
        assert_eq!(update.get("final"), Some(&json!({"title": "x"})));
        assert_eq!(update.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let err = step().run(&StateRecord::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "field 'draft' is not set");
    }
}
