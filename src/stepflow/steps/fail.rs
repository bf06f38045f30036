// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::sdk::error::StepError;
use crate::sdk::step::Step;
use crate::stepflow::workflow::state::{PartialState, StateRecord};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailParams {
    pub message: Option<String>,
}

/// Always fails. Used to rehearse resumption and manual overrides.
pub struct FailStep {
    name: String,
    message: String,
}

impl FailStep {
    pub fn new(name: impl Into<String>, params: FailParams) -> Self {
        let name = name.into();
        let message = params
            .message
            .unwrap_or_else(|| format!("step '{}' failed", name));
        Self { name, message }
    }
}

#[async_trait]
impl Step for FailStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _state: &StateRecord) -> Result<PartialState, StepError> {
        Err(self.message.clone().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fail_uses_message() {
        let step = FailStep::new(
            "boom",
            FailParams {
                message: Some("quota exceeded".to_string()),
            },
        );
        let err = step.run(&StateRecord::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
    }

    #[tokio::test]
    async fn test_default_message_names_step() {
        let step = FailStep::new("boom", FailParams::default());
        let err = step.run(&StateRecord::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "step 'boom' failed");
    }
}
