// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::sdk::error::StepError;
use crate::sdk::step::Step;
use crate::stepflow::workflow::state::{PartialState, StateRecord};

/// Writes literal values; every `with:` entry becomes a state field
pub struct SetStep {
    name: String,
    values: Map<String, Value>,
}

impl SetStep {
    pub fn new(name: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

#[async_trait]
impl Step for SetStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _state: &StateRecord) -> Result<PartialState, StepError> {
        Ok(PartialState::from(self.values.clone()))
    }
}
