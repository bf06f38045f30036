// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};

use crate::sdk::error::StepError;
use crate::sdk::step::Step;
use crate::stepflow::workflow::state::{PartialState, StateRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementParams {
    pub field: String,
    #[serde(default = "default_by")]
    pub by: Number,
}

fn default_by() -> Number {
    Number::from(1)
}

/// Adds `by` to a numeric field. A missing or null field counts as zero.
pub struct IncrementStep {
    name: String,
    params: IncrementParams,
}

impl IncrementStep {
    pub fn new(name: impl Into<String>, params: IncrementParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

#[async_trait]
impl Step for IncrementStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &StateRecord) -> Result<PartialState, StepError> {
        let field = &self.params.field;
        let current = match state.get(field) {
            None | Some(Value::Null) => Number::from(0),
            Some(Value::Number(n)) => n.clone(),
            Some(other) => {
                return Err(format!("field '{}' is not a number: {}", field, other).into());
            }
        };

        let by = &self.params.by;
        let sum = match (current.as_i64(), by.as_i64()) {
            (Some(a), Some(b)) => match a.checked_add(b) {
                Some(total) => json!(total),
                None => return Err(format!("field '{}' overflowed", field).into()),
            },
            _ => {
                let a = current.as_f64().ok_or("current value is not representable")?;
                let b = by.as_f64().ok_or("increment is not representable")?;
                json!(a + b)
            }
        };

        Ok(PartialState::new().with(field.clone(), sum))
    }
}
