// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sdk::error::{StepError, WorkflowError};
use crate::sdk::step::Step;
use crate::stepflow::workflow::state::{PartialState, StateRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendParams {
    pub field: String,
    /// Single value to append
    pub value: Option<Value>,
    /// Several values to append, after `value`
    #[serde(default)]
    pub values: Vec<Value>,
}

/// Pushes values onto an array field and writes the new array back.
/// The array in the incoming state is never modified.
pub struct AppendStep {
    name: String,
    field: String,
    items: Vec<Value>,
}

impl AppendStep {
    pub fn new(name: impl Into<String>, params: AppendParams) -> Result<Self, WorkflowError> {
        let name = name.into();
        let mut items: Vec<Value> = params.value.into_iter().collect();
        items.extend(params.values);
        if items.is_empty() {
            return Err(WorkflowError::invalid_params(
                name,
                "append needs `value` or `values`",
            ));
        }
        Ok(Self {
            name,
            field: params.field,
            items,
        })
    }
}

#[async_trait]
impl Step for AppendStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &StateRecord) -> Result<PartialState, StepError> {
        let mut array = match state.get(&self.field) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(existing)) => existing.clone(),
            Some(other) => {
                return Err(format!("field '{}' is not an array: {}", self.field, other).into());
            }
        };
        array.extend(self.items.iter().cloned());
        Ok(PartialState::new().with(self.field.clone(), Value::Array(array)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Option<Value>, values: Vec<Value>) -> AppendParams {
        AppendParams {
            field: "results".to_string(),
            value,
            values,
        }
    }

    #[tokio::test]
    async fn test_append_builds_new_array() {
        let step = AppendStep::new("add", params(Some(json!("c")), vec![json!("d")])).unwrap();
        let state: StateRecord = [("results", json!(["a", "b"]))].into_iter().collect();

        let update = step.run(&state).await.unwrap();

        assert_eq!(update.get("results"), Some(&json!(["a", "b", "c", "d"])));
        assert_eq!(state.get("results"), Some(&json!(["a", "b"])));
    }

    #[tokio::test]
    async fn test_missing_field_starts_empty() {
        let step = AppendStep::new("add", params(Some(json!(1)), vec![])).unwrap();
        let update = step.run(&StateRecord::new()).await.unwrap();
        assert_eq!(update.get("results"), Some(&json!([1])));
    }

    #[test]
    fn test_nothing_to_append_is_rejected() {
        assert!(AppendStep::new("add", params(None, vec![])).is_err());
    }
}
