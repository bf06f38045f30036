// SPDX-License-Identifier: MIT

//! Built-in step kinds available to YAML workflows through `uses:`

pub mod append;
pub mod copy;
pub mod fail;
pub mod increment;
pub mod set;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::sdk::error::WorkflowError;
use crate::sdk::step::Step;

/// Names accepted by `create_step`
pub const BUILTIN_KINDS: &[&str] = &["set", "increment", "append", "copy", "fail"];

/// Instantiate the built-in step `kind` named `name` with its `with:` parameters
pub fn create_step(
    kind: &str,
    name: &str,
    params: &Map<String, Value>,
) -> Result<Arc<dyn Step>, WorkflowError> {
    let step: Arc<dyn Step> = match kind {
        "set" => Arc::new(set::SetStep::new(name, params.clone())),
        "increment" => Arc::new(increment::IncrementStep::new(name, parse_params(name, params)?)),
        "append" => Arc::new(append::AppendStep::new(name, parse_params(name, params)?)?),
        "copy" => Arc::new(copy::CopyStep::new(name, parse_params(name, params)?)),
        "fail" => Arc::new(fail::FailStep::new(name, parse_params(name, params)?)),
        other => return Err(WorkflowError::UnknownStepKind(other.to_string())),
    };
    log::debug!("Created built-in '{}' step '{}'", kind, name);
    Ok(step)
}

fn parse_params<T: DeserializeOwned>(
    step: &str,
    params: &Map<String, Value>,
) -> Result<T, WorkflowError> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| WorkflowError::invalid_params(step, e.to_string()))
}
