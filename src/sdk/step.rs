// SPDX-License-Identifier: MIT

use crate::sdk::error::StepError;
use crate::stepflow::workflow::state::{PartialState, StateRecord};
use async_trait::async_trait;

/// A single unit of work in a workflow.
///
/// Steps receive the full current state by shared reference and return only the
/// fields they want to change. The engine awaits each step to completion before
/// merging its output, so any async work a step does is finished by the time
/// the next step starts.
#[async_trait]
pub trait Step: Send + Sync {
    /// Returns the step name (must be unique within a graph)
    fn name(&self) -> &str;

    /// Run the step against the current state and return a partial update
    async fn run(&self, state: &StateRecord) -> Result<PartialState, StepError>;
}

/// Adapter turning a synchronous closure into a `Step`
pub struct FnStep<F> {
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&StateRecord) -> Result<PartialState, StepError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&StateRecord) -> Result<PartialState, StepError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &StateRecord) -> Result<PartialState, StepError> {
        (self.func)(state)
    }
}
