// SPDX-License-Identifier: MIT

//! YAML schema types for workflow definitions
//!
//! A definition lists its steps in order. Each step either names a built-in
//! step kind through `uses` or is bound to a registered step of the same name
//! when the workflow is built.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::graph::END;
use super::state::StateSchema;

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Permit `next` edges that loop back to earlier steps
    #[serde(default)]
    pub allow_cycles: bool,
    /// State fields and their types/defaults
    #[serde(default)]
    pub state: StateSchema,
    pub steps: Vec<StepDefinition>,
}

/// A step in a workflow definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StepDefinition {
    /// Unique step name
    pub name: String,
    /// Built-in step kind; omitted for steps bound from the registry
    pub uses: Option<String>,
    /// Parameters for the built-in step kind
    #[serde(default, rename = "with")]
    pub params: Map<String, Value>,
    /// Successor override
    #[serde(default)]
    pub next: Next,
}

/// Successor of a step (implicit or an explicit step name)
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(untagged)]
pub enum Next {
    /// The following step in the list, END after the last
    #[default]
    Following,
    Step(String),
}

impl Next {
    /// Resolve to a concrete target given the step listed after this one
    pub fn resolve<'a>(&'a self, following: Option<&'a str>) -> &'a str {
        match self {
            Next::Following => following.unwrap_or(END),
            Next::Step(target) => target,
        }
    }
}
