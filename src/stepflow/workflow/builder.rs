// SPDX-License-Identifier: MIT

//! Workflow builder - turns YAML definitions into compiled graphs
//!
//! Steps with `uses:` are instantiated from the built-in step kinds; all other
//! steps are looked up by name in the `StepRegistry`.

use std::sync::Arc;

use crate::sdk::error::{StepflowError, WorkflowError};
use crate::sdk::step::Step;
use crate::stepflow::steps;
use crate::stepflow::workflow::graph::{CompiledGraph, GraphOptions, WorkflowGraph, END};
use crate::stepflow::workflow::loader::WorkflowLoader;
use crate::stepflow::workflow::registry::StepRegistry;
use crate::stepflow::workflow::types::{StepDefinition, WorkflowDefinition};

/// High-level builder for constructing workflows from YAML definitions
pub struct Builder {
    loader: WorkflowLoader,
    registry: StepRegistry,
}

impl Builder {
    pub fn new(registry: StepRegistry) -> Self {
        Self {
            loader: WorkflowLoader::new(),
            registry,
        }
    }

    /// Build a workflow from a YAML file path
    pub async fn build_workflow(&self, file_path: &str) -> Result<CompiledGraph, StepflowError> {
        let def = self.loader.load_workflow(file_path)?;
        self.build_from_def(&def).await
    }

    /// Build a workflow from a parsed definition
    pub async fn build_from_def(
        &self,
        def: &WorkflowDefinition,
    ) -> Result<CompiledGraph, StepflowError> {
        let mut graph = WorkflowGraph::new(def.name.clone())
            .with_schema(def.state.clone())
            .with_options(GraphOptions {
                allow_cycles: def.allow_cycles,
            });

        for step_def in &def.steps {
            let step = self.resolve_step(step_def).await?;
            graph.add_step(step)?;
        }

        if let Some(first) = def.steps.first() {
            graph.set_entry(&first.name)?;
        }

        for (i, step_def) in def.steps.iter().enumerate() {
            let following = def.steps.get(i + 1).map(|s| s.name.as_str());
            match step_def.next.resolve(following) {
                END => graph.set_finish(&step_def.name)?,
                target => graph.connect(&step_def.name, target)?,
            };
        }

        let compiled = graph.compile()?;
        log::info!(
            "Built workflow '{}' with {} steps",
            def.name,
            def.steps.len()
        );
        Ok(compiled)
    }

    async fn resolve_step(
        &self,
        step_def: &StepDefinition,
    ) -> Result<Arc<dyn Step>, WorkflowError> {
        match &step_def.uses {
            Some(kind) => steps::create_step(kind, &step_def.name, &step_def.params),
            None => self
                .registry
                .get(&step_def.name)
                .await
                .ok_or_else(|| WorkflowError::UnboundStep(step_def.name.clone())),
        }
    }
}
