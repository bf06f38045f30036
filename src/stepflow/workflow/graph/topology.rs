//! Workflow graph construction and validation

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::types::{is_sentinel, GraphOptions, END, START};
use crate::sdk::error::{GraphError, StepError};
use crate::sdk::step::{FnStep, Step};
use crate::stepflow::workflow::state::{PartialState, StateRecord, StateSchema};

/// Mutable registry of steps and edges.
///
/// Edges are kept as an adjacency list (step name -> successor names) even
/// though linear workflows only ever have one successor per step.
pub struct WorkflowGraph {
    name: String,
    steps: HashMap<String, Arc<dyn Step>>,
    order: Vec<String>,
    edges: HashMap<String, Vec<String>>,
    schema: StateSchema,
    options: GraphOptions,
}

impl WorkflowGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: HashMap::new(),
            order: Vec::new(),
            edges: HashMap::new(),
            schema: StateSchema::default(),
            options: GraphOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GraphOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Register a step under its own name
    pub fn add_step(&mut self, step: Arc<dyn Step>) -> Result<&mut Self, GraphError> {
        let name = step.name().to_string();
        if is_sentinel(&name) {
            return Err(GraphError::ReservedName(name));
        }
        if self.steps.contains_key(&name) {
            return Err(GraphError::DuplicateStep(name));
        }
        self.order.push(name.clone());
        self.steps.insert(name, step);
        Ok(self)
    }

    /// Register a synchronous closure as a step
    pub fn add_fn<F>(&mut self, name: impl Into<String>, func: F) -> Result<&mut Self, GraphError>
    where
        F: Fn(&StateRecord) -> Result<PartialState, StepError> + Send + Sync + 'static,
    {
        self.add_step(Arc::new(FnStep::new(name, func)))
    }

    /// Add an edge. `START` may only be a source and `END` only a target.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<&mut Self, GraphError> {
        if from == END || to == START {
            return Err(GraphError::InvalidEdge {
                from: from.to_string(),
                to: to.to_string(),
                reason: "start can only be a source and end only a target".to_string(),
            });
        }
        if from == START && to == END {
            return Err(GraphError::InvalidEdge {
                from: from.to_string(),
                to: to.to_string(),
                reason: "a workflow needs at least one step".to_string(),
            });
        }
        for endpoint in [from, to] {
            if !is_sentinel(endpoint) && !self.steps.contains_key(endpoint) {
                return Err(GraphError::UnknownStep(endpoint.to_string()));
            }
        }

        let successors = self.edges.entry(from.to_string()).or_default();
        if !successors.iter().any(|s| s == to) {
            successors.push(to.to_string());
        }
        Ok(self)
    }

    /// Shorthand for `connect(START, step)`
    pub fn set_entry(&mut self, step: &str) -> Result<&mut Self, GraphError> {
        self.connect(START, step)
    }

    /// Shorthand for `connect(step, END)`
    pub fn set_finish(&mut self, step: &str) -> Result<&mut Self, GraphError> {
        self.connect(step, END)
    }

    /// Connect the given steps in order, from `START` to `END`
    pub fn chain(&mut self, steps: &[&str]) -> Result<&mut Self, GraphError> {
        let mut previous = START;
        for &step in steps {
            self.connect(previous, step)?;
            previous = step;
        }
        self.connect(previous, END)
    }

    /// Check the topology without consuming the graph
    pub fn validate(&self) -> Result<(), GraphError> {
        let entries = self.successors(START);
        match entries.len() {
            0 => return Err(GraphError::MissingEntry),
            1 => {}
            count => {
                return Err(GraphError::Branching {
                    step: START.to_string(),
                    count,
                });
            }
        }

        for name in &self.order {
            match self.successors(name).len() {
                0 => return Err(GraphError::DeadEnd(name.clone())),
                1 => {}
                count => {
                    return Err(GraphError::Branching {
                        step: name.clone(),
                        count,
                    });
                }
            }
        }

        let reachable = self.reachable();
        let unreachable: Vec<String> = self
            .order
            .iter()
            .filter(|name| !reachable.contains(name.as_str()))
            .cloned()
            .collect();
        if !unreachable.is_empty() {
            return Err(GraphError::UnreachableStep(unreachable));
        }

        if !self.options.allow_cycles {
            if let Some(cycle) = find_cycle(&self.edges) {
                return Err(GraphError::Cycle(cycle));
            }
        }

        Ok(())
    }

    /// Validate and freeze the graph
    pub fn compile(self) -> Result<CompiledGraph, GraphError> {
        self.validate()?;
        log::debug!(
            "Compiled workflow '{}' with {} steps",
            self.name,
            self.order.len()
        );
        Ok(CompiledGraph {
            name: self.name,
            steps: self.steps,
            order: self.order,
            edges: self.edges,
            schema: self.schema,
            options: self.options,
        })
    }

    fn successors(&self, name: &str) -> &[String] {
        self.edges.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn reachable(&self) -> HashSet<&str> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([START]);
        while let Some(node) = queue.pop_front() {
            for next in self.successors(node) {
                if seen.insert(next.as_str()) {
                    queue.push_back(next.as_str());
                }
            }
        }
        seen
    }
}

/// Depth-first search for a cycle starting at `START`; returns the cycle path
fn find_cycle(edges: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut done: HashSet<&str> = HashSet::new();
    let mut path: Vec<&str> = Vec::new();
    visit(START, edges, &mut done, &mut path)
}

fn visit<'a>(
    node: &'a str,
    edges: &'a HashMap<String, Vec<String>>,
    done: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    if let Some(pos) = path.iter().position(|n| *n == node) {
        let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    if done.contains(node) {
        return None;
    }

    path.push(node);
    for next in edges.get(node).into_iter().flatten() {
        if let Some(cycle) = visit(next, edges, done, path) {
            return Some(cycle);
        }
    }
    path.pop();
    done.insert(node);
    None
}

/// Validated, immutable workflow graph ready for execution
pub struct CompiledGraph {
    name: String,
    steps: HashMap<String, Arc<dyn Step>>,
    order: Vec<String>,
    edges: HashMap<String, Vec<String>>,
    schema: StateSchema,
    options: GraphOptions,
}

impl CompiledGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First step of the workflow
    pub fn entry(&self) -> &str {
        // validate() guarantees exactly one entry edge
        &self.edges[START][0]
    }

    /// Step that runs after `step`, or `None` when the run ends there
    pub fn successor(&self, step: &str) -> Option<&str> {
        self.edges
            .get(step)
            .and_then(|next| next.first())
            .map(|s| s.as_str())
            .filter(|s| *s != END)
    }

    pub fn successors(&self, step: &str) -> &[String] {
        self.edges.get(step).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn step(&self, name: &str) -> Option<&Arc<dyn Step>> {
        self.steps.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Step names in registration order
    pub fn step_names(&self) -> &[String] {
        &self.order
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("steps", &self.order)
            .field("edges", &self.edges)
            .field("options", &self.options)
            .finish()
    }
}
