// SPDX-License-Identifier: MIT

//! Workflow graphs
//!
//! `WorkflowGraph` is the mutable builder; `compile` validates it into an
//! immutable `CompiledGraph` that the `Engine` runs with checkpointing.

pub mod executor;
mod topology;
pub mod types;

pub use executor::{Engine, EngineConfig, SessionLocks};
pub use topology::{CompiledGraph, WorkflowGraph};
pub use types::{GraphOptions, END, START};
