// SPDX-License-Identifier: MIT

//! Stepwise workflow engine with checkpointed, resumable state
//!
//! `sdk` holds the contracts (steps, observers, errors); `stepflow` holds the
//! graph, engine, checkpoint stores and the CLI/HTTP surfaces built on them.

pub mod sdk;
pub mod stepflow;
