// SPDX-License-Identifier: MIT

//! State management for workflows
//!
//! This module provides:
//! - `StateRecord` - the open key-value state threaded through every step
//! - `PartialState` - the fields a single step changes
//! - `StateSchema` - optional runtime-checked field declarations

mod record;
mod schema;

pub use record::{PartialState, StateRecord};
pub use schema::{FieldType, StateFieldDef, StateSchema};
