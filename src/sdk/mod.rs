// SPDX-License-Identifier: MIT

//! Step development kit
//!
//! - `Step` - the trait every unit of work implements
//! - `ExecutionObserver` - receives engine events
//! - error types shared by the whole crate

pub mod error;
pub mod observer;
pub mod step;

pub use observer::{ChannelObserver, ExecutionEvent, ExecutionObserver, LogObserver};
pub use step::{FnStep, Step};
