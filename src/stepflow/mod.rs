// SPDX-License-Identifier: MIT

pub mod checkpoint;
pub mod config;
pub mod server;
pub mod steps;
pub mod workflow;
