// SPDX-License-Identifier: MIT

//! State management for graph workflows
//!
//! This module provides:
//! - `StateKey` - the typed slots a workflow reads and writes
//! - `WorkflowState` - runtime state storage with a disjoint-union merge
//! - `StateUpdate` - the partial state a step returns

mod schema;
mod store;

pub use schema::{FieldType, StateKey};
pub use store::{StateUpdate, StateValue, WorkflowState};
