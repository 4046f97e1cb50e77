// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! This module provides the dependency graph, its static validation, and
//! the executor that runs steps as their dependencies complete.

mod dag;
pub mod executor;
pub mod types;

pub use dag::{DependencyGraph, GraphBuilder};
pub use executor::{ExecutionResult, GraphExecutor, StepEvent, StepRecord, StepStatus};
pub use types::{Edge, NodeContract};
