// SPDX-License-Identifier: MIT

pub mod graph;
pub mod pipeline;
pub mod registry;
pub mod state;
pub mod step;

pub use graph::GraphExecutor;
pub use registry::Workflow;
