// SPDX-License-Identifier: MIT

//! Step module - the units of work a workflow graph schedules
//!
//! This module provides the core Step trait and implementations:
//! - `GenerativeStep` - delegates to the text-generation model
//! - `EntryStep` / `WrapperStep` - local, model-free transforms

mod generative;
mod local;

pub use generative::{GenerativeStep, PromptSection};
pub use local::{EntryStep, WrapperStep};

use crate::adk::error::FlowError;
use crate::ects::workflow::state::{StateKey, StateUpdate, WorkflowState};
use async_trait::async_trait;
use serde::Serialize;

/// Whether a step calls the text-generation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Local,
    Generative,
}

/// Core step trait
///
/// A step reads a snapshot of the state and returns exactly the keys in
/// `writes()`. `reads()` must be present before dispatch; `optional_reads()`
/// may be absent and are treated as empty by the step.
#[async_trait]
pub trait Step: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> StepKind;

    fn reads(&self) -> &[StateKey];

    fn optional_reads(&self) -> &[StateKey] {
        &[]
    }

    fn writes(&self) -> &[StateKey];

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, FlowError>;
}
