// SPDX-License-Identifier: MIT

//! Local steps - pure transforms that never call the model

use super::{Step, StepKind};
use crate::adk::error::FlowError;
use crate::ects::envelope::ResponseEnvelope;
use crate::ects::workflow::state::{StateKey, StateUpdate, WorkflowState};
use async_trait::async_trait;

/// Entry step: the seeds are already in place, so it derives nothing
pub struct EntryStep {
    id: String,
}

impl EntryStep {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Step for EntryStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StepKind {
        StepKind::Local
    }

    fn reads(&self) -> &[StateKey] {
        &StateKey::SEEDS
    }

    fn writes(&self) -> &[StateKey] {
        &[]
    }

    async fn run(&self, _state: &WorkflowState) -> Result<StateUpdate, FlowError> {
        Ok(StateUpdate::new())
    }
}

/// Terminal step: packages the summary into the response envelope
pub struct WrapperStep {
    id: String,
    reads: [StateKey; 1],
    writes: [StateKey; 1],
}

impl WrapperStep {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reads: [StateKey::AiSummary],
            writes: [StateKey::FinalResponse],
        }
    }
}

#[async_trait]
impl Step for WrapperStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StepKind {
        StepKind::Local
    }

    fn reads(&self) -> &[StateKey] {
        &self.reads
    }

    fn writes(&self) -> &[StateKey] {
        &self.writes
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, FlowError> {
        let summary = state
            .text(StateKey::AiSummary)
            .map_err(|_| FlowError::Precondition {
                step: self.id.clone(),
                key: StateKey::AiSummary,
            })?;
        let envelope = serde_json::to_value(ResponseEnvelope::wrap(summary))?;
        Ok(StateUpdate::new().structured(StateKey::FinalResponse, envelope))
    }
}
