// SPDX-License-Identifier: MIT

//! Request and response shapes at the service boundary

use serde::{Deserialize, Serialize};

use crate::ects::workflow::state::WorkflowState;

/// Inbound payload; all four fields are required
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RunRequest {
    pub report_template: String,
    pub transcript: String,
    pub segment_data: String,
    pub segment_items: String,
}

impl RunRequest {
    /// Seed state for one invocation
    pub fn into_state(self) -> WorkflowState {
        WorkflowState::seeded(
            self.report_template,
            self.transcript,
            self.segment_data,
            self.segment_items,
        )
    }
}

/// `{"outputs":[{"outputs":[{"results":{"message":{"text":...}}}]}]}`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResponseEnvelope {
    pub outputs: Vec<OuterOutput>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OuterOutput {
    pub outputs: Vec<InnerOutput>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct InnerOutput {
    pub results: Results,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Results {
    pub message: Message,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Message {
    pub text: String,
}

impl ResponseEnvelope {
    pub fn wrap(summary: impl Into<String>) -> Self {
        Self {
            outputs: vec![OuterOutput {
                outputs: vec![InnerOutput {
                    results: Results {
                        message: Message {
                            text: summary.into(),
                        },
                    },
                }],
            }],
        }
    }

    /// The wrapped summary, if the envelope has the expected shape
    pub fn text(&self) -> Option<&str> {
        self.outputs
            .first()?
            .outputs
            .first()
            .map(|o| o.results.message.text.as_str())
    }
}
