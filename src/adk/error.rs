// SPDX-License-Identifier: MIT

//! Typed error handling for ects-flow
//!
//! Every failure of an invocation surfaces as a single [`FlowError`]; its
//! `Display` text is what the HTTP layer reports back to the caller.

use thiserror::Error;

use crate::ects::workflow::state::{FieldType, StateKey};

/// Top-level error for a workflow invocation
#[derive(Debug, Error)]
pub enum FlowError {
    /// Static graph problems (only raised while building a workflow)
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Merge or lookup failures on the shared state
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// A step was about to run without one of its required inputs
    #[error("Step '{step}' dispatched before '{key}' was available")]
    Precondition { step: String, key: StateKey },

    /// A step returned something other than its declared write-set
    #[error("Step '{step}' broke its contract: {message}")]
    Contract { step: String, message: String },

    /// The external text-generation call failed
    #[error("Step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: ModelError,
    },

    /// The task running a step panicked or was aborted
    #[error("Step '{step}' panicked")]
    StepPanicked { step: String },

    /// The scheduler ran out of ready steps before the terminal step finished
    #[error("Workflow stopped before completion; never ran: {missing:?}")]
    Incomplete { missing: Vec<String> },

    /// The final envelope could not be built or read back
    #[error("Envelope error: {0}")]
    Envelope(#[from] serde_json::Error),
}

/// Construction-time errors for the dependency graph
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Duplicate step id: {0}")]
    DuplicateNode(String),

    #[error("Edge {from} -> {to} references unknown step '{missing}'")]
    UnknownNode {
        from: String,
        to: String,
        missing: String,
    },

    #[error("Self-loop on step '{0}'")]
    SelfLoop(String),

    #[error("Duplicate edge {0} -> {1}")]
    DuplicateEdge(String, String),

    /// Circular dependency detected; lists the steps left on the cycle
    #[error("Circular dependency detected: {0:?}")]
    CircularDependency(Vec<String>),

    #[error("Expected exactly one entry step, found {0:?}")]
    EntryPoints(Vec<String>),

    #[error("Expected exactly one terminal step, found {0:?}")]
    TerminalPoints(Vec<String>),

    #[error("Key '{key}' is written by both '{first}' and '{second}'")]
    DuplicateWriter {
        key: StateKey,
        first: String,
        second: String,
    },

    #[error("Step '{step}' writes seed key '{key}'")]
    WritesSeed { step: String, key: StateKey },

    #[error("Step '{step}' reads '{key}' but no predecessor produces it")]
    UnsatisfiedRead { step: String, key: StateKey },

    #[error("Step '{step}' has no system/user prompt configured")]
    MissingPrompt { step: String },

    #[error("Step '{0}' is not registered")]
    UnknownStep(String),
}

/// State container errors
#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    /// Single-writer violation: the key already holds a value
    #[error("Key '{0}' is already present")]
    Conflict(StateKey),

    #[error("Key '{0}' is not present")]
    Missing(StateKey),

    #[error("Key '{key}' expects a {expected:?} value")]
    TypeMismatch { key: StateKey, expected: FieldType },
}

/// Text-generation service errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Non-success status from the provider
    #[error("API error from {provider} ({status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    /// HTTP transport errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// Anything raised by a non-HTTP implementation (mocks, adapters)
    #[error("{0}")]
    Other(String),
}

impl ModelError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Create from a generic message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl FlowError {
    /// Wrap a model failure raised inside `step`
    pub fn step(step: impl Into<String>, source: ModelError) -> Self {
        Self::Step {
            step: step.into(),
            source,
        }
    }

    pub fn contract(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Contract {
            step: step.into(),
            message: message.into(),
        }
    }
}
