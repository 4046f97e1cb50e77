// SPDX-License-Identifier: MIT

//! Graph workflow type definitions

use serde::Serialize;

use crate::ects::workflow::state::StateKey;
use crate::ects::workflow::step::Step;

/// The static read/write contract of one node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeContract {
    pub id: String,
    /// Keys that must be present when the node is dispatched
    pub reads: Vec<StateKey>,
    /// Keys the node tolerates being absent
    pub optional_reads: Vec<StateKey>,
    /// Keys the node produces; disjoint from every other node's writes
    pub writes: Vec<StateKey>,
}

impl NodeContract {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reads: vec![],
            optional_reads: vec![],
            writes: vec![],
        }
    }

    /// Contract declared by a step implementation
    pub fn of(step: &dyn Step) -> Self {
        Self {
            id: step.id().to_string(),
            reads: step.reads().to_vec(),
            optional_reads: step.optional_reads().to_vec(),
            writes: step.writes().to_vec(),
        }
    }

    pub fn reads(mut self, keys: impl IntoIterator<Item = StateKey>) -> Self {
        self.reads.extend(keys);
        self
    }

    pub fn optional_reads(mut self, keys: impl IntoIterator<Item = StateKey>) -> Self {
        self.optional_reads.extend(keys);
        self
    }

    pub fn writes(mut self, keys: impl IntoIterator<Item = StateKey>) -> Self {
        self.writes.extend(keys);
        self
    }
}

/// A "must complete before" edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}
