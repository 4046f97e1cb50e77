// SPDX-License-Identifier: MIT

//! Step registry bound to its validated dependency graph

use std::collections::HashMap;
use std::sync::Arc;

use super::graph::{DependencyGraph, Edge, GraphBuilder, NodeContract};
use super::state::StateKey;
use super::step::{Step, StepKind};
use crate::adk::error::GraphError;

/// An immutable workflow: steps plus the DAG over them
///
/// Built once at startup and shared read-only by every invocation.
pub struct Workflow {
    name: String,
    steps: Vec<Arc<dyn Step>>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    graph: DependencyGraph,
}

impl Workflow {
    /// Register `steps`, wire `edges` and validate the result
    pub fn new<A, B>(
        name: impl Into<String>,
        seeds: &[StateKey],
        steps: Vec<Arc<dyn Step>>,
        edges: impl IntoIterator<Item = (A, B)>,
    ) -> Result<Self, GraphError>
    where
        A: Into<String>,
        B: Into<String>,
    {
        let edges: Vec<Edge> = edges.into_iter().map(|(a, b)| Edge::new(a, b)).collect();
        Self::assemble(name.into(), seeds.to_vec(), steps, edges)
    }

    fn assemble(
        name: String,
        seeds: Vec<StateKey>,
        steps: Vec<Arc<dyn Step>>,
        edges: Vec<Edge>,
    ) -> Result<Self, GraphError> {
        let graph = steps
            .iter()
            .fold(GraphBuilder::new().seeds(seeds), |builder, step| {
                builder.node(NodeContract::of(step.as_ref()))
            })
            .edges(edges.iter().cloned())
            .build()?;

        let index = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id().to_string(), i))
            .collect();

        log::debug!(
            "Workflow {} validated: {} steps, join points {:?}",
            name,
            steps.len(),
            graph.join_points()
        );

        Ok(Self {
            name,
            steps,
            index,
            edges,
            graph,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// O(1) step lookup by id
    pub fn step(&self, id: &str) -> Option<&Arc<dyn Step>> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    pub fn steps(&self) -> impl Iterator<Item = &Arc<dyn Step>> {
        self.steps.iter()
    }

    /// Ids of the steps that call the model, in registration order
    pub fn generative_ids(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.kind() == StepKind::Generative)
            .map(|s| s.id())
            .collect()
    }

    /// Swap every generative step for another implementation
    ///
    /// Local steps are kept. Replacements must keep the original id; the
    /// graph is validated again against their declared contracts.
    pub fn replace_generative<F>(self, mut replace: F) -> Result<Self, GraphError>
    where
        F: FnMut(&Arc<dyn Step>) -> Arc<dyn Step>,
    {
        let mut steps = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            if step.kind() != StepKind::Generative {
                steps.push(step.clone());
                continue;
            }
            let replacement = replace(step);
            if replacement.id() != step.id() {
                return Err(GraphError::UnknownStep(replacement.id().to_string()));
            }
            steps.push(replacement);
        }

        Self::assemble(self.name, self.graph.seeds().to_vec(), steps, self.edges)
    }
}
