// SPDX-License-Identifier: MIT

//! Dependency graph construction and static validation
//!
//! Everything that can be wrong with a workflow's shape is rejected here,
//! when the graph is built at startup, and never while a request runs.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use super::types::{Edge, NodeContract};
use crate::adk::error::GraphError;
use crate::ects::workflow::state::StateKey;

/// Collects nodes and edges, then validates them into a [`DependencyGraph`]
#[derive(Debug, Default)]
pub struct GraphBuilder {
    seeds: Vec<StateKey>,
    nodes: Vec<NodeContract>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys the caller provides before the entry node runs
    pub fn seeds(mut self, keys: impl IntoIterator<Item = StateKey>) -> Self {
        self.seeds.extend(keys);
        self
    }

    pub fn node(mut self, contract: NodeContract) -> Self {
        self.nodes.push(contract);
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(Edge::new(from, to));
        self
    }

    pub fn edges(mut self, edges: impl IntoIterator<Item = Edge>) -> Self {
        self.edges.extend(edges);
        self
    }

    pub fn build(self) -> Result<DependencyGraph, GraphError> {
        let GraphBuilder {
            seeds,
            nodes,
            edges,
        } = self;

        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

        for node in &nodes {
            if adjacency.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
            adjacency.insert(node.id.clone(), vec![]);
            reverse_adjacency.insert(node.id.clone(), vec![]);
        }

        let mut seen: HashSet<&Edge> = HashSet::new();
        for edge in &edges {
            for end in [&edge.from, &edge.to] {
                if !adjacency.contains_key(end) {
                    return Err(GraphError::UnknownNode {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        missing: end.clone(),
                    });
                }
            }
            if edge.from == edge.to {
                return Err(GraphError::SelfLoop(edge.from.clone()));
            }
            if !seen.insert(edge) {
                return Err(GraphError::DuplicateEdge(
                    edge.from.clone(),
                    edge.to.clone(),
                ));
            }
            adjacency
                .entry(edge.from.clone())
                .or_default()
                .push(edge.to.clone());
            reverse_adjacency
                .entry(edge.to.clone())
                .or_default()
                .push(edge.from.clone());
        }

        let order = topological_sort(&nodes, &adjacency, &reverse_adjacency)?;

        let entries: Vec<String> = nodes
            .iter()
            .filter(|n| reverse_adjacency[&n.id].is_empty())
            .map(|n| n.id.clone())
            .collect();
        if entries.len() != 1 {
            return Err(GraphError::EntryPoints(entries));
        }

        let terminals: Vec<String> = nodes
            .iter()
            .filter(|n| adjacency[&n.id].is_empty())
            .map(|n| n.id.clone())
            .collect();
        if terminals.len() != 1 {
            return Err(GraphError::TerminalPoints(terminals));
        }

        check_single_writer(&seeds, &nodes)?;

        let graph = DependencyGraph {
            entry: entries[0].clone(),
            terminal: terminals[0].clone(),
            contracts: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            adjacency,
            reverse_adjacency,
            order,
            seeds,
        };
        graph.check_reads()?;
        Ok(graph)
    }
}

/// Kahn's algorithm; ties are broken by node insertion order
fn topological_sort(
    nodes: &[NodeContract],
    adjacency: &HashMap<String, Vec<String>>,
    reverse_adjacency: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>, GraphError> {
    let mut in_degree: HashMap<&str, usize> = nodes
        .iter()
        .map(|n| (n.id.as_str(), reverse_adjacency[&n.id].len()))
        .collect();

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for next in &adjacency[id] {
            if let Some(degree) = in_degree.get_mut(next.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next.as_str());
                }
            }
        }
    }

    if order.len() < nodes.len() {
        let remaining = nodes
            .iter()
            .filter(|n| in_degree[n.id.as_str()] > 0)
            .map(|n| n.id.clone())
            .collect();
        return Err(GraphError::CircularDependency(remaining));
    }

    Ok(order)
}

fn check_single_writer(seeds: &[StateKey], nodes: &[NodeContract]) -> Result<(), GraphError> {
    let mut writers: HashMap<StateKey, &str> = HashMap::new();
    for node in nodes {
        for key in &node.writes {
            if seeds.contains(key) {
                return Err(GraphError::WritesSeed {
                    step: node.id.clone(),
                    key: *key,
                });
            }
            if let Some(first) = writers.insert(*key, &node.id) {
                return Err(GraphError::DuplicateWriter {
                    key: *key,
                    first: first.to_string(),
                    second: node.id.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Immutable, validated workflow DAG
///
/// Guarantees: acyclic, exactly one entry and one terminal node, every key
/// has a single writer, and every read is produced by the seeds or by a
/// transitive predecessor.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    contracts: HashMap<String, NodeContract>,
    /// Adjacency list: node_id -> downstream node_ids
    adjacency: HashMap<String, Vec<String>>,
    /// Reverse adjacency: node_id -> upstream node_ids
    reverse_adjacency: HashMap<String, Vec<String>>,
    order: Vec<String>,
    entry: String,
    terminal: String,
    seeds: Vec<StateKey>,
}

impl DependencyGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Keys every node may read without an edge
    pub fn seeds(&self) -> &[StateKey] {
        &self.seeds
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn terminal(&self) -> &str {
        &self.terminal
    }

    /// Direct predecessors of a node
    pub fn predecessors(&self, id: &str) -> &[String] {
        self.reverse_adjacency
            .get(id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Direct successors of a node
    pub fn successors(&self, id: &str) -> &[String] {
        self.adjacency
            .get(id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// A valid readiness order: every node appears after all its predecessors
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    pub fn contract(&self, id: &str) -> Option<&NodeContract> {
        self.contracts.get(id)
    }

    /// Nodes with more than one predecessor
    pub fn join_points(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| self.predecessors(id).len() > 1)
            .map(|id| id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every read must be covered by the seeds or a transitive predecessor's writes
    fn check_reads(&self) -> Result<(), GraphError> {
        let mut available: HashMap<&str, BTreeSet<StateKey>> = HashMap::new();

        for id in &self.order {
            let mut keys: BTreeSet<StateKey> = self.seeds.iter().copied().collect();
            for pred in self.predecessors(id) {
                if let Some(upstream) = available.get(pred.as_str()) {
                    keys.extend(upstream.iter().copied());
                }
                keys.extend(self.contracts[pred].writes.iter().copied());
            }

            let contract = &self.contracts[id];
            for key in contract.reads.iter().chain(&contract.optional_reads) {
                if !keys.contains(key) {
                    return Err(GraphError::UnsatisfiedRead {
                        step: id.clone(),
                        key: *key,
                    });
                }
            }
            available.insert(id.as_str(), keys);
        }

        Ok(())
    }
}
