//! Resource graph resolver - turns attribute references and explicit
//! dependencies into a DAG and derives a deterministic evaluation order

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::models::Stack;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("resource '{from}' references '{to}', which is not declared")]
    DanglingReference { from: String, to: String },
    #[error("resource '{from}' depends on '{to}', which is not declared")]
    DanglingDependency { from: String, to: String },
    #[error("dependency cycle through resource '{0}'")]
    Cycle(String),
}

/// Why one resource must exist before another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// The dependent reads an attribute of the dependency
    Reference,
    /// Declared ordering without an attribute read
    Explicit,
}

/// Dependency graph over a stack. Edges point from dependency to dependent.
#[derive(Debug)]
pub struct ResourceGraph {
    graph: DiGraph<String, EdgeKind>,
    nodes: HashMap<String, NodeIndex>,
    /// Resources grouped by dependency depth; each wave only depends on
    /// earlier waves
    waves: Vec<Vec<String>>,
}

impl ResourceGraph {
    pub fn build(stack: &Stack) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();

        for resource in stack.resources() {
            let node = graph.add_node(resource.name.clone());
            nodes.insert(resource.name.clone(), node);
        }

        for resource in stack.resources() {
            let to = nodes[&resource.name];

            for reference in resource.references() {
                let from = *nodes.get(&reference.target).ok_or_else(|| {
                    GraphError::DanglingReference {
                        from: resource.name.clone(),
                        to: reference.target.clone(),
                    }
                })?;
                // self-references (e.g. a group admitting its own members)
                // do not order anything
                if from != to && graph.find_edge(from, to).is_none() {
                    graph.add_edge(from, to, EdgeKind::Reference);
                }
            }

            for dependency in &resource.depends_on {
                let from = *nodes.get(dependency).ok_or_else(|| GraphError::DanglingDependency {
                    from: resource.name.clone(),
                    to: dependency.clone(),
                })?;
                if from == to {
                    return Err(GraphError::Cycle(resource.name.clone()));
                }
                if graph.find_edge(from, to).is_none() {
                    graph.add_edge(from, to, EdgeKind::Explicit);
                }
            }
        }

        let sorted = toposort(&graph, None)
            .map_err(|cycle| GraphError::Cycle(graph[cycle.node_id()].clone()))?;

        // depth = longest path from any root
        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        for &node in &sorted {
            let d = graph
                .neighbors_directed(node, Direction::Incoming)
                .map(|dep| depth[&dep] + 1)
                .max()
                .unwrap_or(0);
            depth.insert(node, d);
        }

        let wave_count = depth.values().copied().max().map_or(0, |d| d + 1);
        let mut waves = vec![Vec::new(); wave_count];
        // declaration order within a wave
        for resource in stack.resources() {
            let d = depth[&nodes[&resource.name]];
            waves[d].push(resource.name.clone());
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            waves = waves.len(),
            "resolved resource graph"
        );

        Ok(ResourceGraph {
            graph,
            nodes,
            waves,
        })
    }

    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    /// Evaluation order: waves flattened, declaration order within a wave
    pub fn order(&self) -> Vec<&str> {
        self.waves
            .iter()
            .flat_map(|wave| wave.iter().map(String::as_str))
            .collect()
    }

    /// Direct dependencies of a resource, sorted by name
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&node) = self.nodes.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|n| self.graph[n].as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn edge_kind(&self, from: &str, to: &str) -> Option<EdgeKind> {
        let from = *self.nodes.get(from)?;
        let to = *self.nodes.get(to)?;
        let edge = self.graph.find_edge(from, to)?;
        self.graph.edge_weight(edge).copied()
    }
}
