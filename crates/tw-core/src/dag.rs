//! Action DAG building and topological sorting

use crate::error::{CoreError, CoreResult};
use crate::execution::ExecutionAction;
use crate::target::Target;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// A directed acyclic graph of action dependencies, keyed by target
#[derive(Debug, Default)]
pub struct ActionDag {
    /// The underlying graph; edges point from dependency to dependent
    graph: DiGraph<Target, ()>,

    /// Map from target to node index
    node_map: HashMap<Target, NodeIndex>,
}

impl ActionDag {
    /// Build the DAG for a set of actions.
    ///
    /// Dependencies on targets outside the set are ignored. Fails on
    /// duplicate targets and on cycles.
    pub fn build(actions: &[ExecutionAction]) -> CoreResult<Self> {
        let mut dag = Self::default();

        for action in actions {
            if dag.node_map.contains_key(&action.target) {
                return Err(CoreError::DuplicateTarget {
                    target: action.target.to_string(),
                });
            }
            let idx = dag.graph.add_node(action.target.clone());
            dag.node_map.insert(action.target.clone(), idx);
        }

        for action in actions {
            let to = dag.node_map[&action.target];
            for dep in &action.dependency_targets {
                if let Some(&from) = dag.node_map.get(dep) {
                    dag.graph.add_edge(from, to, ());
                }
            }
        }

        dag.validate()?;

        Ok(dag)
    }

    /// Validate the DAG has no cycles
    pub fn validate(&self) -> CoreResult<()> {
        self.topological_order().map(|_| ())
    }

    /// Find a cycle path starting from a node for error reporting
    fn find_cycle_path(&self, start: NodeIndex) -> String {
        let mut path: Vec<String> = vec![self.graph[start].to_string()];
        let mut current = start;
        let mut visited = HashSet::new();
        visited.insert(current);

        while let Some(edge) = self.graph.edges(current).next() {
            let target = edge.target();
            path.push(self.graph[target].to_string());

            if target == start || visited.contains(&target) {
                break;
            }

            visited.insert(target);
            current = target;
        }

        path.join(" -> ")
    }

    /// Targets in topological order (dependencies first)
    pub fn topological_order(&self) -> CoreResult<Vec<Target>> {
        match toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .into_iter()
                .map(|idx| self.graph[idx].clone())
                .collect()),
            Err(cycle) => Err(CoreError::CircularDependency {
                cycle: self.find_cycle_path(cycle.node_id()),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}

#[cfg(test)]
#[path = "dag_test.rs"]
mod tests;
