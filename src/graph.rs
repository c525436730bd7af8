//! Resource dependency graph
//!
//! An explicit directed acyclic graph of typed resource nodes with declared
//! edges. Ordering is a data-level invariant: apply walks a topological
//! sort, destroy walks its reverse. The graph is the merge of every
//! domain's bundle; cross-domain edges never exist, so domains can be
//! partitioned freely after sorting.

use std::collections::{BTreeMap, BTreeSet};

use crate::bundle::{ResourceId, ResourceNode};
use crate::{Error, Result};

/// Merged desired-state graph across all domains
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    nodes: BTreeMap<ResourceId, ResourceNode>,
}

impl ResourceGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, rejecting duplicate identifiers
    pub fn insert(&mut self, node: ResourceNode) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(Error::internal(
                "graph",
                format!("duplicate resource id {}", node.id),
            ));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Look up a node by identifier
    pub fn get(&self, id: &ResourceId) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    /// Whether the graph contains the identifier
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Iterate all nodes in identifier order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Distinct domain names present in the graph
    pub fn domains(&self) -> BTreeSet<String> {
        self.nodes.values().map(|n| n.domain.clone()).collect()
    }

    /// Deterministic topological order of all node identifiers
    ///
    /// Kahn's algorithm over identifier-ordered maps: among nodes whose
    /// dependencies are all satisfied, the lexicographically smallest
    /// identifier goes first, so the order is stable across runs.
    pub fn topo_order(&self) -> Result<Vec<ResourceId>> {
        let mut in_degree: BTreeMap<&ResourceId, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&ResourceId, Vec<&ResourceId>> = BTreeMap::new();

        for node in self.nodes.values() {
            in_degree.entry(&node.id).or_insert(0);
            for dep in &node.depends_on {
                if !self.nodes.contains_key(dep) {
                    return Err(Error::internal(
                        "graph",
                        format!("{} depends on unknown resource {dep}", node.id),
                    ));
                }
                *in_degree.entry(&node.id).or_insert(0) += 1;
                dependents.entry(dep).or_default().push(&node.id);
            }
        }

        let mut ready: BTreeSet<&ResourceId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.iter().next().copied() {
            ready.remove(id);
            order.push(id.clone());

            if let Some(next) = dependents.get(id) {
                for dependent in next {
                    let degree = in_degree
                        .get_mut(dependent)
                        .expect("dependent was registered");
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(Error::internal(
                "graph",
                "dependency cycle detected in resource graph",
            ));
        }

        Ok(order)
    }
}
