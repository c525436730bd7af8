//! Diff and plan computation
//!
//! Diffing compares the desired resource graph against recorded state and
//! produces the minimal operation set; planning orders those operations by
//! the graph's dependency edges (reverse on destroy) and groups them per
//! `(domain, environment)` tuple, since tuples share no resources and
//! succeed or fail independently.

use std::collections::BTreeMap;
use std::fmt;

use crate::bundle::{ResourceId, ResourceRole};
use crate::graph::ResourceGraph;
use crate::state::ConvergenceState;
use crate::Result;

/// Kind of a planned operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// The resource is desired but not recorded
    Create,
    /// The resource is recorded but its spec changed or it never settled
    Update,
    /// The resource is recorded and must be removed
    Destroy,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpKind::Create => "create",
            OpKind::Update => "update",
            OpKind::Destroy => "destroy",
        })
    }
}

/// One planned resource operation
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// What to do
    pub kind: OpKind,
    /// Resource the operation targets
    pub id: ResourceId,
    /// Role of the targeted resource
    pub role: ResourceRole,
}

/// Ordered operations for one `(domain, environment)` tuple
#[derive(Debug, Clone, PartialEq)]
pub struct TuplePlan {
    /// Domain name
    pub domain: String,
    /// Environment name
    pub environment: String,
    /// Operations in execution order
    pub ops: Vec<Operation>,
}

/// The full plan for a convergence run
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Per-tuple operation lists, sorted by domain then environment.
    /// Apply plans include tuples with no operations so the run can
    /// report them as unchanged.
    pub tuples: Vec<TuplePlan>,
    /// Recorded resources with no declaration backing them. Never
    /// deleted by an apply; the catalog is not a garbage collector.
    pub orphans: Vec<ResourceId>,
}

impl Plan {
    /// Total number of operations across all tuples
    pub fn op_count(&self) -> usize {
        self.tuples.iter().map(|t| t.ops.len()).sum()
    }

    /// Whether the plan performs no operations at all
    pub fn is_empty(&self) -> bool {
        self.op_count() == 0
    }
}

/// Diff the desired graph against recorded state for an apply
///
/// A node is created when unrecorded, updated when its fingerprint changed
/// or its last operation never reached the ready state, and skipped when
/// the record matches. Operations follow the graph's topological order.
pub fn plan_apply(graph: &ResourceGraph, state: &ConvergenceState) -> Result<Plan> {
    let mut by_tuple: BTreeMap<(String, String), Vec<Operation>> = BTreeMap::new();

    for id in graph.topo_order()? {
        let node = graph.get(&id).expect("ordered ids come from the graph");
        let kind = match state.resources.get(&id) {
            None => Some(OpKind::Create),
            Some(rec) if rec.fingerprint != node.fingerprint()? => Some(OpKind::Update),
            Some(rec) if !rec.applied.ready => Some(OpKind::Update),
            Some(_) => None,
        };

        let ops = by_tuple
            .entry((node.domain.clone(), node.environment.clone()))
            .or_default();
        if let Some(kind) = kind {
            ops.push(Operation {
                kind,
                id: id.clone(),
                role: node.role(),
            });
        }
    }

    let orphans = state
        .resources
        .keys()
        .filter(|id| !graph.contains(id))
        .cloned()
        .collect();

    Ok(Plan {
        tuples: into_tuple_plans(by_tuple),
        orphans,
    })
}

/// Plan a destroy of everything recorded in state
///
/// Destroy works from the record, not the graph, so resources whose
/// declaration was already removed are still torn down. Within each tuple
/// the creation order is walked in reverse: dependents before their
/// dependencies.
pub fn plan_destroy(state: &ConvergenceState) -> Plan {
    let mut by_tuple: BTreeMap<(String, String), Vec<Operation>> = BTreeMap::new();

    for record in state.resources.values() {
        by_tuple
            .entry((record.domain.clone(), record.environment.clone()))
            .or_default()
            .push(Operation {
                kind: OpKind::Destroy,
                id: record.id.clone(),
                role: record.role,
            });
    }

    for ops in by_tuple.values_mut() {
        ops.sort_by(|a, b| {
            b.role
                .fallback_order()
                .cmp(&a.role.fallback_order())
                .then_with(|| a.id.cmp(&b.id))
        });
    }

    Plan {
        tuples: into_tuple_plans(by_tuple),
        orphans: Vec::new(),
    }
}

fn into_tuple_plans(by_tuple: BTreeMap<(String, String), Vec<Operation>>) -> Vec<TuplePlan> {
    by_tuple
        .into_iter()
        .map(|((domain, environment), ops)| TuplePlan {
            domain,
            environment,
            ops,
        })
        .collect()
}
