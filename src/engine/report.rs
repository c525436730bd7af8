//! Convergence run reporting
//!
//! A run always produces a report, even when some tuples fail: the caller
//! learns which domains converged, which failed and why, and that
//! re-invocation will resume exactly where the run left off.

use std::fmt;

use crate::bundle::ResourceId;

use super::plan::Operation;

/// Direction of a convergence run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Converge toward the declared resource graph
    Apply,
    /// Converge toward nothing; tear everything recorded down
    Destroy,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Apply => "apply",
            Mode::Destroy => "destroy",
        })
    }
}

/// Terminal status of one tuple within a run
#[derive(Debug, Clone, PartialEq)]
pub enum TupleStatus {
    /// Nothing to do; the record already matched the declaration
    Unchanged,
    /// Every planned operation completed
    Converged,
    /// An operation failed; remaining operations for this tuple were
    /// skipped, other tuples were unaffected
    Failed {
        /// Rendering of the error that stopped the tuple
        error: String,
    },
}

impl TupleStatus {
    /// Whether the tuple ended without a failure
    pub fn is_success(&self) -> bool {
        !matches!(self, TupleStatus::Failed { .. })
    }
}

/// Outcome of one `(domain, environment)` tuple
#[derive(Debug, Clone, PartialEq)]
pub struct TupleOutcome {
    /// Domain name
    pub domain: String,
    /// Environment name
    pub environment: String,
    /// Terminal status
    pub status: TupleStatus,
    /// Operations that completed, in execution order
    pub completed: Vec<Operation>,
    /// Whether registry entries were written (apply) or removed (destroy)
    /// for this tuple
    pub published: bool,
}

/// Full report of one convergence run
#[derive(Debug, Clone)]
pub struct ConvergenceReport {
    /// Unique identifier of the run, also stamped as the deployment tag
    pub run_id: String,
    /// Direction of the run
    pub mode: Mode,
    /// Per-tuple outcomes, sorted by domain then environment
    pub outcomes: Vec<TupleOutcome>,
    /// Recorded resources with no declaration backing them (apply only)
    pub orphans: Vec<ResourceId>,
}

impl ConvergenceReport {
    /// Whether every tuple ended without a failure
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.status.is_success())
    }

    /// Tuples that failed
    pub fn failures(&self) -> impl Iterator<Item = &TupleOutcome> {
        self.outcomes
            .iter()
            .filter(|o| !o.status.is_success())
    }

    /// Total operations completed across all tuples
    pub fn completed_operations(&self) -> usize {
        self.outcomes.iter().map(|o| o.completed.len()).sum()
    }

    /// Outcome for one tuple, when present
    pub fn outcome_for(&self, domain: &str, environment: &str) -> Option<&TupleOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.domain == domain && o.environment == environment)
    }
}
