//! Convergence engine
//!
//! One convergence run walks a fixed phase sequence:
//!
//! ```text
//! Idle -> Locking -> Diffing -> Planning -> Applying -> Publishing -> Idle
//! ```
//!
//! with `Failed` as the terminal phase when anything goes wrong after
//! locking. The lock is released on every path. There is no background
//! loop and no automatic retry: a failed run is re-invoked by the
//! operator, and diffing re-derives the remaining work from recorded
//! state, so re-invocation is always safe.
//!
//! Tuples share no resources. The engine applies them one after another
//! but isolates their failures: a certificate timeout for one domain
//! never stops another domain's operations, and only fully-converged
//! domains have their registry entries touched.

mod plan;
mod report;

pub use plan::{plan_apply, plan_destroy, OpKind, Operation, Plan, TuplePlan};
pub use report::{ConvergenceReport, Mode, TupleOutcome, TupleStatus};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::bundle::{instantiate_all, BaseTags};
use crate::catalog::CatalogSource;
use crate::graph::ResourceGraph;
use crate::provider::{AppliedResource, CloudProvider, DependencyOutputs};
use crate::registry::{ParameterStore, RegistryPublisher};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::state::{ConvergenceState, StateStore};
use crate::{Error, Result, DEFAULT_ENVIRONMENT};

/// Phase of a convergence run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No run in progress
    Idle,
    /// Acquiring the mutual-exclusion lock
    Locking,
    /// Comparing the desired graph against recorded state
    Diffing,
    /// Ordering operations along dependency edges
    Planning,
    /// Executing operations
    Applying,
    /// Writing or removing registry entries
    Publishing,
    /// Terminal failure; operator intervention required
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Locking => "locking",
            Phase::Diffing => "diffing",
            Phase::Planning => "planning",
            Phase::Applying => "applying",
            Phase::Publishing => "publishing",
            Phase::Failed => "failed",
        })
    }
}

/// Engine construction parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Stable identity of the catalog; keys state and the lock
    pub state_key: String,
    /// Project tag stamped onto every resource
    pub project: String,
    /// Owner tag stamped onto every resource
    pub owner: String,
    /// Deployer identity tag
    pub deployer: String,
    /// Bound on the certificate DNS validation wait
    pub certificate_timeout: Duration,
    /// Lease written into the convergence lock
    pub lock_lease: Duration,
    /// Backoff driving lock acquisition
    pub lock_retry: RetryConfig,
}

/// The convergence engine
///
/// Holds its collaborators behind narrow traits so every external seam
/// (provider, state store, parameter store) is injectable.
pub struct Engine {
    provider: Arc<dyn CloudProvider>,
    store: Arc<dyn StateStore>,
    publisher: RegistryPublisher,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine over the given collaborators
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        store: Arc<dyn StateStore>,
        params: Arc<dyn ParameterStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            store,
            publisher: RegistryPublisher::new(params),
            config,
        }
    }

    /// Run a full convergence apply over the catalog
    pub async fn apply(&self, catalog: &dyn CatalogSource) -> Result<ConvergenceReport> {
        let entries = catalog.scan()?;
        let run_id = Uuid::new_v4().to_string();
        let base = BaseTags {
            project: self.config.project.clone(),
            repository: self.config.state_key.clone(),
            owner: self.config.owner.clone(),
            deployer: self.config.deployer.clone(),
            deployment_id: run_id.clone(),
        };
        let graph = instantiate_all(&entries, &base).await?;
        info!(
            run = %run_id,
            domains = graph.domains().len(),
            resources = graph.len(),
            "starting convergence apply"
        );
        self.run(Mode::Apply, graph, run_id).await
    }

    /// Run a full convergence destroy of everything recorded in state
    ///
    /// Destroy works from the record alone so resources whose declaration
    /// was already removed are still torn down.
    pub async fn destroy(&self) -> Result<ConvergenceReport> {
        let run_id = Uuid::new_v4().to_string();
        info!(run = %run_id, "starting convergence destroy");
        self.run(Mode::Destroy, ResourceGraph::new(), run_id).await
    }

    async fn run(&self, mode: Mode, graph: ResourceGraph, run_id: String) -> Result<ConvergenceReport> {
        let key = self.config.state_key.clone();
        let holder = format!("{}/{}", self.config.deployer, run_id);

        info!(run = %run_id, phase = %Phase::Locking, key = %key, "acquiring convergence lock");
        retry_with_backoff(&self.config.lock_retry, "acquire_convergence_lock", || {
            self.store.acquire(&key, &holder, self.config.lock_lease)
        })
        .await?;

        let result = self.converge_locked(mode, &graph, &run_id).await;

        // The lock is released on success and failure alike
        if let Err(e) = self.store.release(&key, &holder).await {
            warn!(run = %run_id, error = %e, "failed to release convergence lock");
        }

        match &result {
            Ok(report) if report.is_success() => {
                info!(run = %run_id, phase = %Phase::Idle, "convergence run complete");
            }
            Ok(report) => {
                warn!(
                    run = %run_id,
                    phase = %Phase::Failed,
                    failed = report.failures().count(),
                    "convergence run finished with failed domains"
                );
            }
            Err(e) => {
                error!(run = %run_id, phase = %Phase::Failed, error = %e, "convergence run aborted");
            }
        }

        result
    }

    async fn converge_locked(
        &self,
        mode: Mode,
        graph: &ResourceGraph,
        run_id: &str,
    ) -> Result<ConvergenceReport> {
        let key = &self.config.state_key;

        info!(run = %run_id, phase = %Phase::Diffing, "reading recorded state");
        let mut state = self
            .store
            .read(key)
            .await?
            .unwrap_or_else(|| ConvergenceState::new(key.clone()));

        let plan = match mode {
            Mode::Apply => plan_apply(graph, &state)?,
            Mode::Destroy => plan_destroy(&state),
        };

        for orphan in &plan.orphans {
            warn!(
                resource = %orphan,
                "recorded resource has no declaration; it will not be touched until an explicit destroy"
            );
        }

        info!(
            run = %run_id,
            phase = %Phase::Planning,
            tuples = plan.tuples.len(),
            operations = plan.op_count(),
            "plan computed"
        );

        info!(run = %run_id, phase = %Phase::Applying, "executing plan");
        let mut outcomes = Vec::with_capacity(plan.tuples.len());
        for tuple_plan in &plan.tuples {
            outcomes.push(self.apply_tuple(mode, tuple_plan, graph, &mut state).await);
        }

        info!(run = %run_id, phase = %Phase::Publishing, "updating registry entries");
        for outcome in &mut outcomes {
            self.publish_outcome(mode, outcome, &state).await;
        }

        Ok(ConvergenceReport {
            run_id: run_id.to_string(),
            mode,
            outcomes,
            orphans: plan.orphans,
        })
    }

    /// Execute one tuple's operations; a failure stops this tuple only
    async fn apply_tuple(
        &self,
        mode: Mode,
        tuple_plan: &TuplePlan,
        graph: &ResourceGraph,
        state: &mut ConvergenceState,
    ) -> TupleOutcome {
        let mut outcome = TupleOutcome {
            domain: tuple_plan.domain.clone(),
            environment: tuple_plan.environment.clone(),
            status: TupleStatus::Unchanged,
            completed: Vec::new(),
            published: false,
        };

        if tuple_plan.ops.is_empty() {
            return outcome;
        }

        for op in &tuple_plan.ops {
            match self.execute(op, graph, state).await {
                Ok(()) => outcome.completed.push(op.clone()),
                Err(e) => {
                    error!(
                        domain = %tuple_plan.domain,
                        environment = %tuple_plan.environment,
                        resource = %op.id,
                        operation = %op.kind,
                        error = %e,
                        "operation failed; skipping the rest of this domain"
                    );
                    outcome.status = TupleStatus::Failed {
                        error: e.to_string(),
                    };
                    return outcome;
                }
            }
        }

        info!(
            domain = %tuple_plan.domain,
            environment = %tuple_plan.environment,
            operations = outcome.completed.len(),
            mode = %mode,
            "domain converged"
        );
        outcome.status = TupleStatus::Converged;
        outcome
    }

    /// Execute one operation and persist state after it completes
    async fn execute(
        &self,
        op: &Operation,
        graph: &ResourceGraph,
        state: &mut ConvergenceState,
    ) -> Result<()> {
        let key = &self.config.state_key;
        match op.kind {
            OpKind::Create | OpKind::Update => {
                let node = graph.get(&op.id).ok_or_else(|| {
                    Error::internal("engine", format!("planned resource {} not in graph", op.id))
                })?;

                let deps = self.dependency_outputs(node, state)?;
                let mut applied = match op.kind {
                    OpKind::Create => self.provider.create(node, &deps).await?,
                    _ => {
                        let prior = state.resources.get(&op.id).cloned().ok_or_else(|| {
                            Error::internal(
                                "engine",
                                format!("update planned for unrecorded resource {}", op.id),
                            )
                        })?;
                        self.provider.update(node, &prior.applied, &deps).await?
                    }
                };

                if !applied.ready {
                    // Record the requested resource before waiting so a
                    // timeout leaves it visible to the next run
                    state.record(node, applied.clone())?;
                    self.store.write(key, state).await?;
                    applied = self.await_ready(node, &applied).await?;
                }

                state.record(node, applied)?;
                self.store.write(key, state).await?;
            }
            OpKind::Destroy => {
                let Some(recorded) = state.resources.get(&op.id).cloned() else {
                    // A crashed destroy already removed it
                    return Ok(());
                };
                self.provider.delete(&op.id, &recorded.applied).await?;
                state.remove(&op.id);
                self.store.write(key, state).await?;
            }
        }
        Ok(())
    }

    /// Resolve the recorded identifier bags of a node's dependencies
    fn dependency_outputs(
        &self,
        node: &crate::bundle::ResourceNode,
        state: &ConvergenceState,
    ) -> Result<DependencyOutputs> {
        node.depends_on
            .iter()
            .map(|dep| {
                state
                    .resources
                    .get(dep)
                    .map(|r| (dep.clone(), r.applied.clone()))
                    .ok_or_else(|| {
                        Error::internal(
                            "engine",
                            format!("{} depends on {dep}, which is not recorded", node.id),
                        )
                    })
            })
            .collect()
    }

    /// Bounded wait for a resource to settle
    ///
    /// Certificate DNS validation is the single longest-running step in
    /// the graph; it gets an explicit timeout and a clean failure instead
    /// of an indefinite hang.
    async fn await_ready(
        &self,
        node: &crate::bundle::ResourceNode,
        applied: &AppliedResource,
    ) -> Result<AppliedResource> {
        let timeout = self.config.certificate_timeout;
        info!(
            resource = %node.id,
            timeout_secs = timeout.as_secs(),
            "waiting for resource to settle"
        );
        match tokio::time::timeout(timeout, self.provider.await_ready(node, applied)).await {
            Ok(result) => result,
            Err(_) => Err(Error::validation_timeout(
                &node.domain,
                node.id.as_str(),
                timeout.as_secs(),
            )),
        }
    }

    /// Write (apply) or remove (destroy) registry entries for one tuple
    ///
    /// Only fully-converged tuples in the default environment are
    /// published; a publish failure downgrades the tuple to failed so the
    /// caller never mistakes a half-published domain for ready.
    async fn publish_outcome(
        &self,
        mode: Mode,
        outcome: &mut TupleOutcome,
        state: &ConvergenceState,
    ) {
        if !outcome.status.is_success() || outcome.environment != DEFAULT_ENVIRONMENT {
            return;
        }

        let result = match mode {
            Mode::Apply => {
                self.publisher
                    .publish(&outcome.domain, &outcome.environment, state)
                    .await
            }
            Mode::Destroy => self.publisher.withdraw(&outcome.domain).await,
        };

        match result {
            Ok(()) => outcome.published = true,
            Err(e) => {
                error!(domain = %outcome.domain, error = %e, "registry publishing failed");
                outcome.status = TupleStatus::Failed {
                    error: e.to_string(),
                };
            }
        }
    }
}
