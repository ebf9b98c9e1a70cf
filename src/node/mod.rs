//! TaskNode variants (spec §4.C): Request, Status, Process.
//!
//! Grounded on §9's explicit re-architecture note ("inheritance hierarchy
//! `TaskNode ← Status/Process/Request` → a tagged variant with a shared
//! behavior interface"), and on the teacher's `NodeType` tagged enum
//! (`src/graph/node.rs`) for the shape of a tagged variant carrying
//! per-variant data alongside common fields. Dependant back-references use
//! `Weak`, matching §9's "dependants stored as back-indices, never as owning
//! references" and the teacher's own `Weak<RwLock<...>>` parent pointers in
//! `src/graph/subgraph.rs`.

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;

use crate::error::{Result, SolverError};
use crate::results::{GraphResult, GraphResults, NodeKind};
use crate::solver::GraphSolver;
use crate::task::{ProcessContext, Task, TaskOutcome};

/// Per-variant data distinguishing a Request node from Status/Process.
pub enum NodeRole {
    /// A user's request to complete a task for a particular batch.
    Request {
        /// The batch this request belongs to.
        batch_id: String,
        /// Whether the request is satisfied once status resolves, without
        /// running the process body.
        status_only: bool,
        /// Invoked exactly once, the first time this node completes.
        complete_handler: Arc<dyn Fn(GraphResult) + Send + Sync>,
    },
    /// A task's status-resolution node.
    Status,
    /// A task's process (execution) node.
    Process,
}

impl fmt::Debug for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Request { batch_id, status_only, .. } => f
                .debug_struct("Request")
                .field("batch_id", batch_id)
                .field("status_only", status_only)
                .finish(),
            NodeRole::Status => write!(f, "Status"),
            NodeRole::Process => write!(f, "Process"),
        }
    }
}

struct NodeState {
    result: Option<GraphResult>,
    started_at: Option<DateTime<Utc>>,
}

/// A Request, Status, or Process node (spec §3/§4.C).
///
/// Every node is owned exclusively by the solver's node arena; this struct
/// never holds an owning reference back to the solver or to its dependants,
/// only `Weak` ones, so the arena can be dropped (or a batch cleared) without
/// manual teardown.
pub struct Node {
    /// The task this node belongs to.
    pub task: Arc<dyn Task>,
    /// Which variant this node is.
    pub role: NodeRole,
    state: Mutex<NodeState>,
    dependants: DashMap<String, Weak<Node>>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("key", &self.key()).field("role", &self.role).finish()
    }
}

/// The outcome of a single `Node::execute()` call: the resolved task outcome
/// plus whether the process body actually ran (always `false` for Status).
pub struct ExecuteOutcome {
    /// The resolved outcome.
    pub outcome: TaskOutcome,
    /// True only when a Process node's body actually ran (not short-circuited
    /// by an already-`ready` status).
    pub did_run: bool,
}

/// Parameters to [`Node::complete`].
pub struct CompleteParams {
    /// When the node began executing, if it ever did.
    pub started_at: Option<DateTime<Utc>>,
    /// When the node finished.
    pub completed_at: DateTime<Utc>,
    /// Set for a node that failed directly (own error, not a cascaded abort).
    pub error: Option<Arc<SolverError>>,
    /// True for a node cancelled because a dependency failed.
    pub aborted: bool,
    /// The resolved outcome, for a node that completed successfully.
    pub outcome: Option<TaskOutcome>,
    /// True only for a Process node whose body actually ran.
    pub did_run: bool,
}

impl CompleteParams {
    /// Build the params for a node that ran to completion successfully.
    pub fn success(started_at: Option<DateTime<Utc>>, completed_at: DateTime<Utc>, outcome: TaskOutcome, did_run: bool) -> Self {
        Self { started_at, completed_at, error: None, aborted: false, outcome: Some(outcome), did_run }
    }

    /// Build the params for a node that failed directly.
    pub fn failed(started_at: Option<DateTime<Utc>>, completed_at: DateTime<Utc>, error: Arc<SolverError>) -> Self {
        Self { started_at, completed_at, error: Some(error), aborted: false, outcome: None, did_run: false }
    }

    /// Build the params for a node cascaded into abort by a failed
    /// dependency.
    pub fn cascaded_abort(completed_at: DateTime<Utc>) -> Self {
        Self { started_at: None, completed_at, error: None, aborted: true, outcome: None, did_run: false }
    }

    /// Build the params for the Request node of the directly-failing task:
    /// not aborted, but carrying the same wrapped error (spec §4.C).
    pub fn mirrored_error(completed_at: DateTime<Utc>, error: Arc<SolverError>) -> Self {
        Self { started_at: None, completed_at, error: Some(error), aborted: false, outcome: None, did_run: false }
    }

    /// Build the params that mirror an already-resolved source result, used
    /// by `evaluateRequests` to complete a Request from its Status/Process
    /// node's existing result without re-running anything.
    pub fn mirroring(source: &GraphResult) -> Self {
        Self {
            started_at: source.started_at,
            completed_at: source.completed_at.unwrap_or_else(Utc::now),
            error: source.error.clone(),
            aborted: source.aborted,
            outcome: source.as_task_outcome(),
            did_run: false,
        }
    }
}

impl Node {
    /// Build a Request node.
    pub fn new_request(
        task: Arc<dyn Task>,
        batch_id: String,
        status_only: bool,
        complete_handler: Arc<dyn Fn(GraphResult) + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            task,
            role: NodeRole::Request { batch_id, status_only, complete_handler },
            state: Mutex::new(NodeState { result: None, started_at: None }),
            dependants: DashMap::new(),
        })
    }

    /// Build a Status node.
    pub fn new_status(task: Arc<dyn Task>) -> Arc<Self> {
        Arc::new(Self {
            task,
            role: NodeRole::Status,
            state: Mutex::new(NodeState { result: None, started_at: None }),
            dependants: DashMap::new(),
        })
    }

    /// Build a Process node.
    pub fn new_process(task: Arc<dyn Task>) -> Arc<Self> {
        Arc::new(Self {
            task,
            role: NodeRole::Process,
            state: Mutex::new(NodeState { result: None, started_at: None }),
            dependants: DashMap::new(),
        })
    }

    /// `kind.name:<variant>`, except Request which is `kind.name:request:<batchId>`.
    pub fn key(&self) -> String {
        match &self.role {
            NodeRole::Request { batch_id, .. } => format!("{}:request:{}", self.task.key(), batch_id),
            NodeRole::Status => format!("{}:status", self.task.key()),
            NodeRole::Process => format!("{}:process", self.task.key()),
        }
    }

    /// Which [`NodeKind`] this node is.
    pub fn node_kind(&self) -> NodeKind {
        match self.role {
            NodeRole::Request { .. } => NodeKind::Request,
            NodeRole::Status => NodeKind::Status,
            NodeRole::Process => NodeKind::Process,
        }
    }

    /// Human-readable description of the underlying task.
    pub fn describe(&self) -> String {
        self.task.description()
    }

    /// The concurrency group this node is admitted under.
    pub fn group_key(&self) -> String {
        match self.role {
            NodeRole::Request { .. } => "request".to_string(),
            NodeRole::Status => format!("status-{}-{}", self.task.kind(), self.task.process_concurrency_limit()),
            NodeRole::Process => format!("process-{}-{}", self.task.kind(), self.task.process_concurrency_limit()),
        }
    }

    /// The concurrency limit for this node's group (Request is capped only by
    /// the hard global limit, never by its own group).
    pub fn group_limit(&self) -> usize {
        match self.role {
            NodeRole::Request { .. } => usize::MAX,
            NodeRole::Status => self.task.status_concurrency_limit(),
            NodeRole::Process => self.task.process_concurrency_limit(),
        }
    }

    /// The already-resolved result, if any.
    pub fn result(&self) -> Option<GraphResult> {
        self.state.lock().result.clone()
    }

    /// True once `result()` is set.
    pub fn is_complete(&self) -> bool {
        self.state.lock().result.is_some()
    }

    /// When this node began executing.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().started_at
    }

    /// Record that this node has begun executing.
    pub fn mark_started(&self, at: DateTime<Utc>) {
        self.state.lock().started_at = Some(at);
    }

    /// Register `dependant` as depending on this node, idempotent by key.
    pub fn add_dependant(self: &Arc<Self>, dependant: &Arc<Node>) {
        self.dependants.entry(dependant.key()).or_insert_with(|| Arc::downgrade(dependant));
    }

    /// This node's current dependencies (spec §4.C, recomputed lazily for
    /// Process once its Status is known).
    pub fn dependencies(&self, solver: &GraphSolver) -> Vec<Arc<Node>> {
        match &self.role {
            NodeRole::Request { status_only, .. } => {
                if *status_only {
                    vec![solver.get_or_create_status(&self.task)]
                } else {
                    vec![solver.get_or_create_process(&self.task)]
                }
            }
            NodeRole::Status => self
                .task
                .status_dependencies()
                .into_iter()
                .map(|dep| solver.get_or_create_process(&dep))
                .collect(),
            NodeRole::Process => {
                let status_node = solver.get_or_create_status(&self.task);
                match status_node.result() {
                    None => vec![status_node],
                    Some(status_result) => match status_result.as_task_outcome() {
                        Some(outcome) => self
                            .task
                            .process_dependencies(&outcome)
                            .into_iter()
                            .map(|dep| solver.get_or_create_process(&dep))
                            .collect(),
                        // Status resolved but aborted/errored: this node is
                        // about to be (or already was) cascaded into abort
                        // itself, never admitted for execution.
                        None => Vec::new(),
                    },
                }
            }
        }
    }

    /// `dependencies().filter(|d| d.result().is_none())`.
    pub fn remaining_dependencies(&self, solver: &GraphSolver) -> Vec<Arc<Node>> {
        self.dependencies(solver).into_iter().filter(|d| !d.is_complete()).collect()
    }

    /// `GraphResults` over this node's dependency tasks, populated with
    /// whatever results are already resolved.
    pub fn dependency_results(&self, solver: &GraphSolver) -> GraphResults {
        let deps = self.dependencies(solver);
        let mut results = GraphResults::new(deps.iter().map(|d| d.task.key()));
        for dep in &deps {
            if let Some(result) = dep.result() {
                let _ = results.set_result(&dep.task.key(), result);
            }
        }
        results
    }

    /// Run this node's body. Never called for a Request node (the scheduler
    /// never admits one into `inProgress`).
    pub async fn execute(&self, solver: &GraphSolver) -> Result<ExecuteOutcome> {
        match &self.role {
            NodeRole::Request { .. } => {
                Err(SolverError::Internal("Request nodes are not executable".into()))
            }
            NodeRole::Status => {
                let dependency_results = self.dependency_results(solver);
                let outcome = self.task.get_status(dependency_results).await?;
                Ok(ExecuteOutcome { outcome, did_run: false })
            }
            NodeRole::Process => {
                let status_node = solver.get_or_create_status(&self.task);
                let status_result = status_node
                    .result()
                    .ok_or_else(|| SolverError::Internal(format!("process for {} executed before its status resolved", self.task.key())))?;
                let status_outcome = status_result.as_task_outcome().ok_or_else(|| {
                    SolverError::Internal(format!("process for {} executed with a failed status", self.task.key()))
                })?;

                if !self.task.force() && status_outcome.state.is_ready() {
                    return Ok(ExecuteOutcome { outcome: status_outcome, did_run: false });
                }

                let dependency_results = self.dependency_results(solver);
                let mut outcome = self
                    .task
                    .process(ProcessContext { status: status_outcome, dependency_results, status_only: false })
                    .await?;
                if outcome.cache_info.is_none() {
                    outcome.cache_info = status_result.cache_info.clone();
                }
                Ok(ExecuteOutcome { outcome, did_run: true })
            }
        }
    }

    /// Resolve this node's result (idempotent: a second call is a no-op and
    /// returns the result already recorded). On abort or error, cascades
    /// `aborted=true` to every dependant — except a dependant that is the
    /// Request node for this same task with an error, which instead mirrors
    /// the error directly (spec §4.C/§7).
    pub fn complete(self: &Arc<Self>, params: CompleteParams, solver: &GraphSolver, aborted_keys: &DashSet<String>) -> GraphResult {
        let already = self.state.lock().result.clone();
        if let Some(existing) = already {
            return existing;
        }

        let success = params.error.is_none() && !params.aborted;
        let node_type = self.node_kind();
        let outcome = params.outcome.as_ref();

        let result = GraphResult {
            node_type,
            description: self.describe(),
            key: self.task.key(),
            name: self.task.name().to_string(),
            dependency_results: self.dependency_results(solver),
            aborted: params.aborted,
            did_run: params.did_run,
            cache_info: outcome.and_then(|o| o.cache_info.clone()),
            started_at: params.started_at,
            completed_at: Some(params.completed_at),
            error: params.error.clone(),
            input_version: outcome.map(|_| self.task.input_version()),
            outputs: outcome.map(|o| o.outputs.clone()).unwrap_or(serde_json::Value::Null),
            success,
            attached: outcome.and_then(|o| o.attached.clone()),
            run_reason: outcome.and_then(|o| o.run_reason.clone()),
            processed: node_type == NodeKind::Process,
            state: outcome.map(|o| o.state.clone()),
        };

        {
            let mut state = self.state.lock();
            state.result = Some(result.clone());
        }

        if let NodeRole::Request { complete_handler, .. } = &self.role {
            complete_handler(result.clone());
        }

        if params.aborted || params.error.is_some() {
            for entry in self.dependants.iter() {
                let Some(dependant) = entry.value().upgrade() else { continue };
                let is_mirror_target = params.error.is_some()
                    && matches!(dependant.role, NodeRole::Request { .. })
                    && dependant.task.key() == self.task.key();

                if is_mirror_target {
                    let mirrored = CompleteParams::mirrored_error(params.completed_at, params.error.clone().unwrap());
                    dependant.complete(mirrored, solver, aborted_keys);
                } else {
                    if aborted_keys.insert(dependant.task.key().to_string()) {
                        tracing::warn!(key = %dependant.task.key(), "aborting dependant task");
                    }
                    let cascaded = CompleteParams::cascaded_abort(params.completed_at);
                    dependant.complete(cascaded, solver, aborted_keys);
                }
            }
        }

        result
    }
}
