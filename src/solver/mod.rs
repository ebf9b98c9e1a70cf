//! GraphSolver: the event-driven scheduling loop (spec §4.E).
//!
//! Grounded on the teacher's `ParallelExecutor`
//! (`src/engine/parallel_executor.rs`: `DependencyAnalyzer` + level-by-level
//! admission over a `Semaphore`) and `ParallelScheduler`
//! (`src/batch/scheduler.rs`), generalized from a fixed-level batch executor
//! into the spec's lazily-expanded, per-group-gated cooperative loop. The
//! `in_loop`/`tick_pending` pair implements §9's re-architecture note
//! ("an explicit work-queue with a single-entry reentrancy flag; task
//! completion callbacks enqueue a loop tick rather than call directly") in a
//! way that is race-free under `tokio`'s real OS-thread parallelism: a
//! completion that arrives while a pass is already running sets
//! `tick_pending` instead of blocking, and the running pass checks that flag
//! before releasing its guard, so no wakeup is ever lost.

mod config;

pub use config::SolverConfig;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use tracing::{debug, error, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SolverError};
use crate::events::{Event, EventBus};
use crate::graph::{DependencyGraph, GraphError};
use crate::node::{CompleteParams, ExecuteOutcome, Node, NodeRole};
use crate::results::{GraphResult, NodeKind};
use crate::task::Task;

/// Per-`solve()`-call state: the requested tasks and their Request nodes,
/// plus the cascade-logging dedup set shared across the whole batch.
pub(crate) struct BatchState {
    pub batch_id: String,
    pub requests: DashMap<String, Arc<Node>>,
    pub aborted_keys: DashSet<String>,
    aborted: AtomicBool,
}

impl BatchState {
    pub fn new(batch_id: String) -> Arc<Self> {
        Arc::new(Self {
            batch_id,
            requests: DashMap::new(),
            aborted_keys: DashSet::new(),
            aborted: AtomicBool::new(false),
        })
    }

    pub fn mark_aborted(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// The scheduler core: owns every Status/Process node ever created in its
/// lifetime, plus the pending/in-progress working sets for the batch
/// currently running.
pub struct GraphSolver {
    nodes: DashMap<String, Arc<Node>>,
    pending_nodes: DashMap<String, Arc<Node>>,
    in_progress: DashMap<String, Arc<Node>>,
    in_loop: AtomicBool,
    tick_pending: AtomicBool,
    config: SolverConfig,
    clock: Arc<dyn Clock>,
    events: EventBus,
    /// Serializes `solve()` calls against this instance (spec §4.E/§9: "a
    /// single serialization lock around `solve`").
    pub(crate) solve_lock: tokio::sync::Mutex<()>,
}

impl GraphSolver {
    /// Build a solver with the system wall clock.
    pub fn new(config: SolverConfig) -> Result<Arc<Self>> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a solver with an injected clock (tests use [`crate::clock::FrozenClock`]).
    pub fn with_clock(config: SolverConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>> {
        if config.allow_concurrent_batches {
            return Err(SolverError::Internal(
                "allow_concurrent_batches is reserved and not yet implemented; serial batches only".into(),
            ));
        }
        Ok(Arc::new(Self {
            nodes: DashMap::new(),
            pending_nodes: DashMap::new(),
            in_progress: DashMap::new(),
            in_loop: AtomicBool::new(false),
            tick_pending: AtomicBool::new(false),
            config,
            clock,
            events: EventBus::new(),
            solve_lock: tokio::sync::Mutex::new(()),
        }))
    }

    /// The solver's event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Empty no-op, preserved per spec §9 open question 2.
    pub fn clear_cache(&self) {}

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn clear_after_batch(&self) {
        self.nodes.clear();
        self.pending_nodes.clear();
    }

    pub(crate) fn get_or_create_status(&self, task: &Arc<dyn Task>) -> Arc<Node> {
        let key = format!("{}:status", task.key());
        self.nodes.entry(key).or_insert_with(|| Node::new_status(task.clone())).clone()
    }

    pub(crate) fn get_or_create_process(&self, task: &Arc<dyn Task>) -> Arc<Node> {
        let key = format!("{}:process", task.key());
        self.nodes.entry(key).or_insert_with(|| Node::new_process(task.clone())).clone()
    }

    fn ensure_pending_node(&self, node: &Arc<Node>, dependant: &Arc<Node>) {
        node.add_dependant(dependant);
        self.pending_nodes.entry(node.key()).or_insert_with(|| node.clone());
    }

    /// Emit `start` and run the first loop pass.
    pub(crate) fn start(self: &Arc<Self>, batch: &Arc<BatchState>) {
        self.events.emit(Event::Start);
        self.trigger_loop(batch);
    }

    /// Request a loop pass. If one is already running, mark a tick pending
    /// instead of running a second pass concurrently; the running pass
    /// checks for a pending tick before releasing its guard.
    pub(crate) fn trigger_loop(self: &Arc<Self>, batch: &Arc<BatchState>) {
        loop {
            if self
                .in_loop
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.tick_pending.store(false, Ordering::SeqCst);
                self.events.emit(Event::Loop);
                debug!(batch_id = %batch.batch_id, "running scheduling loop pass");
                self.run_loop_pass(batch);
                self.in_loop.store(false, Ordering::SeqCst);
                if self.tick_pending.swap(false, Ordering::SeqCst) {
                    continue;
                }
                break;
            } else {
                self.tick_pending.store(true, Ordering::SeqCst);
                break;
            }
        }
    }

    fn abort_batch(self: &Arc<Self>, batch: &Arc<BatchState>, error: Arc<SolverError>) {
        error!(batch_id = %batch.batch_id, %error, "aborting batch");
        batch.mark_aborted();
        self.events.emit(Event::Abort { error });
    }

    fn run_loop_pass(self: &Arc<Self>, batch: &Arc<BatchState>) {
        if batch.is_aborted() {
            return;
        }

        self.evaluate_requests(batch);
        self.expand_pending();

        let graph = match self.build_pending_graph() {
            Ok(g) => g,
            Err(err) => {
                self.abort_batch(batch, Arc::new(err));
                return;
            }
        };
        if graph.size() == 0 {
            return;
        }

        let leaves = match graph.overall_order(true) {
            Ok(l) => l,
            Err(GraphError::CycleDetected(cycles)) => {
                self.abort_batch(batch, Arc::new(SolverError::CircularDependencies(cycles)));
                return;
            }
            Err(GraphError::NodeNotFound(key)) => {
                self.abort_batch(batch, Arc::new(SolverError::Internal(format!("pending graph missing node {key}"))));
                return;
            }
        };

        let candidates: Vec<Arc<Node>> = leaves
            .into_iter()
            .filter(|key| !self.in_progress.contains_key(key))
            .filter_map(|key| self.pending_nodes.get(&key).map(|entry| entry.value().clone()))
            .collect();

        let mut per_group_busy: HashMap<String, usize> = HashMap::new();
        for entry in self.in_progress.iter() {
            *per_group_busy.entry(entry.value().group_key()).or_insert(0) += 1;
        }

        let mut admitted: Vec<Arc<Node>> = Vec::new();
        let mut per_group_admitted: HashMap<String, usize> = HashMap::new();
        for node in candidates {
            let group_key = node.group_key();
            let limit = node.group_limit();
            let already = per_group_busy.get(&group_key).copied().unwrap_or(0)
                + per_group_admitted.get(&group_key).copied().unwrap_or(0);
            if already < limit {
                *per_group_admitted.entry(group_key).or_insert(0) += 1;
                admitted.push(node);
            }
        }

        let hard_limit = self.config.hard_concurrency_limit as usize;
        let available = hard_limit.saturating_sub(self.in_progress.len());
        admitted.truncate(available);

        if admitted.is_empty() {
            return;
        }

        let keys: Vec<String> = admitted.iter().map(|n| n.key()).collect();
        debug!(?keys, in_progress = self.in_progress.len() + admitted.len(), "admitting nodes");
        self.events.emit(Event::Process { keys, in_progress: self.in_progress.len() + admitted.len() });

        for node in admitted {
            let started_at = self.clock.now();
            node.mark_started(started_at);
            self.in_progress.insert(node.key(), node.clone());

            match node.node_kind() {
                NodeKind::Status => self.events.emit(Event::StatusStart { key: node.task.key() }),
                NodeKind::Process => self.events.emit(Event::TaskStart { key: node.task.key() }),
                NodeKind::Request => {}
            }

            let solver = self.clone();
            let batch = batch.clone();
            let node_key = node.key();
            let handle = tokio::spawn(async move {
                solver.process_node(node, started_at, batch).await;
            });

            let solver = self.clone();
            let batch = batch.clone();
            tokio::spawn(async move {
                if let Err(join_err) = handle.await {
                    solver.handle_node_panic(&node_key, started_at, join_err, &batch).await;
                }
            });
        }
    }

    #[instrument(skip(self, node, batch), fields(key = %node.key()))]
    async fn process_node(self: Arc<Self>, node: Arc<Node>, started_at: DateTime<Utc>, batch: Arc<BatchState>) {
        let outcome = node.execute(&self).await;
        match outcome {
            Ok(ExecuteOutcome { outcome, did_run }) => {
                let completed_at = self.clock.now();
                debug!(key = %node.key(), did_run, "node completed");
                self.complete_task(&node, CompleteParams::success(Some(started_at), completed_at, outcome, did_run), &batch);
            }
            Err(err) => {
                let completed_at = self.clock.now();
                let wrapped = Arc::new(err);
                if matches!(wrapped.as_ref(), SolverError::Internal(_)) {
                    error!(key = %node.key(), error = %wrapped, "internal solver error, aborting batch");
                    node.complete(CompleteParams::failed(Some(started_at), completed_at, wrapped.clone()), &self, &batch.aborted_keys);
                    self.in_progress.remove(&node.key());
                    self.pending_nodes.remove(&node.key());
                    self.abort_batch(&batch, wrapped);
                } else {
                    warn!(key = %node.key(), error = %wrapped, "node failed");
                    self.complete_task(&node, CompleteParams::failed(Some(started_at), completed_at, wrapped), &batch);
                }
            }
        }
        self.trigger_loop(&batch);
    }

    /// Handle a node whose spawned task panicked (or was cancelled) before
    /// `process_node` could complete it itself. Without this, a panicking
    /// `Task::get_status`/`Task::process` body would leave the node stuck in
    /// `in_progress` forever and `solve()`'s caller would hang waiting on a
    /// result that can never arrive (spec §6/§7: a crashed task must still
    /// resolve, carrying a `crash` error, not wedge the batch).
    async fn handle_node_panic(
        self: Arc<Self>,
        node_key: &str,
        started_at: DateTime<Utc>,
        join_err: tokio::task::JoinError,
        batch: &Arc<BatchState>,
    ) {
        let Some(node) = self.in_progress.get(node_key).map(|entry| entry.value().clone()) else {
            // Already completed and removed by the time we observed the join error.
            return;
        };

        let completed_at = self.clock.now();
        let message = if join_err.is_panic() {
            let payload = join_err.into_panic();
            if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "task panicked".to_string()
            }
        } else {
            "task was cancelled".to_string()
        };

        error!(key = %node_key, %message, "node task crashed");
        let wrapped = Arc::new(SolverError::Crash(message));
        self.complete_task(&node, CompleteParams::failed(Some(started_at), completed_at, wrapped), batch);
        self.trigger_loop(batch);
    }

    fn complete_task(self: &Arc<Self>, node: &Arc<Node>, params: CompleteParams, batch: &Arc<BatchState>) -> GraphResult {
        let is_error = params.error.is_some();
        let result = node.complete(params, self, &batch.aborted_keys);
        self.in_progress.remove(&node.key());
        self.pending_nodes.remove(&node.key());

        match node.node_kind() {
            NodeKind::Status => {
                self.events.emit(Event::StatusComplete { result: result.clone() });
            }
            NodeKind::Process => {
                if is_error {
                    if let Some(error) = result.error.clone() {
                        self.events.emit(Event::TaskError { key: node.task.key(), error });
                    }
                } else {
                    self.events.emit(Event::TaskComplete { result: result.clone() });
                }
                self.events.emit(Event::Processed { result: result.clone() });
            }
            NodeKind::Request => {}
        }

        result
    }

    fn complete_request(self: &Arc<Self>, request: &Arc<Node>, params: CompleteParams, batch: &Arc<BatchState>) {
        let result = request.complete(params, self, &batch.aborted_keys);
        if result.success {
            if let Some(state) = &result.state {
                if state.is_ready() {
                    self.events.emit(Event::Ready { result });
                }
            }
        }
    }

    fn evaluate_requests(self: &Arc<Self>, batch: &Arc<BatchState>) {
        let snapshot: Vec<Arc<Node>> = batch.requests.iter().map(|entry| entry.value().clone()).collect();
        for request in snapshot {
            if request.is_complete() {
                continue;
            }

            let status_only = matches!(&request.role, NodeRole::Request { status_only: true, .. });
            let status_node = self.get_or_create_status(&request.task);
            let status = status_node.result();

            match status {
                Some(status_result) if status_result.aborted || status_result.error.is_some() => {
                    self.complete_request(&request, CompleteParams::mirroring(&status_result), batch);
                }
                Some(status_result) if status_only => {
                    self.complete_request(&request, CompleteParams::mirroring(&status_result), batch);
                }
                None => {
                    self.ensure_pending_node(&status_node, &request);
                }
                Some(status_result)
                    if status_result.state.as_ref().map(|s| s.is_ready()).unwrap_or(false) && !request.task.force() =>
                {
                    self.complete_request(&request, CompleteParams::mirroring(&status_result), batch);
                }
                Some(_) => {
                    let process_node = self.get_or_create_process(&request.task);
                    match process_node.result() {
                        Some(process_result) => {
                            self.complete_request(&request, CompleteParams::mirroring(&process_result), batch);
                        }
                        None => {
                            self.ensure_pending_node(&process_node, &request);
                        }
                    }
                }
            }
        }
    }

    fn expand_pending(&self) {
        let snapshot: Vec<Arc<Node>> = self.pending_nodes.iter().map(|entry| entry.value().clone()).collect();
        for node in snapshot {
            for dep in node.remaining_dependencies(self) {
                self.ensure_pending_node(&dep, &node);
            }
        }
    }

    fn build_pending_graph(&self) -> Result<DependencyGraph<()>> {
        let mut graph = DependencyGraph::new();
        let snapshot: Vec<Arc<Node>> = self.pending_nodes.iter().map(|entry| entry.value().clone()).collect();
        for node in &snapshot {
            graph.add_node(node.key(), ());
        }
        for node in &snapshot {
            for dep in node.remaining_dependencies(self) {
                if self.pending_nodes.contains_key(&dep.key()) {
                    graph.add_dependency(&node.key(), &dep.key()).map_err(|err| match err {
                        GraphError::NodeNotFound(key) => SolverError::Internal(format!("pending graph missing node {key}")),
                        GraphError::CycleDetected(_) => unreachable!("add_dependency never itself detects cycles"),
                    })?;
                }
            }
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_concurrent_batches_opt_in() {
        let config = SolverConfig { allow_concurrent_batches: true, ..SolverConfig::default() };
        let err = GraphSolver::new(config).unwrap_err();
        assert!(matches!(err, SolverError::Internal(_)));
    }
}
