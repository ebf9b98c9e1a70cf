//! PublicAPI (spec §4.F): batch submission, solve-call serialization, and
//! throw-vs-aggregate failure policy.
//!
//! Grounded on the teacher's `BatchExecutor`/`ErrorHandlingPolicy`
//! (`src/batch/executor.rs`, `src/batch/error_handling.rs`): a thin
//! submission layer over the scheduler that owns the single outer
//! `oneshot`/`await` primitive per call — the teacher's "fan out, await a
//! single completion notification" shape, generalized to the Request-node
//! completion-handler fan-in this solver uses instead of a join-all.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{GraphResultError, Result, SolverError};
use crate::events::{Event, EventBus};
use crate::node::Node;
use crate::results::GraphResults;
use crate::solver::{BatchState, GraphSolver, SolverConfig};
use crate::task::Task;

/// A `solve()` invocation's input: the tasks to complete, whether to resolve
/// each request once its status is known (skipping process entirely), and
/// whether to fail fast on the first error.
pub struct SolveRequest {
    /// Tasks to request completion of (and, transitively, their dependencies).
    pub tasks: Vec<Arc<dyn Task>>,
    /// When true, each request resolves once its task's status is known,
    /// without ever triggering its process body.
    pub status_only: bool,
    /// When true, the first failing request rejects the whole call instead
    /// of being aggregated into the returned results.
    pub throw_on_error: bool,
}

impl SolveRequest {
    /// A normal (status+process, non-fail-fast) request for `tasks`.
    pub fn new(tasks: Vec<Arc<dyn Task>>) -> Self {
        Self { tasks, status_only: false, throw_on_error: false }
    }

    /// Builder-style `throw_on_error` setter.
    pub fn throw_on_error(mut self, value: bool) -> Self {
        self.throw_on_error = value;
        self
    }

    /// Builder-style `status_only` setter.
    pub fn status_only(mut self, value: bool) -> Self {
        self.status_only = value;
        self
    }
}

/// The outcome of a successful (non-rejected) `solve()` call: the per-task
/// results, plus an aggregated error if one or more tasks failed or were
/// aborted (without `throw_on_error`).
pub struct SolveOutcome {
    /// Every requested task's result (and `None` for any task the batch
    /// somehow failed to resolve, which should not happen outside a bug).
    pub results: GraphResults,
    /// Set when one or more requests failed or were aborted.
    pub error: Option<GraphResultError>,
}

enum SolveSignal {
    Resolved(GraphResults, Option<GraphResultError>),
    Rejected(GraphResultError),
}

struct SolveState {
    results: GraphResults,
    throw_on_error: bool,
    sender: Option<tokio::sync::oneshot::Sender<SolveSignal>>,
}

/// The solver's public entry point (spec §4.F).
pub struct Solver {
    inner: Arc<GraphSolver>,
}

impl Solver {
    /// Build a solver with the system wall clock.
    pub fn new(config: SolverConfig) -> Result<Self> {
        Ok(Self { inner: GraphSolver::new(config)? })
    }

    /// Build a solver with an injected clock (for deterministic tests).
    pub fn with_clock(config: SolverConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self { inner: GraphSolver::with_clock(config, clock)? })
    }

    /// The solver's event bus, for observing scheduling lifecycle events.
    pub fn events(&self) -> &EventBus {
        self.inner.events()
    }

    /// Empty no-op, preserved per spec §9 open question 2.
    pub fn clear_cache(&self) {
        self.inner.clear_cache()
    }

    /// Drive `request`'s tasks (and their transitive dependencies) to
    /// completion.
    ///
    /// `solve(&[])` (an empty task list) returns immediately. Otherwise the
    /// call is serialized against any other in-flight `solve()` on this
    /// instance (spec §9 open question 1: batches never run concurrently).
    #[instrument(skip(self, request), fields(task_count = request.tasks.len(), status_only = request.status_only, throw_on_error = request.throw_on_error))]
    pub async fn solve(&self, request: SolveRequest) -> std::result::Result<SolveOutcome, GraphResultError> {
        if request.tasks.is_empty() {
            debug!("solve called with an empty task list, returning immediately");
            return Ok(SolveOutcome { results: GraphResults::empty(), error: None });
        }

        let _guard = self.inner.solve_lock.lock().await;

        let batch_id = Uuid::new_v4().to_string();
        info!(%batch_id, task_count = request.tasks.len(), "starting solve batch");
        let batch = BatchState::new(batch_id.clone());

        let results = GraphResults::new(request.tasks.iter().map(|t| t.key()));
        let (tx, rx) = tokio::sync::oneshot::channel::<SolveSignal>();
        let state = Arc::new(Mutex::new(SolveState { results, throw_on_error: request.throw_on_error, sender: Some(tx) }));

        let handler_state = state.clone();
        let handler_batch = batch.clone();
        let complete_handler: Arc<dyn Fn(crate::results::GraphResult) + Send + Sync> = Arc::new(move |result| {
            handle_request_completion(&handler_state, &handler_batch, result);
        });

        for task in &request.tasks {
            let request_node = Node::new_request(task.clone(), batch.batch_id.clone(), request.status_only, complete_handler.clone());
            batch.requests.insert(task.key().to_string(), request_node);
        }

        let abort_state = state.clone();
        let abort_batch = batch.clone();
        let abort_handler_id = self.inner.events().on(move |event| {
            if let Event::Abort { error } = event {
                handle_abort(&abort_state, &abort_batch, error.clone());
            }
        });

        self.inner.start(&batch);

        let signal = rx.await.unwrap_or_else(|_| {
            SolveSignal::Rejected(GraphResultError::fail_fast(
                "batch",
                Arc::new(SolverError::Internal("solve outcome channel closed without a result".into())),
                GraphResults::empty(),
            ))
        });

        self.inner.events().off(abort_handler_id);
        self.inner.clear_after_batch();

        match signal {
            SolveSignal::Resolved(results, error) => {
                if let Some(err) = &error {
                    tracing::warn!(%batch_id, %err, "solve batch completed with one or more failures");
                } else {
                    info!(%batch_id, "solve batch completed successfully");
                }
                Ok(SolveOutcome { results, error })
            }
            SolveSignal::Rejected(err) => {
                tracing::error!(%batch_id, %err, "solve batch rejected");
                Err(err)
            }
        }
    }
}

fn handle_abort(state: &Arc<Mutex<SolveState>>, batch: &Arc<BatchState>, error: Arc<SolverError>) {
    batch.mark_aborted();
    let mut guard = state.lock();
    if let Some(tx) = guard.sender.take() {
        let built = GraphResultError::fail_fast("batch", error, guard.results.clone());
        let _ = tx.send(SolveSignal::Rejected(built));
    }
}

fn handle_request_completion(state: &Arc<Mutex<SolveState>>, batch: &Arc<BatchState>, result: crate::results::GraphResult) {
    if batch.is_aborted() {
        return;
    }

    let mut guard = state.lock();
    if guard.sender.is_none() {
        return;
    }

    let key = result.key.clone();
    let _ = guard.results.set_result(&key, result.clone());

    if guard.throw_on_error {
        if let Some(error) = result.error.clone() {
            let built = GraphResultError::fail_fast(&result.description, error, guard.results.clone());
            batch.mark_aborted();
            if let Some(tx) = guard.sender.take() {
                let _ = tx.send(SolveSignal::Rejected(built));
            }
            return;
        }
    }

    if !guard.results.get_missing().is_empty() {
        return;
    }

    let mut lines: Vec<(String, Option<String>)> = Vec::new();
    let mut wrapped = Vec::new();
    for r in guard.results.values() {
        if let Some(error) = &r.error {
            lines.push((r.description.clone(), Some(error.to_string())));
            wrapped.push(error.clone());
        } else if r.aborted {
            lines.push((r.description.clone(), None));
        }
    }

    let outcome = if lines.is_empty() {
        SolveSignal::Resolved(guard.results.clone(), None)
    } else {
        let built = GraphResultError::aggregate(lines, wrapped, guard.results.clone());
        SolveSignal::Resolved(guard.results.clone(), Some(built))
    };

    if let Some(tx) = guard.sender.take() {
        let _ = tx.send(outcome);
    }
}
