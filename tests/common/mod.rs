//! Shared `Task` fixture used across the integration test suite.
//!
//! Grounded on the teacher's `MockNode`/test-double pattern scattered through
//! its own `tests/*.rs` (a minimal struct implementing the trait under test,
//! configured via closures rather than a trait object hierarchy).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use serde_json::json;
use task_graph_solver::{ProcessContext, Result, SolverError, Task, TaskKey, TaskOutcome, TaskState};

static TRACING_INIT: Once = Once::new();

/// Installs a `tracing-subscriber` fmt layer the first time any test in a
/// binary calls it, so the solver's `debug!`/`info!`/`warn!`/`error!` calls
/// are visible under `RUST_LOG=task_graph_solver=debug cargo test -- --nocapture`
/// instead of being silently dropped (the crate itself never installs one).
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

type StatusFn = dyn Fn() -> Result<TaskOutcome> + Send + Sync;
type ProcessFn = dyn Fn(&ProcessContext) -> Result<TaskOutcome> + Send + Sync;

/// A configurable `Task` double: every hook has a sensible default, override
/// only what a given test cares about.
pub struct StubTask {
    pub kind: String,
    pub name: String,
    pub force: bool,
    pub input_version: String,
    pub status_concurrency_limit: usize,
    pub process_concurrency_limit: usize,
    pub status_deps: Vec<Arc<dyn Task>>,
    pub process_deps: Vec<Arc<dyn Task>>,
    pub on_status: Box<StatusFn>,
    pub on_process: Box<ProcessFn>,
    pub process_calls: Arc<AtomicUsize>,
}

impl std::fmt::Debug for StubTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubTask").field("kind", &self.kind).field("name", &self.name).finish()
    }
}

impl StubTask {
    /// A `not-ready` task named `name` of kind `test`, with no dependencies.
    pub fn new(name: &str) -> Self {
        init_tracing();
        Self {
            kind: "test".to_string(),
            name: name.to_string(),
            force: false,
            input_version: format!("v-{name}"),
            status_concurrency_limit: 10,
            process_concurrency_limit: 10,
            status_deps: vec![],
            process_deps: vec![],
            on_status: Box::new(|| Ok(TaskOutcome::new(TaskState::NotReady))),
            on_process: Box::new(|_ctx| Ok(TaskOutcome::new(TaskState::NotReady).with_outputs(json!({"processed": true})))),
            process_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Builder: start the task already `ready`.
    pub fn ready(mut self) -> Self {
        self.on_status = Box::new(|| Ok(TaskOutcome::new(TaskState::Ready).with_outputs(json!({"processed": false}))));
        self
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_limits(mut self, status: usize, process: usize) -> Self {
        self.status_concurrency_limit = status;
        self.process_concurrency_limit = process;
        self
    }

    pub fn with_process_dependencies(mut self, deps: Vec<Arc<dyn Task>>) -> Self {
        self.process_deps = deps;
        self
    }

    pub fn with_status_dependencies(mut self, deps: Vec<Arc<dyn Task>>) -> Self {
        self.status_deps = deps;
        self
    }

    /// Make `process` throw (spec S4/S5: a crashing task body).
    pub fn crashing(mut self) -> Self {
        self.on_process = Box::new(|_ctx| Err(SolverError::Domain(anyhow::anyhow!("boom"))));
        self
    }

    pub fn with_process(mut self, f: impl Fn(&ProcessContext) -> Result<TaskOutcome> + Send + Sync + 'static) -> Self {
        self.on_process = Box::new(f);
        self
    }

    pub fn times_processed(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for StubTask {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn force(&self) -> bool {
        self.force
    }

    fn input_version(&self) -> String {
        self.input_version.clone()
    }

    fn status_concurrency_limit(&self) -> usize {
        self.status_concurrency_limit
    }

    fn process_concurrency_limit(&self) -> usize {
        self.process_concurrency_limit
    }

    fn status_dependencies(&self) -> Vec<Arc<dyn Task>> {
        self.status_deps.clone()
    }

    fn process_dependencies(&self, _status: &TaskOutcome) -> Vec<Arc<dyn Task>> {
        self.process_deps.clone()
    }

    async fn get_status(&self, _dependency_results: task_graph_solver::GraphResults) -> Result<TaskOutcome> {
        (self.on_status)()
    }

    async fn process(&self, ctx: ProcessContext) -> Result<TaskOutcome> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        (self.on_process)(&ctx)
    }
}

/// Shorthand for building a batch-ready `Arc<dyn Task>` key lookup.
pub fn key_of(task: &Arc<dyn Task>) -> TaskKey {
    task.key()
}
