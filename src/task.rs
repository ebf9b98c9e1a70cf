//! The user-supplied Task contract (spec §3/§6).
//!
//! Grounded on the teacher's external-collaborator trait shape
//! (`src/checkpoint/mod.rs`'s `Checkpointer`, `src/engine/traits.rs`'s
//! `ExecutionEngine`): an `async_trait` interface the embedding application
//! implements, returning this crate's own outcome/result types rather than
//! anything checkpoint- or LLM-specific.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::results::GraphResults;

/// `kind.name` identity for a task, shared by its Request/Status/Process
/// nodes (with a variant suffix added by the node layer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey(String);

impl TaskKey {
    /// Build the `kind.name` key for a task.
    pub fn new(kind: &str, name: &str) -> Self {
        Self(format!("{kind}.{name}"))
    }

    /// The raw `kind.name` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The state a task's status (or process) result reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Completed output already exists; absent `force`, processing is
    /// skipped.
    Ready,
    /// No valid output exists; processing must run.
    NotReady,
    /// Processing is already underway elsewhere (e.g. another process holds
    /// the task's lock).
    Processing,
    /// Any other scanner/task-specific status string not covered above.
    Other(String),
}

impl TaskState {
    /// True for the `ready` state specifically.
    pub fn is_ready(&self) -> bool {
        matches!(self, TaskState::Ready)
    }
}

/// The `{state, outputs, cacheInfo?, attached?, runReason?}` shape returned
/// by both `getStatus` and `process` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// The reported state.
    pub state: TaskState,
    /// Arbitrary task-defined output payload.
    pub outputs: Value,
    /// Optional cache bookkeeping, forwarded into the `GraphResult`.
    pub cache_info: Option<Value>,
    /// Optional attachment payload (e.g. a handle to a running process).
    pub attached: Option<Value>,
    /// Optional human-readable reason the process ran (or didn't).
    pub run_reason: Option<String>,
}

impl TaskOutcome {
    /// Build a minimal outcome with empty outputs and no extras.
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            outputs: Value::Object(Default::default()),
            cache_info: None,
            attached: None,
            run_reason: None,
        }
    }

    /// Builder-style outputs setter.
    pub fn with_outputs(mut self, outputs: Value) -> Self {
        self.outputs = outputs;
        self
    }

    /// Builder-style cache-info setter.
    pub fn with_cache_info(mut self, cache_info: Value) -> Self {
        self.cache_info = Some(cache_info);
        self
    }
}

/// Parameters passed to `Task::process`.
pub struct ProcessContext {
    /// The task's already-resolved status result.
    pub status: TaskOutcome,
    /// Results of the task's process-dependencies.
    pub dependency_results: GraphResults,
    /// Whether this task was requested status-only (process should not have
    /// been reached in that case, but the flag is threaded through for task
    /// bodies that want to double-check).
    pub status_only: bool,
}

/// An opaque, user-supplied unit of work (spec §3).
///
/// Dependencies are expressed as other `Task` instances (not keys) so the
/// solver never needs an external registry to resolve them — exactly as
/// `statusDependencies()`/`processDependencies()` are specified to be "lazy
/// dependency enumerators" in §3, not key lists.
#[async_trait]
pub trait Task: Send + Sync + fmt::Debug {
    /// The type tag driving per-type concurrency grouping.
    fn kind(&self) -> &str;

    /// Unique name within a batch.
    fn name(&self) -> &str;

    /// When true, `process` runs even if status is `ready`.
    fn force(&self) -> bool;

    /// Content-addressed fingerprint of this task's inputs (spec §4.B).
    fn input_version(&self) -> String;

    /// Concurrency limit for this task's Status node's group.
    fn status_concurrency_limit(&self) -> usize;

    /// Concurrency limit for this task's Process node's group.
    fn process_concurrency_limit(&self) -> usize;

    /// Tasks whose *process* must complete before this task's status can be
    /// evaluated.
    fn status_dependencies(&self) -> Vec<Arc<dyn Task>>;

    /// Tasks whose *process* must complete before this task can process,
    /// given its resolved status. May depend on the status result (status-
    /// conditional dependencies).
    fn process_dependencies(&self, status: &TaskOutcome) -> Vec<Arc<dyn Task>>;

    /// Resolve the task's current status.
    async fn get_status(&self, dependency_results: GraphResults) -> Result<TaskOutcome>;

    /// Perform the task's work.
    async fn process(&self, ctx: ProcessContext) -> Result<TaskOutcome>;

    /// `kind.name` identity.
    fn key(&self) -> TaskKey {
        TaskKey::new(self.kind(), self.name())
    }

    /// Human-readable description used in aborted/failed-result messages.
    fn description(&self) -> String {
        format!("{} {}", self.kind(), self.name())
    }
}
