//! `GraphResult` / `GraphResults` (spec §3/§4.D).
//!
//! Grounded on the teacher's `ExecutionMetadata`/`ExecutionResult` shape
//! (`src/engine/executor.rs`: status enum + timestamps + optional error) and
//! the keyed-collection discipline of `src/checkpoint/mod.rs`'s in-memory
//! store (reject unknown keys rather than silently inserting).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, SolverError};
use crate::task::{TaskKey, TaskOutcome, TaskState};

/// Which node variant produced a [`GraphResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A user's request to complete a task.
    Request,
    /// A task's status-resolution node.
    Status,
    /// A task's process (execution) node.
    Process,
}

/// Immutable record describing a node's completion (spec §3 "GraphResult").
///
/// Invariants upheld by construction (never by the caller): `did_run` is only
/// ever `true` for `NodeKind::Process`; `success` is always `!error.is_some()
/// && !aborted`; `processed` is always `node_type == NodeKind::Process`.
#[derive(Debug, Clone, Serialize)]
pub struct GraphResult {
    /// Which node variant this result came from.
    #[serde(rename = "type")]
    pub node_type: NodeKind,
    /// Human-readable description of the underlying task.
    pub description: String,
    /// `kind.name` key of the underlying task.
    pub key: TaskKey,
    /// The task's bare name.
    pub name: String,
    /// Results of this node's own dependencies, for inspection/debugging.
    #[serde(skip)]
    pub dependency_results: GraphResults,
    /// True if this node was cancelled because a dependency failed.
    pub aborted: bool,
    /// True only for a Process node whose body actually executed (i.e. not
    /// short-circuited by a `ready` status).
    pub did_run: bool,
    /// Cache bookkeeping forwarded from the task's status/process outcome.
    pub cache_info: Option<Value>,
    /// When this node began executing (`None` for a node that never ran,
    /// e.g. one that was aborted before admission).
    pub started_at: Option<DateTime<Utc>>,
    /// When this node finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// The original error, if this node (or the node that caused its abort)
    /// failed directly. `None` for a merely-aborted dependant.
    #[serde(skip)]
    pub error: Option<Arc<SolverError>>,
    /// The task's content-addressed input version, if resolved.
    pub input_version: Option<String>,
    /// The task-defined output payload.
    pub outputs: Value,
    /// `!error.is_some() && !aborted`.
    pub success: bool,
    /// Optional attachment payload forwarded from the task outcome.
    pub attached: Option<Value>,
    /// Optional human-readable reason the process ran (or didn't).
    pub run_reason: Option<String>,
    /// `node_type == NodeKind::Process`.
    pub processed: bool,
    /// The reported task state (`ready`, `not-ready`, ...), if this result
    /// stems from an actual status/process outcome rather than an abort or
    /// an internal/crash error.
    #[serde(skip)]
    pub state: Option<TaskState>,
}

impl GraphResult {
    /// Whether `outputs` reports this result as the "processed" (did-run)
    /// case, for callers that check `outputs.processed` directly as in the
    /// spec's scenario tests.
    pub fn outputs_processed(&self) -> bool {
        self.did_run
    }

    /// Reconstruct the `TaskOutcome` this result was built from, for feeding
    /// back into `Task::process_dependencies`/`ProcessContext::status`. Only
    /// ever available for a successful (non-aborted, non-error) result.
    pub fn as_task_outcome(&self) -> Option<TaskOutcome> {
        let state = self.state.clone()?;
        Some(TaskOutcome {
            state,
            outputs: self.outputs.clone(),
            cache_info: self.cache_info.clone(),
            attached: self.attached.clone(),
            run_reason: self.run_reason.clone(),
        })
    }
}

/// Per-batch (or per-node-dependency) keyed result collector (spec §4.D).
///
/// Initialized with the full set of keys it will ever hold; `set_result`
/// rejects any key outside that set.
#[derive(Debug, Clone, Default)]
pub struct GraphResults {
    entries: HashMap<TaskKey, Option<GraphResult>>,
}

impl GraphResults {
    /// Build a results collector pre-populated with `None` for every key.
    pub fn new(keys: impl IntoIterator<Item = TaskKey>) -> Self {
        Self {
            entries: keys.into_iter().map(|k| (k, None)).collect(),
        }
    }

    /// An empty collector (used for `solve(&[])`).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Record the result for `key`. Errors if `key` was not part of the
    /// original key set.
    pub fn set_result(&mut self, key: &TaskKey, result: GraphResult) -> Result<()> {
        match self.entries.get_mut(key) {
            Some(slot) => {
                *slot = Some(result);
                Ok(())
            }
            None => Err(SolverError::UnknownKey(key.to_string())),
        }
    }

    /// Keys whose result is still unset.
    pub fn get_missing(&self) -> Vec<TaskKey> {
        self.entries
            .iter()
            .filter_map(|(k, v)| if v.is_none() { Some(k.clone()) } else { None })
            .collect()
    }

    /// The result for `key`, if resolved.
    pub fn get_result(&self, key: &TaskKey) -> Option<&GraphResult> {
        self.entries.get(key).and_then(|o| o.as_ref())
    }

    /// The full key→result map.
    pub fn get_map(&self) -> &HashMap<TaskKey, Option<GraphResult>> {
        &self.entries
    }

    /// Every result currently set, regardless of success/failure.
    pub fn values(&self) -> impl Iterator<Item = &GraphResult> {
        self.entries.values().filter_map(|o| o.as_ref())
    }

    /// Plain string-keyed map for external consumers.
    pub fn export(&self) -> HashMap<String, Option<GraphResult>> {
        self.entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Number of keys tracked (set or not).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
