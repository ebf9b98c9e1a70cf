//! # task-graph-solver
//!
//! A dependency-graph task solver: given a batch of tasks, each with its own
//! lazily-enumerated dependencies, drives every task through a two-phase
//! `status` → `process` lifecycle while enforcing topological ordering,
//! per-type concurrency caps, fail-fast cancellation, and deduplication of
//! in-flight work. Also exposes a deterministic, order-insensitive
//! content-hash version scheme used to decide whether a task's prior result
//! remains valid.
//!
//! ## Layout
//!
//! - [`graph`] — generic dependency DAG: topological ordering and minimal-
//!   cycle detection.
//! - [`version`] — the content-addressed version hasher and its external
//!   collaborators (`FileScanner`, `TreeCache`).
//! - [`task`] — the `Task` contract callers implement.
//! - [`results`] — `GraphResult`/`GraphResults`, the per-batch result model.
//! - [`events`] — the typed scheduler-lifecycle event bus.
//! - [`node`] — the Request/Status/Process node state machine.
//! - [`solver`] — `GraphSolver`, the scheduling loop.
//! - [`api`] — `Solver::solve`, the public entry point.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Solver construction and outcome errors.
pub mod error;

/// Injectable wall-clock abstraction.
pub mod clock;

/// Generic dependency DAG (spec §4.A).
pub mod graph;

/// Content-addressed version hashing and its collaborators (spec §4.B/§6).
pub mod version;

/// The user-supplied `Task` contract (spec §3).
pub mod task;

/// Per-batch keyed result collector (spec §4.D).
pub mod results;

/// Typed scheduler-lifecycle event bus (spec §4.G).
pub mod events;

/// The Request/Status/Process node state machine (spec §4.C).
pub mod node;

/// The scheduling loop (spec §4.E).
pub mod solver;

/// Batch submission and solve-call serialization (spec §4.F).
pub mod api;

pub use api::{SolveOutcome, SolveRequest, Solver};
pub use clock::{Clock, FrozenClock, SystemClock};
pub use error::{GraphResultError, Result, SolverError};
pub use events::{Event, EventBus, HandlerId};
pub use graph::{Cycle, DependencyGraph, GraphError};
pub use node::Node;
pub use results::{GraphResult, GraphResults, NodeKind};
pub use solver::{GraphSolver, SolverConfig};
pub use task::{ProcessContext, Task, TaskKey, TaskOutcome, TaskState};
pub use version::{
    compute_input_version, config_hash_bytes, omit_runtime_fields, DependencyVersion, FileScanner, InMemoryTreeCache,
    TreeCache, TreeCacheTags, TreeVersion,
};
