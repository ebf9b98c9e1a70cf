//! Crate-level error taxonomy.
//!
//! Mirrors the wire-visible error tags of §6: `graph`, `crash`, domain-specific
//! (preserved verbatim from the task body), `circular-dependencies`, `internal`.

use std::sync::Arc;

use thiserror::Error;

use crate::graph::Cycle;
use crate::results::GraphResults;

/// Result type used throughout the solver.
pub type Result<T> = std::result::Result<T, SolverError>;

/// Top-level error type for the solver core.
#[derive(Error, Debug)]
pub enum SolverError {
    /// A scheduler-internal bug surfaced as an `abort` (not a task failure).
    #[error("internal solver error: {0}")]
    Internal(String),

    /// A task body panicked or returned a non-domain error ("crash", wrapped as
    /// a `graph` error per §6/§7).
    #[error("task crashed: {0}")]
    Crash(String),

    /// A task body's own domain error, preserved as-is.
    #[error("{0}")]
    Domain(#[from] anyhow::Error),

    /// Cycle(s) detected while ordering the pending-node graph.
    #[error("circular dependencies detected:\n{}", format_cycles(.0))]
    CircularDependencies(Vec<Cycle>),

    /// Unknown key passed to a `GraphResults` accessor.
    #[error("unknown task key: {0}")]
    UnknownKey(String),

    /// JSON (de)serialization failure, e.g. while reading/writing a
    /// tree-version cache file.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure reading/writing the `.garden-version` cache file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_cycles(cycles: &[Cycle]) -> String {
    cycles
        .iter()
        .map(|c| format!("  {}", c.describe()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Aggregated end-of-batch failure (§4.F/§7): one message per failed or
/// aborted request, plus the original wrapped errors for programmatic access.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct GraphResultError {
    /// Human-readable, newline-joined summary (`" ↳ <description>: <msg>"` per
    /// line).
    pub message: String,

    /// The results collected so far (possibly incomplete, in the
    /// `throw_on_error` fast-fail case).
    pub results: GraphResults,

    /// The original errors that contributed to this aggregate, in the order
    /// they were encountered. `Arc`-wrapped so a `GraphResult` can cheaply
    /// carry a clone of the error that produced it (idempotent `complete`
    /// must be able to return the same value twice) while `SolverError`
    /// itself stays a plain `thiserror` enum.
    pub wrapped_errors: Vec<Arc<SolverError>>,
}

impl GraphResultError {
    /// Build the fail-fast (`throw_on_error`) variant: a single failure.
    pub fn fail_fast(description: &str, err: Arc<SolverError>, results: GraphResults) -> Self {
        let message = format!("Failed to complete task '{description}': {err}");
        Self {
            message,
            results,
            wrapped_errors: vec![err],
        }
    }

    /// Build the aggregate (end-of-batch) variant from a list of
    /// `(description, error_message)` pairs, where `error_message` is `None`
    /// for aborted-without-error nodes.
    pub fn aggregate(
        failures: Vec<(String, Option<String>)>,
        wrapped_errors: Vec<Arc<SolverError>>,
        results: GraphResults,
    ) -> Self {
        let mut message = String::from("Failed to complete one or more tasks:\n");
        for (description, err_message) in &failures {
            let reason = err_message.as_deref().unwrap_or("[ABORTED]");
            message.push_str(&format!(" \u{21b3} {description}: {reason}\n"));
        }
        Self {
            message,
            results,
            wrapped_errors,
        }
    }
}
