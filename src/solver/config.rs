//! Solver construction options (spec §9 re-architecture note: "a
//! configuration struct passed at construction with explicitly enumerated
//! options", replacing process-wide environment parsing for limits).
//!
//! Grounded on the teacher's `ExecutorConfig`/`EngineConfig` builder structs
//! (`src/engine/mod.rs`) which likewise pair a `Default` impl with a single
//! `from_env()` constructor that does all environment parsing in one place.

/// Options controlling a [`crate::solver::GraphSolver`] instance.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// The hard global concurrency cap, applied after per-group capping.
    pub hard_concurrency_limit: u16,
    /// Reserved: allowing multiple concurrently in-flight `solve()` batches
    /// against one solver instance. The source this crate is modeled on
    /// marks this as an explicitly unresolved future direction (spec §9 open
    /// question 1); this crate preserves the conservative serial-batch
    /// behavior and rejects construction if this is set, rather than
    /// silently ignoring it.
    pub allow_concurrent_batches: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            hard_concurrency_limit: 50,
            allow_concurrent_batches: false,
        }
    }
}

impl SolverConfig {
    /// Build a config from environment variables, parsing `
    /// GARDEN_HARD_CONCURRENCY_LIMIT` once at construction (as opposed to
    /// scattering `env::var` calls through the scheduling loop).
    pub fn from_env() -> Self {
        let hard_concurrency_limit = std::env::var("GARDEN_HARD_CONCURRENCY_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50);
        Self {
            hard_concurrency_limit,
            allow_concurrent_batches: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hard_limit_is_fifty() {
        assert_eq!(SolverConfig::default().hard_concurrency_limit, 50);
    }
}
