//! A swappable clock, the same shape as the teacher's `Checkpointer` trait
//! (an external-collaborator trait with one production and one test
//! implementation): production code reads wall time, tests freeze it so `S1`'s
//! `startedAt == completedAt == now` assertion is exact rather than "close
//! enough".

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Supplies the current time to the solver and its nodes.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The default clock, backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always returns a fixed instant, or one advanced manually.
/// Used by tests that need `startedAt == completedAt` to hold exactly.
#[derive(Debug)]
pub struct FrozenClock {
    micros: AtomicI64,
}

impl FrozenClock {
    /// Freeze the clock at the given instant.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            micros: AtomicI64::new(instant.timestamp_micros()),
        }
    }

    /// Freeze the clock at the current wall-clock instant.
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Advance the frozen instant by `micros` microseconds.
    pub fn advance(&self, micros: i64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        let micros = self.micros.load(Ordering::SeqCst);
        DateTime::from_timestamp_micros(micros).expect("frozen instant is always valid")
    }
}
