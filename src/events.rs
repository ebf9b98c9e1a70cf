//! Typed event bus (spec §4.G/§6/§9): the re-architected replacement for a
//! stringly-typed emitter. A closed `Event` enum carries structured payloads;
//! handlers run synchronously, in registration order.
//!
//! Grounded on §9's explicit design note ("a typed event bus with a closed
//! set of event variants; handlers take structured payloads... strongly
//! recommended over stringly-typed events") and shaped after the teacher's
//! structured-record style in `src/engine/tracing.rs` (`Span`/`SpanEvent`
//! carry typed fields, never a bag of strings).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SolverError;
use crate::results::GraphResult;
use crate::task::TaskKey;

/// The closed set of scheduler lifecycle events (§4.G) plus the public
/// per-task events named in §6.
#[derive(Debug, Clone)]
pub enum Event {
    /// `solve()` has begun; about to run the first loop pass.
    Start,
    /// A loop pass is about to run (emitted after `Start` and after every
    /// node completion).
    Loop,
    /// A loop pass admitted this exact set of node keys to `in_progress`.
    Process {
        /// Keys admitted in this pass.
        keys: Vec<String>,
        /// Total in-progress count *after* admission.
        in_progress: usize,
    },
    /// An internal (non-task) scheduler error forced the batch to cancel.
    Abort {
        /// The error that triggered the abort.
        error: Arc<SolverError>,
    },
    /// A task's status resolution began.
    StatusStart {
        /// The task's key.
        key: TaskKey,
    },
    /// A task's status resolution completed.
    StatusComplete {
        /// The status node's result.
        result: GraphResult,
    },
    /// A task's process body began.
    TaskStart {
        /// The task's key.
        key: TaskKey,
    },
    /// A task's process body completed successfully.
    TaskComplete {
        /// The process node's result.
        result: GraphResult,
    },
    /// A task's process body failed.
    TaskError {
        /// The task's key.
        key: TaskKey,
        /// The error it failed with.
        error: Arc<SolverError>,
    },
    /// A request's underlying task reported `ready` on completion.
    Ready {
        /// The request node's result.
        result: GraphResult,
    },
    /// A process node finished (`didRun` may be true or false).
    Processed {
        /// The process node's result.
        result: GraphResult,
    },
}

/// Handle returned by [`EventBus::on`], used to unregister a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

type Handler = Box<dyn Fn(&Event) + Send + Sync>;

/// In-process, synchronous event bus. Handlers run in registration order and
/// must not block or re-enter the solver.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<(HandlerId, Handler)>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning an id usable with [`EventBus::off`].
    pub fn on(&self, handler: impl Fn(&Event) + Send + Sync + 'static) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.handlers.write().push((id, Box::new(handler)));
        id
    }

    /// Unregister a previously registered handler. A no-op if `id` is
    /// unknown (already removed, or from a different bus).
    pub fn off(&self, id: HandlerId) {
        self.handlers.write().retain(|(hid, _)| *hid != id);
    }

    /// Dispatch `event` to every registered handler, in registration order.
    pub fn emit(&self, event: Event) {
        let handlers = self.handlers.read();
        for (_, handler) in handlers.iter() {
            handler(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let order: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        bus.on(move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        bus.on(move |_| o2.lock().unwrap().push(2));

        bus.emit(Event::Start);
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn off_removes_handler() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0));
        let s = seen.clone();
        let id = bus.on(move |_| *s.lock().unwrap() += 1);

        bus.emit(Event::Start);
        bus.off(id);
        bus.emit(Event::Start);

        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
