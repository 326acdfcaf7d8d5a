//! The COM's synchronous, typed event bus (`spec.md` §4.4's "event
//! bus" row and design notes' "event emitter with wildcard/typed
//! events"). Listener exceptions (panics) are caught and logged rather
//! than unwinding through the mutator, matching the teacher's pattern
//! of isolating hook/listener failures (`HookRegistry`).

use std::panic::AssertUnwindSafe;
use std::sync::Mutex;

use engine_types::{Pid, SectionId, ToolUseId};
use serde_json::Value;

/// One event emitted by the COM. Mutation order = emission order;
/// emission returns only after every listener has run.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum ComEvent {
    /// A message was added to the timeline or system-message buffer.
    MessageAdded {
        /// Whether it routed to the system-message buffer instead of
        /// the timeline.
        is_system: bool,
    },
    /// The timeline changed (an entry was added).
    TimelineModified,
    /// A section was added or updated. `created` distinguishes a
    /// brand-new id from a merge into an existing one.
    SectionUpdated {
        /// The section's id.
        id: SectionId,
        /// Whether this is the section's first contribution.
        created: bool,
    },
    /// A tool was registered.
    ToolRegistered {
        /// The tool's name.
        name: String,
    },
    /// A tool was removed.
    ToolRemoved {
        /// The tool's name.
        name: String,
    },
    /// A shared-state key changed.
    StateChanged {
        /// The key.
        key: String,
        /// The new value.
        value: Value,
        /// The previous value, if any.
        previous: Option<Value>,
    },
    /// Free-form metadata changed.
    MetadataChanged {
        /// The key.
        key: String,
        /// The new value.
        value: Value,
    },
    /// The active model adapter changed.
    ModelChanged {
        /// The new model identifier.
        model: String,
    },
    /// The active model adapter was cleared.
    ModelUnset,
    /// A message was queued for delivery at the start of the next tick.
    ExecutionMessage,
    /// `clear()` ran.
    StateCleared,
    /// A tool confirmation was requested.
    ToolConfirmationRequired {
        /// The pending call's id.
        tool_use_id: ToolUseId,
    },
    /// A reserved-namespace telemetry event: the start, end, or error
    /// of one traced operation (`proc:start`/`proc:end`/`proc:error`),
    /// per `SPEC_FULL.md` §6 — one bus, not two.
    Procedure {
        /// Operation name (e.g. `"tick"`, `"tool:bash"`, `"model:generate"`).
        name: String,
        /// The owning execution, if known.
        pid: Option<Pid>,
        /// Which phase of the operation this event marks.
        phase: ProcedurePhase,
    },
}

/// Which phase of a traced operation a [`ComEvent::Procedure`] marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedurePhase {
    /// The operation started.
    Start,
    /// The operation completed successfully.
    End,
    /// The operation failed.
    Error,
}

type Listener = Box<dyn Fn(&ComEvent) + Send + Sync>;

/// Synchronous multi-listener dispatcher. `clear()` on the owning COM
/// does **not** remove listeners (per `spec.md` §4.4's invariant).
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<Listener>>,
}

impl EventBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns nothing resembling a token: this
    /// bus does not support per-listener removal (only whole-bus
    /// lifetime), matching the COM-level usage in `spec.md` where
    /// listeners are process-lifetime observers (exporters, UIs).
    pub fn subscribe(&self, listener: Listener) {
        self.listeners.lock().expect("event bus poisoned").push(listener);
    }

    /// Emit an event to every listener, in subscription order.
    /// Listener panics are caught and logged, never propagated.
    pub fn emit(&self, event: ComEvent) {
        let listeners = self.listeners.lock().expect("event bus poisoned");
        for listener in listeners.iter() {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(&event)));
            if result.is_err() {
                tracing::error!(?event, "engine.com.listener_panicked");
            }
        }
    }

    /// Number of registered listeners (observability/tests).
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().expect("event bus poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn listeners_observe_every_emission_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        bus.subscribe(Box::new(move |e| {
            if let ComEvent::StateChanged { key, .. } = e {
                seen2.lock().unwrap().push(key.clone());
            }
        }));
        bus.emit(ComEvent::StateChanged { key: "a".into(), value: Value::Null, previous: None });
        bus.emit(ComEvent::StateChanged { key: "b".into(), value: Value::Null, previous: None });
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn a_panicking_listener_does_not_stop_later_ones() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Box::new(|_| panic!("boom")));
        let count2 = Arc::clone(&count);
        bus.subscribe(Box::new(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        bus.emit(ComEvent::StateCleared);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
