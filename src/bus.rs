//! Process-wide keyed publish/subscribe.
//!
//! The bus is independent of any component tree: handlers register under a
//! topic key and [`EventBus::emit`] fans a payload out to every handler in
//! registration order. Emission works on a snapshot, so handlers that
//! register or remove listeners mid-emit never affect the cycle that is
//! already running, and a nested emit for a topic already being emitted is
//! dropped outright — that is what breaks handler-triggered emission loops.
//!
//! The runtime is single-threaded, so the process-wide instance
//! lives in a thread local and handlers are plain `Rc` closures.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error};

/// An opaque event payload.
///
/// Generic at the caller boundary: publishers wrap any `'static` value and
/// subscribers recover it with [`Payload::downcast_ref`]. The engine never
/// looks inside.
#[derive(Clone)]
pub struct Payload(Rc<dyn Any>);

impl Payload {
    /// Wraps a value.
    #[must_use]
    pub fn new<T: 'static>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// A payload carrying nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(())
    }

    /// Recovers the carried value, if it has the expected type.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Payload(..)")
    }
}

/// A handler registered with the bus. Identity is the `Rc` pointer:
/// re-registering the same handler is a no-op and removal matches by
/// pointer equality.
pub type BusHandler = Rc<dyn Fn(&Payload) -> anyhow::Result<()>>;

/// A keyed publish/subscribe table.
#[derive(Default)]
pub struct EventBus {
    topics: RefCell<HashMap<String, Vec<BusHandler>>>,
    in_flight: RefCell<HashSet<String>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topics = self.topics.borrow();
        f.debug_struct("EventBus")
            .field("topics", &topics.len())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `topic`. Idempotent for the same handler
    /// reference; otherwise handlers are invoked in registration order.
    pub fn listen(&self, topic: &str, handler: BusHandler) {
        let mut topics = self.topics.borrow_mut();
        let entry = topics.entry(topic.to_owned()).or_default();
        if !entry.iter().any(|existing| Rc::ptr_eq(existing, &handler)) {
            entry.push(handler);
        }
    }

    /// Removes `handler` from `topic` if present; a no-op otherwise.
    pub fn unlisten(&self, topic: &str, handler: &BusHandler) {
        let mut topics = self.topics.borrow_mut();
        if let Some(entry) = topics.get_mut(topic) {
            entry.retain(|existing| !Rc::ptr_eq(existing, handler));
            if entry.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Synchronously invokes every handler currently registered for
    /// `topic`, in registration order, against a snapshot taken when the
    /// call starts. A failing handler is reported and skipped; the rest of
    /// the fan-out still runs. Re-entrant emits for the same topic are
    /// dropped.
    pub fn emit(&self, topic: &str, payload: &Payload) {
        if !self.in_flight.borrow_mut().insert(topic.to_owned()) {
            debug!(topic, "dropping re-entrant emit");
            return;
        }
        let _guard = InFlightGuard { bus: self, topic };

        let snapshot: Vec<BusHandler> = self
            .topics
            .borrow()
            .get(topic)
            .cloned()
            .unwrap_or_default();
        for handler in snapshot {
            if let Err(err) = handler(payload) {
                error!(topic, error = %err, "event handler failed");
            }
        }
    }

    /// Number of handlers currently registered for `topic`.
    #[must_use]
    pub fn handler_count(&self, topic: &str) -> usize {
        self.topics.borrow().get(topic).map_or(0, Vec::len)
    }
}

/// Clears the in-flight mark even if a handler panics, so the topic is not
/// wedged for the rest of the process.
struct InFlightGuard<'a> {
    bus: &'a EventBus,
    topic: &'a str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.bus.in_flight.borrow_mut().remove(self.topic);
    }
}

thread_local! {
    static BUS: EventBus = EventBus::new();
}

/// Runs `f` against the process-wide bus.
pub fn with<R>(f: impl FnOnce(&EventBus) -> R) -> R {
    BUS.with(f)
}

/// Registers `handler` under `topic` on the process-wide bus.
pub fn listen(topic: &str, handler: BusHandler) {
    with(|bus| bus.listen(topic, handler));
}

/// Removes `handler` from `topic` on the process-wide bus.
pub fn unlisten(topic: &str, handler: &BusHandler) {
    with(|bus| bus.unlisten(topic, handler));
}

/// Emits `detail` under `topic` on the process-wide bus.
pub fn emit<T: 'static>(topic: &str, detail: T) {
    let payload = Payload::new(detail);
    with(|bus| bus.emit(topic, &payload));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recording_handler(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> BusHandler {
        let log = Rc::clone(log);
        Rc::new(move |_| {
            log.borrow_mut().push(name);
            Ok(())
        })
    }

    #[test]
    fn fan_out_runs_in_registration_order_with_payload() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for name in ["h1", "h2"] {
            let seen = Rc::clone(&seen);
            bus.listen(
                "saved",
                Rc::new(move |payload| {
                    let detail: &u32 = payload.downcast_ref().expect("payload type");
                    seen.borrow_mut().push((name, *detail));
                    Ok(())
                }),
            );
        }
        bus.emit("saved", &Payload::new(7_u32));

        assert_eq!(*seen.borrow(), vec![("h1", 7), ("h2", 7)]);
    }

    #[test]
    fn listen_is_idempotent_per_reference() {
        let bus = EventBus::new();
        let handler: BusHandler = Rc::new(|_| Ok(()));
        bus.listen("k", Rc::clone(&handler));
        bus.listen("k", Rc::clone(&handler));
        assert_eq!(bus.handler_count("k"), 1);
    }

    #[test]
    fn unlisten_missing_handler_is_a_no_op() {
        let bus = EventBus::new();
        let handler: BusHandler = Rc::new(|_| Ok(()));
        bus.unlisten("k", &handler);
        assert_eq!(bus.handler_count("k"), 0);
    }

    #[test]
    fn nested_emit_for_same_topic_is_dropped() {
        let bus = Rc::new(EventBus::new());
        let calls = Rc::new(Cell::new(0));

        let inner_bus = Rc::clone(&bus);
        let inner_calls = Rc::clone(&calls);
        bus.listen(
            "saved",
            Rc::new(move |payload| {
                inner_calls.set(inner_calls.get() + 1);
                // Would recurse forever without the guard.
                inner_bus.emit("saved", payload);
                Ok(())
            }),
        );
        bus.emit("saved", &Payload::empty());

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn emit_uses_a_snapshot_of_the_handler_set() {
        let bus = Rc::new(EventBus::new());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let other = recording_handler(&seen, "other");
        let remover_bus = Rc::clone(&bus);
        let other_for_removal = Rc::clone(&other);
        let remover: BusHandler = Rc::new(move |_| {
            remover_bus.unlisten("k", &other_for_removal);
            Ok(())
        });

        bus.listen("k", remover);
        bus.listen("k", Rc::clone(&other));
        bus.emit("k", &Payload::empty());

        // `other` was removed mid-emit but the running cycle still saw it.
        assert_eq!(*seen.borrow(), vec!["other"]);
        assert_eq!(bus.handler_count("k"), 1);
    }

    #[test]
    fn failing_handler_does_not_stop_the_fan_out() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        bus.listen("k", Rc::new(|_| anyhow::bail!("boom")));
        bus.listen("k", recording_handler(&seen, "after"));
        bus.emit("k", &Payload::empty());

        assert_eq!(*seen.borrow(), vec!["after"]);
    }

    #[test]
    fn topics_are_independent() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        bus.listen("a", recording_handler(&seen, "a"));
        bus.listen("b", recording_handler(&seen, "b"));
        bus.emit("b", &Payload::empty());
        assert_eq!(*seen.borrow(), vec!["b"]);
    }
}
