//! Transaction and notification broker.
//!
//! Mutations always apply immediately; what the broker batches is their
//! *announcement*. Nested `begin_update`/`end_update` brackets collapse into
//! the outermost transaction, and the queued events flush exactly once when
//! it closes, in a fixed order:
//!
//! 1. `StepAdded`/`StepRemoved`, in call order
//! 2. at most one `ActiveStepChanged`
//! 3. `StepChanged`, in call order
//! 4. `PropertyChanged`, in call order
//!
//! There is no rollback: a failed mutation mid-bracket does not undo prior
//! mutations; callers re-validate state after any failure.

use crate::error::GraphError;
use crate::types::StepId;

/// Change events emitted by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// A step was attached.
    StepAdded(StepId),
    /// A step was removed.
    StepRemoved(StepId),
    /// The Active pointer moved.
    ActiveStepChanged {
        /// Previously active step.
        old: StepId,
        /// Newly active step.
        new: StepId,
    },
    /// A step's fields changed (title, description, resources, persons, tool).
    StepChanged(StepId),
    /// A single property changed on a step.
    PropertyChanged {
        /// The step whose property changed.
        step: StepId,
        /// The property key.
        key: String,
    },
    /// The whole graph was replaced from the persistence backend.
    StateReset,
}

/// Listener for graph change events.
///
/// Callbacks run synchronously on the thread that closes the outermost
/// transaction. Listeners must not re-enter mutation methods; doing so is a
/// contract violation reported as `ReentrantMutation`.
pub trait GraphListener {
    /// A step was attached to the graph.
    fn on_step_added(&mut self, _step: StepId) {}
    /// A step was removed from the graph.
    fn on_step_removed(&mut self, _step: StepId) {}
    /// A step's fields changed.
    fn on_step_changed(&mut self, _step: StepId) {}
    /// A property changed on a step.
    fn on_property_changed(&mut self, _step: StepId, _key: &str) {}
    /// The Active pointer moved.
    fn on_active_step_changed(&mut self, _old: StepId, _new: StepId) {}
    /// The graph was reloaded or replaced wholesale.
    fn on_state_reset(&mut self) {}
}

/// Batches change events under reentrant transaction brackets.
pub struct TransactionBroker {
    depth: u32,
    notifying: bool,
    pending: Vec<GraphEvent>,
    listeners: Vec<Box<dyn GraphListener + Send>>,
}

impl std::fmt::Debug for TransactionBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBroker")
            .field("depth", &self.depth)
            .field("notifying", &self.notifying)
            .field("pending", &self.pending.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for TransactionBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBroker {
    /// Create a broker with no listeners.
    pub fn new() -> Self {
        Self {
            depth: 0,
            notifying: false,
            pending: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Register a listener.
    pub fn add_listener(&mut self, listener: Box<dyn GraphListener + Send>) {
        self.listeners.push(listener);
    }

    /// Whether a transaction bracket is open.
    pub fn is_updating(&self) -> bool {
        self.depth > 0
    }

    /// Whether listener notification is in flight.
    pub fn is_notifying(&self) -> bool {
        self.notifying
    }

    /// Open a (possibly nested) transaction bracket.
    pub fn begin_update(&mut self) {
        self.depth += 1;
    }

    /// Close a bracket; flushes queued events when the outermost closes.
    pub fn end_update(&mut self) -> Result<(), GraphError> {
        if self.depth == 0 {
            return Err(GraphError::EndWithoutBegin);
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.flush();
        }
        Ok(())
    }

    /// Queue an event; emits immediately when no bracket is open.
    pub(crate) fn queue(&mut self, event: GraphEvent) {
        self.pending.push(event);
        if self.depth == 0 {
            self.flush();
        }
    }

    /// Deliver `StateReset` alone, discarding anything still pending.
    pub(crate) fn notify_reset(&mut self) {
        self.pending.clear();
        self.notifying = true;
        for listener in &mut self.listeners {
            listener.on_state_reset();
        }
        self.notifying = false;
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.pending);
        tracing::debug!(count = events.len(), "flushing graph events");

        // Coalesce active transitions: old from the first, new from the last.
        let mut active: Option<(StepId, StepId)> = None;
        for event in &events {
            if let GraphEvent::ActiveStepChanged { old, new } = event {
                active = Some(match active {
                    None => (*old, *new),
                    Some((first_old, _)) => (first_old, *new),
                });
            }
        }

        self.notifying = true;
        for event in &events {
            match event {
                GraphEvent::StepAdded(step) => {
                    for l in &mut self.listeners {
                        l.on_step_added(*step);
                    }
                }
                GraphEvent::StepRemoved(step) => {
                    for l in &mut self.listeners {
                        l.on_step_removed(*step);
                    }
                }
                _ => {}
            }
        }
        if let Some((old, new)) = active {
            if old != new {
                for l in &mut self.listeners {
                    l.on_active_step_changed(old, new);
                }
            }
        }
        for event in &events {
            if let GraphEvent::StepChanged(step) = event {
                for l in &mut self.listeners {
                    l.on_step_changed(*step);
                }
            }
        }
        for event in &events {
            if let GraphEvent::PropertyChanged { step, key } = event {
                for l in &mut self.listeners {
                    l.on_property_changed(*step, key);
                }
            }
        }
        self.notifying = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    fn id(n: u128) -> StepId {
        StepId::new(Uuid::from_u128(n))
    }

    /// Records callback invocations as readable strings.
    #[derive(Clone, Default)]
    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut self.log.lock().unwrap())
        }
    }

    impl GraphListener for Recorder {
        fn on_step_added(&mut self, step: StepId) {
            self.log.lock().unwrap().push(format!("added {step}"));
        }
        fn on_step_removed(&mut self, step: StepId) {
            self.log.lock().unwrap().push(format!("removed {step}"));
        }
        fn on_step_changed(&mut self, step: StepId) {
            self.log.lock().unwrap().push(format!("changed {step}"));
        }
        fn on_property_changed(&mut self, step: StepId, key: &str) {
            self.log.lock().unwrap().push(format!("prop {step} {key}"));
        }
        fn on_active_step_changed(&mut self, old: StepId, new: StepId) {
            self.log.lock().unwrap().push(format!("active {old} -> {new}"));
        }
        fn on_state_reset(&mut self) {
            self.log.lock().unwrap().push("reset".to_string());
        }
    }

    fn broker_with_recorder() -> (TransactionBroker, Recorder) {
        let mut broker = TransactionBroker::new();
        let recorder = Recorder::default();
        broker.add_listener(Box::new(recorder.clone()));
        (broker, recorder)
    }

    #[test]
    fn test_events_flush_immediately_outside_bracket() {
        let (mut broker, recorder) = broker_with_recorder();
        broker.queue(GraphEvent::StepAdded(id(1)));
        assert_eq!(recorder.take(), vec![format!("added {}", id(1))]);
    }

    #[test]
    fn test_events_deferred_inside_bracket() {
        let (mut broker, recorder) = broker_with_recorder();
        broker.begin_update();
        broker.queue(GraphEvent::StepAdded(id(1)));
        assert!(recorder.take().is_empty());
        broker.end_update().unwrap();
        assert_eq!(recorder.take(), vec![format!("added {}", id(1))]);
    }

    #[test]
    fn test_nested_brackets_flush_once_in_order() {
        let (mut broker, recorder) = broker_with_recorder();
        broker.begin_update();
        broker.queue(GraphEvent::StepAdded(id(1)));
        broker.begin_update();
        broker.queue(GraphEvent::StepAdded(id(2)));
        broker.end_update().unwrap();
        assert!(recorder.take().is_empty());
        broker.end_update().unwrap();
        assert_eq!(
            recorder.take(),
            vec![format!("added {}", id(1)), format!("added {}", id(2))]
        );
    }

    #[test]
    fn test_flush_order_adds_before_active_before_changed() {
        let (mut broker, recorder) = broker_with_recorder();
        broker.begin_update();
        broker.queue(GraphEvent::PropertyChanged {
            step: id(1),
            key: "k".to_string(),
        });
        broker.queue(GraphEvent::StepChanged(id(1)));
        broker.queue(GraphEvent::ActiveStepChanged {
            old: id(1),
            new: id(2),
        });
        broker.queue(GraphEvent::StepAdded(id(2)));
        broker.end_update().unwrap();

        assert_eq!(
            recorder.take(),
            vec![
                format!("added {}", id(2)),
                format!("active {} -> {}", id(1), id(2)),
                format!("changed {}", id(1)),
                format!("prop {} k", id(1)),
            ]
        );
    }

    #[test]
    fn test_active_changes_coalesce_to_net_transition() {
        let (mut broker, recorder) = broker_with_recorder();
        broker.begin_update();
        broker.queue(GraphEvent::ActiveStepChanged {
            old: id(1),
            new: id(2),
        });
        broker.queue(GraphEvent::ActiveStepChanged {
            old: id(2),
            new: id(3),
        });
        broker.end_update().unwrap();
        assert_eq!(recorder.take(), vec![format!("active {} -> {}", id(1), id(3))]);
    }

    #[test]
    fn test_round_trip_active_change_is_suppressed() {
        let (mut broker, recorder) = broker_with_recorder();
        broker.begin_update();
        broker.queue(GraphEvent::ActiveStepChanged {
            old: id(1),
            new: id(2),
        });
        broker.queue(GraphEvent::ActiveStepChanged {
            old: id(2),
            new: id(1),
        });
        broker.end_update().unwrap();
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_end_without_begin_fails() {
        let (mut broker, _) = broker_with_recorder();
        assert_eq!(broker.end_update().unwrap_err(), GraphError::EndWithoutBegin);
    }

    #[test]
    fn test_reset_discards_pending() {
        let (mut broker, recorder) = broker_with_recorder();
        broker.begin_update();
        broker.queue(GraphEvent::StepAdded(id(1)));
        broker.notify_reset();
        assert_eq!(recorder.take(), vec!["reset".to_string()]);
        broker.end_update().unwrap();
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_is_updating_tracks_depth() {
        let (mut broker, _) = broker_with_recorder();
        assert!(!broker.is_updating());
        broker.begin_update();
        broker.begin_update();
        assert!(broker.is_updating());
        broker.end_update().unwrap();
        assert!(broker.is_updating());
        broker.end_update().unwrap();
        assert!(!broker.is_updating());
    }
}
