//! Lifecycle events and observers.
//!
//! The executor notifies registered observers synchronously as tasks start,
//! retry, and reach terminal states, and once when the run finishes. External
//! alerting (the classic email-on-failure) belongs in an observer, not in the
//! engine.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::core::types::{PipelineId, RunId, TaskId};
use crate::exec::report::Outcome;

/// Lifecycle events emitted during a run.
#[derive(Debug, Clone)]
pub enum Event {
    /// A task's first attempt is being dispatched.
    TaskStarted { task_id: TaskId, run_id: RunId },

    /// An attempt failed and another is permitted; emitted before the
    /// backoff delay. `attempt` is the 1-indexed attempt that just failed.
    TaskRetrying {
        task_id: TaskId,
        run_id: RunId,
        attempt: u32,
        max_attempts: u32,
    },

    /// A task reached `Succeeded`.
    TaskSucceeded {
        task_id: TaskId,
        run_id: RunId,
        attempts: u32,
        duration: Duration,
    },

    /// A task reached `Failed` after exhausting its retry budget.
    TaskFailed {
        task_id: TaskId,
        run_id: RunId,
        attempts: u32,
        cause: String,
    },

    /// A task reached `Skipped` without ever being attempted.
    TaskSkipped { task_id: TaskId, run_id: RunId },

    /// The run finished and a report exists.
    RunFinished {
        pipeline: PipelineId,
        run_id: RunId,
        outcome: Outcome,
        duration: Duration,
    },
}

impl Event {
    /// True for the three terminal task transitions.
    pub fn is_task_terminal(&self) -> bool {
        matches!(
            self,
            Event::TaskSucceeded { .. } | Event::TaskFailed { .. } | Event::TaskSkipped { .. }
        )
    }
}

/// Receiver for lifecycle events.
///
/// Callbacks are invoked synchronously on the executor's run loop, so they
/// should be quick; hand heavy work to a channel or task of your own.
pub trait Observer: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &Event);
}

/// Blanket impl so plain closures can observe runs.
impl<F> Observer for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// A set of observers sharing one registration list.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Arc<RwLock<Vec<Arc<dyn Observer>>>>,
}

impl ObserverSet {
    /// Create an empty observer set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for all events.
    pub fn register(&self, observer: Arc<dyn Observer>) {
        self.observers
            .write()
            .expect("observer lock poisoned")
            .push(observer);
    }

    /// Emit an event to every registered observer, in registration order.
    pub fn emit(&self, event: &Event) {
        let observers = self.observers.read().expect("observer lock poisoned");
        for observer in observers.iter() {
            observer.on_event(event);
        }
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.read().expect("observer lock poisoned").len()
    }

    /// True when no observers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
