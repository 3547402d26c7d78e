//! Test helpers: deterministic flaky actions and a recording observer.
//!
//! Available to integration tests and downstream crates writing tests against
//! the executor.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::action::{Action, ActionError};
use crate::core::artifact::ArtifactRef;
use crate::events::{Event, Observer};

/// An action that fails a fixed number of times, then succeeds forever.
///
/// The invocation counter is shared, so retries across attempts observe the
/// same budget. Useful for exercising retry policy.
pub struct FlakyAction {
    description: String,
    failures_before_success: u32,
    invocations: AtomicU32,
}

impl FlakyAction {
    /// Create an action that fails the first `failures_before_success`
    /// invocations.
    pub fn new(description: impl Into<String>, failures_before_success: u32) -> Self {
        Self {
            description: description.into(),
            failures_before_success,
            invocations: AtomicU32::new(0),
        }
    }

    /// How many times the action has been invoked so far.
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for FlakyAction {
    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self) -> Result<Vec<ArtifactRef>, ActionError> {
        let n = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures_before_success {
            Err(ActionError::Failed(format!(
                "transient failure on invocation {}",
                n
            )))
        } else {
            Ok(Vec::new())
        }
    }
}

/// An observer that records every event it sees, in order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("recorder lock poisoned").clone()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().expect("recorder lock poisoned").len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Observer for RecordingObserver {
    fn on_event(&self, event: &Event) {
        self.events
            .lock()
            .expect("recorder lock poisoned")
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flaky_action_fails_then_succeeds() {
        let action = FlakyAction::new("flaky", 2);
        assert!(action.execute().await.is_err());
        assert!(action.execute().await.is_err());
        assert!(action.execute().await.is_ok());
        assert!(action.execute().await.is_ok());
        assert_eq!(action.invocations(), 4);
    }

    #[tokio::test]
    async fn test_flaky_action_with_zero_failures_always_succeeds() {
        let action = FlakyAction::new("solid", 0);
        assert!(action.execute().await.is_ok());
        assert_eq!(action.invocations(), 1);
    }

    #[test]
    fn test_recording_observer_keeps_order() {
        use crate::core::types::{RunId, TaskId};

        let recorder = RecordingObserver::new();
        let run_id = RunId::new();
        recorder.on_event(&Event::TaskStarted {
            task_id: TaskId::new("a"),
            run_id,
        });
        recorder.on_event(&Event::TaskSkipped {
            task_id: TaskId::new("b"),
            run_id,
        });

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::TaskStarted { .. }));
        assert!(matches!(events[1], Event::TaskSkipped { .. }));
    }
}
