//! Run reports: immutable, serializable summaries of one pipeline run.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{PipelineId, RunId, TaskId};

/// Per-task state within one run.
///
/// `Succeeded`, `Failed`, and `Skipped` are terminal; no further transitions
/// occur once a task reaches one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for predecessors.
    Pending,
    /// An attempt is in flight.
    Running,
    /// The action completed successfully.
    Succeeded,
    /// Every permitted attempt failed.
    Failed,
    /// Never attempted: an ancestor failed or the run was cancelled.
    Skipped,
}

impl TaskState {
    /// True for Succeeded, Failed, and Skipped.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Skipped
        )
    }
}

/// Global state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// The run has not been started.
    NotStarted,
    /// Waves are being dispatched.
    Running,
    /// Every task reached a terminal state through normal progress.
    Completed,
    /// The run was cut short: cancellation, or a failure with
    /// `continue_on_failure` disabled.
    Aborted,
}

/// Overall outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every task succeeded.
    Success,
    /// Some tasks succeeded; something else failed or was skipped.
    PartialFailure,
    /// No required sink succeeded.
    Failure,
}

/// Terminal record for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    /// The task identifier.
    pub id: TaskId,
    /// Terminal (or last observed) state.
    pub state: TaskState,
    /// Attempts made; 0 for tasks that were never dispatched.
    pub attempts: u32,
    /// Failure cause, present only for Failed tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// Immutable summary of one run, safe to serialize for audit trails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: RunId,
    /// The pipeline that ran.
    pub pipeline: PipelineId,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end of the run.
    pub finished_at: DateTime<Utc>,
    /// Final global run state.
    pub state: RunState,
    /// Overall outcome.
    pub outcome: Outcome,
    /// Per-task terminal records, in wave order.
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    /// Derive the overall outcome from terminal task states.
    ///
    /// `Success` iff every task succeeded; `Failure` iff none of the required
    /// sinks succeeded; `PartialFailure` otherwise.
    pub fn outcome_for(tasks: &[TaskReport], required_sinks: &BTreeSet<TaskId>) -> Outcome {
        if tasks.iter().all(|t| t.state == TaskState::Succeeded) {
            return Outcome::Success;
        }
        let any_sink_succeeded = tasks
            .iter()
            .any(|t| t.state == TaskState::Succeeded && required_sinks.contains(&t.id));
        if any_sink_succeeded {
            Outcome::PartialFailure
        } else {
            Outcome::Failure
        }
    }

    /// Record for a specific task.
    pub fn task(&self, id: &TaskId) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// State for a specific task, if present.
    pub fn task_state(&self, id: &TaskId) -> Option<TaskState> {
        self.task(id).map(|t| t.state)
    }

    /// The first failed task (wave order) and its cause, if any task failed.
    pub fn first_failure(&self) -> Option<(&TaskId, &str)> {
        self.tasks
            .iter()
            .find(|t| t.state == TaskState::Failed)
            .map(|t| (&t.id, t.cause.as_deref().unwrap_or("unknown")))
    }

    /// Ids of all failed tasks, in wave order.
    pub fn failed_tasks(&self) -> Vec<&TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.state == TaskState::Failed)
            .map(|t| &t.id)
            .collect()
    }

    /// Ids of all skipped tasks, in wave order.
    pub fn skipped_tasks(&self) -> Vec<&TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.state == TaskState::Skipped)
            .map(|t| &t.id)
            .collect()
    }

    /// Number of tasks that succeeded.
    pub fn succeeded_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.state == TaskState::Succeeded)
            .count()
    }
}
