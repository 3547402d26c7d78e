//! The pipeline executor.
//!
//! Drives a validated [`Graph`] through one run: dispatches ready waves,
//! applies per-task retry policy, cascades skips past failures, and always
//! produces a [`RunReport`] — the executor itself never fails.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info_span, warn, Instrument};

use crate::core::action::Action;
use crate::core::graph::Graph;
use crate::core::retry::RetryPolicy;
use crate::core::types::{RunId, TaskId};
use crate::events::{Event, Observer, ObserverSet};

use super::report::{Outcome, RunReport, RunState, TaskReport, TaskState};

/// Options for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// When false (the default), a single task failure stops the run: all
    /// not-yet-started tasks are skipped once the current wave finishes.
    /// When true, branches not downstream of the failure keep running.
    pub continue_on_failure: bool,

    /// Tasks that must succeed for the run to count as anything better than
    /// `Failure`. `None` means the graph's leaves.
    pub required_sinks: Option<BTreeSet<TaskId>>,

    /// Maximum tasks attempted concurrently within a wave.
    pub max_parallel: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            continue_on_failure: false,
            required_sinks: None,
            max_parallel: 4,
        }
    }
}

/// External cancellation signal for a run.
///
/// Cancelling stops new attempts from being dispatched; in-flight attempts
/// are allowed to finish so shared staging artifacts are not corrupted.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What one dispatched task came back with.
enum AttemptOutcome {
    Succeeded { attempts: u32, duration: Duration },
    Failed { attempts: u32, cause: String },
    /// Cancellation won the race before the first attempt started.
    NotAttempted,
}

/// Executor for running pipeline graphs.
#[derive(Default)]
pub struct Executor {
    observers: ObserverSet,
}

impl Executor {
    /// Create an executor with no observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer notified on task lifecycle transitions and run
    /// completion.
    pub fn register_observer(&self, observer: Arc<dyn Observer>) {
        self.observers.register(observer);
    }

    /// Run a graph to completion and return the report.
    pub async fn run(&self, graph: &Graph, options: &RunOptions) -> RunReport {
        self.run_with_cancel(graph, options, CancelToken::new())
            .await
    }

    /// Run a graph, honoring an external cancellation token.
    pub async fn run_with_cancel(
        &self,
        graph: &Graph,
        options: &RunOptions,
        cancel: CancelToken,
    ) -> RunReport {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let started = Instant::now();

        let span = info_span!("pipeline_run", pipeline = %graph.id(), run = %run_id);
        async {
            debug!(tasks = graph.len(), "starting run");

            let mut states: HashMap<TaskId, TaskState> = graph
                .task_ids()
                .into_iter()
                .map(|id| (id, TaskState::Pending))
                .collect();
            let mut attempts: HashMap<TaskId, u32> = HashMap::new();
            let mut causes: HashMap<TaskId, String> = HashMap::new();

            let semaphore = Arc::new(Semaphore::new(options.max_parallel.max(1)));
            let mut aborted = false;

            for wave in graph.topological_batches() {
                if cancel.is_cancelled() {
                    aborted = true;
                    break;
                }

                // Tasks whose predecessors did not all succeed are skipped
                // without ever being attempted.
                let mut runnable = Vec::new();
                for id in wave {
                    let ready = graph
                        .node(id)
                        .map(|n| {
                            n.predecessors()
                                .iter()
                                .all(|p| states.get(p) == Some(&TaskState::Succeeded))
                        })
                        .unwrap_or(false);
                    if ready {
                        states.insert(id.clone(), TaskState::Running);
                        runnable.push(id.clone());
                    } else {
                        self.mark_skipped(id, run_id, &mut states, &mut attempts);
                    }
                }

                debug!(wave_size = runnable.len(), "dispatching wave");

                let mut handles = Vec::with_capacity(runnable.len());
                for id in runnable {
                    let node = graph.node(&id).expect("runnable task exists in graph");
                    let action = Arc::clone(node.action());
                    let retry = node.retry_policy().clone();
                    let observers = self.observers.clone();
                    let cancel = cancel.clone();
                    let semaphore = Arc::clone(&semaphore);
                    let task_span = info_span!("task", task = %id);
                    let task_id = id.clone();

                    let handle = tokio::spawn(
                        async move {
                            let _permit = semaphore
                                .acquire_owned()
                                .await
                                .expect("semaphore never closed");
                            run_attempts(&task_id, action, &retry, &observers, &cancel, run_id)
                                .await
                        }
                        .instrument(task_span),
                    );
                    handles.push((id, handle));
                }

                let mut wave_failed = false;
                for (id, handle) in handles {
                    let outcome = match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => AttemptOutcome::Failed {
                            attempts: attempts.get(&id).copied().unwrap_or(0),
                            cause: format!("task aborted: {}", e),
                        },
                    };
                    match outcome {
                        AttemptOutcome::Succeeded {
                            attempts: n,
                            duration,
                        } => {
                            states.insert(id.clone(), TaskState::Succeeded);
                            attempts.insert(id.clone(), n);
                            self.observers.emit(&Event::TaskSucceeded {
                                task_id: id,
                                run_id,
                                attempts: n,
                                duration,
                            });
                        }
                        AttemptOutcome::Failed { attempts: n, cause } => {
                            wave_failed = true;
                            warn!(task = %id, attempts = n, %cause, "task failed");
                            states.insert(id.clone(), TaskState::Failed);
                            attempts.insert(id.clone(), n);
                            causes.insert(id.clone(), cause.clone());
                            self.observers.emit(&Event::TaskFailed {
                                task_id: id,
                                run_id,
                                attempts: n,
                                cause,
                            });
                        }
                        AttemptOutcome::NotAttempted => {
                            self.mark_skipped(&id, run_id, &mut states, &mut attempts);
                        }
                    }
                }

                if wave_failed && !options.continue_on_failure {
                    aborted = true;
                    break;
                }
            }

            if cancel.is_cancelled() {
                aborted = true;
            }

            // Anything still pending was never reached: cancelled run or an
            // aborted one. Record it as skipped, never silently dropped.
            let leftover: Vec<TaskId> = states
                .iter()
                .filter(|(_, s)| !s.is_terminal())
                .map(|(id, _)| id.clone())
                .collect();
            for id in leftover {
                self.mark_skipped(&id, run_id, &mut states, &mut attempts);
            }

            let tasks: Vec<TaskReport> = graph
                .task_ids()
                .into_iter()
                .map(|id| TaskReport {
                    state: states[&id],
                    attempts: attempts.get(&id).copied().unwrap_or(0),
                    cause: causes.get(&id).cloned(),
                    id,
                })
                .collect();

            let required = options
                .required_sinks
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| graph.leaves());
            let outcome = RunReport::outcome_for(&tasks, &required);
            let state = if aborted {
                RunState::Aborted
            } else {
                RunState::Completed
            };

            debug!(?outcome, ?state, "run finished");
            self.observers.emit(&Event::RunFinished {
                pipeline: graph.id().clone(),
                run_id,
                outcome,
                duration: started.elapsed(),
            });

            RunReport {
                run_id,
                pipeline: graph.id().clone(),
                started_at,
                finished_at: Utc::now(),
                state,
                outcome,
                tasks,
            }
        }
        .instrument(span)
        .await
    }

    fn mark_skipped(
        &self,
        id: &TaskId,
        run_id: RunId,
        states: &mut HashMap<TaskId, TaskState>,
        attempts: &mut HashMap<TaskId, u32>,
    ) {
        states.insert(id.clone(), TaskState::Skipped);
        attempts.entry(id.clone()).or_insert(0);
        self.observers.emit(&Event::TaskSkipped {
            task_id: id.clone(),
            run_id,
        });
    }
}

/// The attempt loop for one task: first attempt plus retries per policy,
/// with a constant backoff between attempts. Cancellation stops further
/// attempts but never interrupts one in flight.
async fn run_attempts(
    id: &TaskId,
    action: Arc<dyn Action>,
    retry: &RetryPolicy,
    observers: &ObserverSet,
    cancel: &CancelToken,
    run_id: RunId,
) -> AttemptOutcome {
    if cancel.is_cancelled() {
        return AttemptOutcome::NotAttempted;
    }

    observers.emit(&Event::TaskStarted {
        task_id: id.clone(),
        run_id,
    });

    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match action.execute().await {
            Ok(_artifacts) => {
                return AttemptOutcome::Succeeded {
                    attempts,
                    duration: started.elapsed(),
                };
            }
            Err(err) => {
                if retry.should_retry(attempts) && !cancel.is_cancelled() {
                    debug!(task = %id, attempt = attempts, "attempt failed, retrying");
                    observers.emit(&Event::TaskRetrying {
                        task_id: id.clone(),
                        run_id,
                        attempt: attempts,
                        max_attempts: retry.max_attempts,
                    });
                    sleep(retry.backoff_delay()).await;
                } else {
                    return AttemptOutcome::Failed {
                        attempts,
                        cause: err.to_string(),
                    };
                }
            }
        }
    }
}
