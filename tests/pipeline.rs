//! End-to-end tests exercising the public API: graph construction, wave
//! execution, retries, skip cascades, cancellation, and YAML-defined
//! pipelines of real commands.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use conveyor::testing::{FlakyAction, RecordingObserver};
use conveyor::{
    ActionError, CancelToken, Event, Executor, FnAction, Graph, GraphError, Outcome, RetryPolicy,
    RunOptions, RunState, TaskId, TaskNode, TaskState, YamlLoader,
};

fn ok(id: &str) -> TaskNode {
    TaskNode::new(id, Arc::new(FnAction::noop(id)))
}

fn failing(id: &str) -> TaskNode {
    TaskNode::new(
        id,
        Arc::new(FnAction::new(id, || async {
            Err(ActionError::Failed("boom".to_string()))
        })),
    )
}

fn ids(names: &[&str]) -> Vec<TaskId> {
    names.iter().map(|n| TaskId::new(*n)).collect()
}

#[test]
fn diamond_graph_partitions_into_lexical_waves() {
    // a fans out to c and b; both join at d. Ties within a wave are broken
    // lexically, so wave 2 is [b, c] regardless of insertion order.
    let graph = Graph::builder("diamond")
        .task(ok("a"))
        .task(ok("c").after(["a"]))
        .task(ok("b").after(["a"]))
        .task(ok("d").after(["b", "c"]))
        .build()
        .unwrap();

    assert_eq!(
        graph.topological_batches(),
        &[ids(&["a"]), ids(&["b", "c"]), ids(&["d"])]
    );

    // Every task appears exactly once across all waves.
    let total: usize = graph.topological_batches().iter().map(Vec::len).sum();
    assert_eq!(total, graph.len());
}

#[test]
fn wave_index_exceeds_longest_predecessor_wave() {
    let graph = Graph::builder("depths")
        .task(ok("root"))
        .task(ok("mid").after(["root"]))
        .task(ok("leaf").after(["root", "mid"]))
        .build()
        .unwrap();

    let wave_of = |id: &str| {
        graph
            .topological_batches()
            .iter()
            .position(|w| w.contains(&TaskId::new(id)))
            .unwrap()
    };
    assert!(wave_of("mid") > wave_of("root"));
    assert!(wave_of("leaf") > wave_of("mid"));
}

#[test]
fn cycles_are_rejected_at_build_time() {
    let err = Graph::builder("cyclic")
        .task(ok("a").after(["c"]))
        .task(ok("b").after(["a"]))
        .task(ok("c").after(["b"]))
        .build()
        .unwrap_err();
    assert!(matches!(err, GraphError::CycleDetected(_)));
}

#[tokio::test]
async fn rerunning_the_same_graph_is_deterministic() {
    let graph = Graph::builder("stable")
        .task(ok("a"))
        .task(ok("b").after(["a"]))
        .task(ok("c").after(["a"]))
        .build()
        .unwrap();

    let waves_before = graph.topological_batches().to_vec();
    let executor = Executor::new();
    let first = executor.run(&graph, &RunOptions::default()).await;
    let second = executor.run(&graph, &RunOptions::default()).await;

    assert_eq!(graph.topological_batches(), waves_before.as_slice());
    assert_eq!(first.outcome, Outcome::Success);
    assert_eq!(second.outcome, Outcome::Success);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn failure_cascades_down_a_chain() {
    let graph = Graph::builder("cascade")
        .task(failing("a"))
        .task(ok("b").after(["a"]))
        .task(ok("c").after(["b"]))
        .build()
        .unwrap();

    let report = Executor::new().run(&graph, &RunOptions::default()).await;

    assert_eq!(report.outcome, Outcome::Failure);
    assert_eq!(report.task_state(&TaskId::new("a")), Some(TaskState::Failed));
    assert_eq!(report.task_state(&TaskId::new("b")), Some(TaskState::Skipped));
    assert_eq!(report.task_state(&TaskId::new("c")), Some(TaskState::Skipped));

    // Skipped tasks were never attempted.
    assert_eq!(report.task(&TaskId::new("b")).unwrap().attempts, 0);
    assert_eq!(report.task(&TaskId::new("c")).unwrap().attempts, 0);
}

#[tokio::test]
async fn task_succeeding_on_final_attempt_reports_three_attempts() {
    let action = Arc::new(FlakyAction::new("flaky", 2));
    let graph = Graph::builder("third_time")
        .task(
            TaskNode::new("flaky", action.clone())
                .with_retry(RetryPolicy::attempts(3, Duration::from_millis(1))),
        )
        .build()
        .unwrap();

    let report = Executor::new().run(&graph, &RunOptions::default()).await;

    assert_eq!(report.outcome, Outcome::Success);
    let task = report.task(&TaskId::new("flaky")).unwrap();
    assert_eq!(task.state, TaskState::Succeeded);
    assert_eq!(task.attempts, 3);
}

#[tokio::test]
async fn independent_branches_survive_a_failure_when_asked_to() {
    // a -> b is broken; x -> y is healthy. Both b and y are sinks.
    let graph = Graph::builder("two_branches")
        .task(failing("a"))
        .task(ok("b").after(["a"]))
        .task(ok("x"))
        .task(ok("y").after(["x"]))
        .build()
        .unwrap();

    let options = RunOptions {
        continue_on_failure: true,
        ..RunOptions::default()
    };
    let report = Executor::new().run(&graph, &options).await;

    assert_eq!(report.outcome, Outcome::PartialFailure);
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.task_state(&TaskId::new("y")), Some(TaskState::Succeeded));
    assert_eq!(report.task_state(&TaskId::new("b")), Some(TaskState::Skipped));
}

#[tokio::test]
async fn cancellation_between_waves_aborts_the_run() {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();

    let graph = Graph::builder("cancelled")
        .task(TaskNode::new(
            "first",
            Arc::new(FnAction::new("first", move || {
                let trigger = trigger.clone();
                async move {
                    trigger.cancel();
                    Ok(Vec::new())
                }
            })),
        ))
        .task(ok("second").after(["first"]))
        .build()
        .unwrap();

    let report = Executor::new()
        .run_with_cancel(&graph, &RunOptions::default(), cancel)
        .await;

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(
        report.task_state(&TaskId::new("first")),
        Some(TaskState::Succeeded)
    );
    assert_eq!(
        report.task_state(&TaskId::new("second")),
        Some(TaskState::Skipped)
    );
    assert_eq!(report.task(&TaskId::new("second")).unwrap().attempts, 0);
}

#[tokio::test]
async fn observers_see_started_before_terminal_and_run_finished_last() {
    let recorder = Arc::new(RecordingObserver::new());
    let executor = Executor::new();
    executor.register_observer(recorder.clone());

    let graph = Graph::builder("observed")
        .task(ok("a"))
        .task(ok("b").after(["a"]))
        .build()
        .unwrap();
    executor.run(&graph, &RunOptions::default()).await;

    let events = recorder.events();
    let started_a = events
        .iter()
        .position(|e| matches!(e, Event::TaskStarted { task_id, .. } if task_id.as_str() == "a"))
        .unwrap();
    let succeeded_a = events
        .iter()
        .position(|e| matches!(e, Event::TaskSucceeded { task_id, .. } if task_id.as_str() == "a"))
        .unwrap();
    assert!(started_a < succeeded_a);
    assert!(matches!(events.last(), Some(Event::RunFinished { .. })));
}

#[tokio::test]
async fn sibling_tasks_in_a_wave_run_concurrently() {
    let in_flight = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    let make = |name: &'static str, in_flight: Arc<AtomicU32>, peak: Arc<AtomicU32>| {
        FnAction::new(name, move || {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        })
    };

    let graph = Graph::builder("siblings")
        .task(TaskNode::new(
            "left",
            Arc::new(make("left", in_flight.clone(), peak.clone())),
        ))
        .task(TaskNode::new(
            "right",
            Arc::new(make("right", in_flight.clone(), peak.clone())),
        ))
        .build()
        .unwrap();

    let report = Executor::new().run(&graph, &RunOptions::default()).await;
    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn report_serializes_with_expected_fields() {
    let graph = Graph::builder("serialized")
        .task(ok("a"))
        .task(failing("b").after(["a"]))
        .build()
        .unwrap();
    let report = Executor::new().run(&graph, &RunOptions::default()).await;

    let json: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&report).unwrap()).unwrap();
    assert!(json["run_id"].is_string());
    assert!(json["started_at"].is_string());
    assert!(json["finished_at"].is_string());
    assert_eq!(json["outcome"], "failure");
    assert_eq!(json["tasks"][0]["id"], "a");
    assert_eq!(json["tasks"][0]["state"], "succeeded");
    assert_eq!(json["tasks"][1]["state"], "failed");
    assert!(json["tasks"][1]["cause"].is_string());
    // Succeeded tasks carry no failure cause.
    assert!(json["tasks"][0].get("cause").is_none());
}

#[tokio::test]
async fn yaml_pipeline_runs_real_commands_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().display().to_string();

    let yaml = format!(
        r#"
pipeline: toll_data_smoke
tasks:
  - id: seed_data
    command: sh
    args: ["-c", "(echo a,1; echo b,2) > {staging}/vehicle-data.csv"]
  - id: extract_data_from_csv
    command: sh
    args: ["-c", "cut -d, -f1 {staging}/vehicle-data.csv > {staging}/csv_data.csv"]
    depends_on: [seed_data]
  - id: consolidate_data
    command: sh
    args: ["-c", "wc -l < {staging}/csv_data.csv > {staging}/summary.txt"]
    depends_on: [extract_data_from_csv]
"#
    );

    let config = YamlLoader::parse_pipeline(&yaml).unwrap();
    let graph = config.build_graph().unwrap();
    let report = Executor::new().run(&graph, &config.run_options()).await;

    assert_eq!(report.outcome, Outcome::Success);
    let summary = std::fs::read_to_string(dir.path().join("summary.txt")).unwrap();
    assert_eq!(summary.trim(), "2");
}

#[tokio::test]
async fn yaml_pipeline_with_failing_command_reports_cause() {
    let yaml = r#"
pipeline: broken
tasks:
  - id: explode
    command: sh
    args: ["-c", "echo nope >&2; exit 3"]
  - id: downstream
    command: "true"
    depends_on: [explode]
"#;

    let config = YamlLoader::parse_pipeline(yaml).unwrap();
    let graph = config.build_graph().unwrap();
    let report = Executor::new().run(&graph, &config.run_options()).await;

    assert_eq!(report.outcome, Outcome::Failure);
    assert_eq!(report.state, RunState::Aborted);
    let (failed, cause) = report.first_failure().unwrap();
    assert_eq!(failed.as_str(), "explode");
    assert!(cause.contains("code 3"));
    assert!(cause.contains("nope"));
}

#[tokio::test]
async fn retrying_command_observers_see_each_attempt() {
    let recorder = Arc::new(RecordingObserver::new());
    let executor = Executor::new();
    executor.register_observer(recorder.clone());

    let attempts_seen = Arc::new(Mutex::new(Vec::new()));
    let graph = Graph::builder("retry_events")
        .task(
            TaskNode::new("hopeless", Arc::new(FlakyAction::new("hopeless", 10)))
                .with_retry(RetryPolicy::attempts(3, Duration::from_millis(1))),
        )
        .build()
        .unwrap();
    executor.run(&graph, &RunOptions::default()).await;

    for event in recorder.events() {
        if let Event::TaskRetrying { attempt, .. } = event {
            attempts_seen.lock().unwrap().push(attempt);
        }
    }
    // Two retry notifications before the third and final attempt fails.
    assert_eq!(*attempts_seen.lock().unwrap(), vec![1, 2]);
}
