//! conveyor - a dependency-ordered batch pipeline executor.
//!
//! Usage:
//!   conveyor run <pipeline.yaml>       Run a pipeline and print the report
//!   conveyor validate <pipeline.yaml>  Validate a pipeline without running
//!   conveyor list <pipeline.yaml>      Show tasks in execution order

use clap::{Parser, Subcommand};
use conveyor::{
    CancelToken, Event, Executor, Observer, Outcome, RunReport, TaskId, YamlLoader,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// conveyor - a dependency-ordered batch pipeline executor
#[derive(Parser)]
#[command(name = "conveyor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline to completion
    Run {
        /// Path to the pipeline YAML file
        #[arg(value_name = "PIPELINE")]
        pipeline: PathBuf,

        /// Keep independent branches running past a failure
        #[arg(long)]
        continue_on_failure: bool,

        /// Maximum concurrent tasks within a wave
        #[arg(short = 'p', long)]
        max_parallel: Option<usize>,

        /// Write the run report as JSON to this path ("-" for stdout)
        #[arg(long = "json", value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Validate a pipeline definition without running it
    Validate {
        /// Path to the pipeline YAML file
        #[arg(value_name = "PIPELINE")]
        pipeline: PathBuf,
    },

    /// List tasks in execution order
    List {
        /// Path to the pipeline YAML file
        #[arg(value_name = "PIPELINE")]
        pipeline: PathBuf,
    },
}

/// Observer that narrates task lifecycle through the log.
struct LoggingObserver;

impl Observer for LoggingObserver {
    fn on_event(&self, event: &Event) {
        match event {
            Event::TaskStarted { task_id, .. } => {
                info!("task '{}' started", task_id);
            }
            Event::TaskRetrying {
                task_id,
                attempt,
                max_attempts,
                ..
            } => {
                warn!(
                    "task '{}' attempt {}/{} failed, retrying",
                    task_id, attempt, max_attempts
                );
            }
            Event::TaskSucceeded {
                task_id,
                attempts,
                duration,
                ..
            } => {
                info!(
                    "task '{}' succeeded after {} attempt(s) in {:?}",
                    task_id, attempts, duration
                );
            }
            Event::TaskFailed {
                task_id,
                attempts,
                cause,
                ..
            } => {
                error!(
                    "task '{}' failed after {} attempt(s): {}",
                    task_id, attempts, cause
                );
            }
            Event::TaskSkipped { task_id, .. } => {
                warn!("task '{}' skipped", task_id);
            }
            Event::RunFinished {
                pipeline,
                outcome,
                duration,
                ..
            } => {
                info!(
                    "pipeline '{}' finished in {:?}: {:?}",
                    pipeline, duration, outcome
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            pipeline,
            continue_on_failure,
            max_parallel,
            report,
        } => run_pipeline(pipeline, continue_on_failure, max_parallel, report).await,
        Commands::Validate { pipeline } => validate_pipeline(pipeline),
        Commands::List { pipeline } => list_pipeline(pipeline),
    }
}

/// Run a pipeline file. Exit code 0 only for a fully successful run.
async fn run_pipeline(
    path: PathBuf,
    continue_on_failure: bool,
    max_parallel: Option<usize>,
    report_path: Option<PathBuf>,
) -> ExitCode {
    let config = match YamlLoader::load_pipeline(&path) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load {}: {}", path.display(), e);
            return ExitCode::from(2);
        }
    };
    let graph = match config.build_graph() {
        Ok(graph) => graph,
        Err(e) => {
            error!("invalid pipeline {}: {}", path.display(), e);
            return ExitCode::from(2);
        }
    };

    let mut options = config.run_options();
    if continue_on_failure {
        options.continue_on_failure = true;
    }
    if let Some(max) = max_parallel {
        options.max_parallel = max;
    }

    let executor = Executor::new();
    executor.register_observer(Arc::new(LoggingObserver));

    // Ctrl+C cancels: running attempts finish, nothing new starts.
    let cancel = CancelToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancellation requested, waiting for in-flight tasks");
            ctrl_c_cancel.cancel();
        }
    });

    info!(
        "running pipeline '{}' ({} task(s))",
        graph.id(),
        graph.len()
    );
    let report = executor.run_with_cancel(&graph, &options, cancel).await;

    if let Some(ref report_path) = report_path {
        if let Err(e) = write_report(&report, report_path) {
            error!("failed to write report: {}", e);
            return ExitCode::from(2);
        }
    }

    for failed in report.failed_tasks() {
        error!("failed: {}", failed);
    }
    for skipped in report.skipped_tasks() {
        warn!("skipped: {}", skipped);
    }

    match report.outcome {
        Outcome::Success => ExitCode::SUCCESS,
        Outcome::PartialFailure | Outcome::Failure => ExitCode::FAILURE,
    }
}

fn write_report(report: &RunReport, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(report)?;
    if path.as_os_str() == "-" {
        println!("{}", json);
    } else {
        std::fs::write(path, json)?;
    }
    Ok(())
}

/// Validate a pipeline file without running anything.
fn validate_pipeline(path: PathBuf) -> ExitCode {
    let graph = YamlLoader::load_pipeline(&path).and_then(|c| c.build_graph());
    match graph {
        Ok(graph) => {
            info!(
                "{}: OK ({} task(s), {} wave(s))",
                path.display(),
                graph.len(),
                graph.topological_batches().len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}: {}", path.display(), e);
            ExitCode::from(2)
        }
    }
}

/// Print tasks wave by wave, with their dependencies.
fn list_pipeline(path: PathBuf) -> ExitCode {
    let graph = match YamlLoader::load_pipeline(&path).and_then(|c| c.build_graph()) {
        Ok(graph) => graph,
        Err(e) => {
            error!("{}: {}", path.display(), e);
            return ExitCode::from(2);
        }
    };

    println!("Pipeline: {}", graph.id());
    println!("Tasks: {}", graph.len());
    println!();
    for (i, wave) in graph.topological_batches().iter().enumerate() {
        println!("Wave {}:", i + 1);
        for task_id in wave {
            let deps: Vec<&str> = graph
                .node(task_id)
                .map(|n| n.predecessors().iter().map(TaskId::as_str).collect())
                .unwrap_or_default();
            if deps.is_empty() {
                println!("  - {}", task_id);
            } else {
                println!("  - {} (depends on: {})", task_id, deps.join(", "));
            }
        }
    }
    ExitCode::SUCCESS
}
