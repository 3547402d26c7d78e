//! YAML pipeline definitions.
//!
//! A pipeline file names the pipeline, lists its tasks as external commands,
//! and wires dependencies between them:
//!
//! ```yaml
//! pipeline: toll_data
//! description: Consolidate toll data from three station vendors
//! tasks:
//!   - id: unzip_data
//!     command: tar
//!     args: [-xzf, tolldata.tgz, -C, staging/]
//!   - id: extract_data_from_csv
//!     command: cut
//!     args: [-d, ",", -f, 1-4, staging/vehicle-data.csv]
//!     depends_on: [unzip_data]
//!     retry:
//!       max_attempts: 3
//!       backoff_secs: 5
//! ```
//!
//! Parsing performs shape checks (non-empty ids, known `required_sinks`);
//! structural validation — duplicates, unknown predecessors, cycles — happens
//! when the config is lowered into a [`Graph`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::core::artifact::ArtifactRef;
use crate::core::graph::{Graph, GraphError};
use crate::core::node::TaskNode;
use crate::core::retry::RetryPolicy;
use crate::core::types::TaskId;
use crate::exec::command::CommandAction;
use crate::exec::runner::RunOptions;

/// Errors raised while loading a pipeline definition.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A field has an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The task list does not form a valid dependency graph.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A pipeline definition as read from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline identifier.
    pub pipeline: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Keep independent branches running past a failure.
    #[serde(default)]
    pub continue_on_failure: bool,
    /// Tasks that must succeed for the run to count as better than failed.
    /// Empty means the graph's leaves.
    #[serde(default)]
    pub required_sinks: Vec<String>,
    /// Maximum tasks attempted concurrently within a wave.
    pub max_parallel: Option<usize>,
    /// Task definitions.
    pub tasks: Vec<TaskConfig>,
}

/// One task definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task identifier, unique within the pipeline.
    pub id: String,
    /// Program to execute.
    pub command: String,
    /// Command arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the subprocess.
    pub working_dir: Option<String>,
    /// Environment variables for the subprocess.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Predecessor task ids.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Retry policy; defaults to a single attempt.
    pub retry: Option<RetryConfig>,
    /// Artifacts this task reads from upstream.
    #[serde(default)]
    pub consumes: Vec<ArtifactRef>,
    /// Artifacts this task writes on success.
    #[serde(default)]
    pub produces: Vec<ArtifactRef>,
}

/// Retry policy as configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts permitted, first try included.
    pub max_attempts: u32,
    /// Constant delay between attempts, in seconds.
    #[serde(default)]
    pub backoff_secs: u64,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::attempts(config.max_attempts, Duration::from_secs(config.backoff_secs))
    }
}

impl PipelineConfig {
    /// Run options carried by the file; CLI flags may override them.
    pub fn run_options(&self) -> RunOptions {
        let defaults = RunOptions::default();
        RunOptions {
            continue_on_failure: self.continue_on_failure,
            required_sinks: if self.required_sinks.is_empty() {
                None
            } else {
                Some(self.required_sinks.iter().map(TaskId::new).collect())
            },
            max_parallel: self.max_parallel.unwrap_or(defaults.max_parallel),
        }
    }

    /// Lower the definition into a validated [`Graph`] of command actions.
    pub fn build_graph(&self) -> Result<Graph, ConfigError> {
        let mut builder = Graph::builder(self.pipeline.as_str());
        for task in &self.tasks {
            let mut command = CommandAction::builder(&task.command).args(task.args.clone());
            for (key, value) in &task.env {
                command = command.env(key, value);
            }
            if let Some(ref dir) = task.working_dir {
                command = command.working_dir(dir);
            }
            if let Some(secs) = task.timeout_secs {
                command = command.timeout(Duration::from_secs(secs));
            }
            for artifact in &task.produces {
                command = command.produces(artifact.clone());
            }

            let mut node = TaskNode::new(task.id.as_str(), Arc::new(command.build()))
                .after(task.depends_on.iter().map(String::as_str));
            if let Some(ref retry) = task.retry {
                node = node.with_retry(retry.into());
            }
            for artifact in &task.consumes {
                node = node.consumes(artifact.clone());
            }
            for artifact in &task.produces {
                node = node.produces(artifact.clone());
            }
            builder = builder.task(node);
        }
        let graph = builder.build()?;
        debug!(pipeline = %graph.id(), tasks = graph.len(), "pipeline definition loaded");
        Ok(graph)
    }
}

/// YAML pipeline loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load a pipeline definition from a file.
    pub fn load_pipeline(path: impl AsRef<Path>) -> Result<PipelineConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_pipeline(&content)
    }

    /// Parse a pipeline definition from a YAML string.
    pub fn parse_pipeline(yaml: &str) -> Result<PipelineConfig, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &PipelineConfig) -> Result<(), ConfigError> {
        if config.pipeline.is_empty() {
            return Err(ConfigError::MissingField("pipeline".into()));
        }
        if config.tasks.is_empty() {
            return Err(ConfigError::Invalid(
                "pipeline must have at least one task".into(),
            ));
        }
        if config.max_parallel == Some(0) {
            return Err(ConfigError::Invalid("max_parallel cannot be zero".into()));
        }

        let ids: HashSet<&str> = config.tasks.iter().map(|t| t.id.as_str()).collect();
        for task in &config.tasks {
            if task.id.is_empty() {
                return Err(ConfigError::MissingField("tasks[].id".into()));
            }
            if task.command.is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "tasks[{}].command",
                    task.id
                )));
            }
            let mut seen: BTreeSet<&str> = BTreeSet::new();
            for dep in &task.depends_on {
                if !seen.insert(dep) {
                    return Err(ConfigError::Invalid(format!(
                        "task '{}' has duplicate dependency '{}'",
                        task.id, dep
                    )));
                }
            }
        }
        for sink in &config.required_sinks {
            if !ids.contains(sink.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "required sink '{}' is not a task in this pipeline",
                    sink
                )));
            }
        }
        Ok(())
    }
}
