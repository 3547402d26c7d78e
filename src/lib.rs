//! # conveyor
//!
//! A dependency-ordered batch pipeline executor.
//!
//! Pipelines are directed acyclic graphs of tasks. Each task wraps an opaque
//! [`Action`], declares its predecessors, and optionally a retry policy and
//! the file artifacts it consumes and produces. Building a [`Graph`] validates
//! the whole structure up front — duplicate ids, unknown predecessors, and
//! cycles are rejected before anything runs.
//!
//! The [`Executor`] dispatches the graph in waves: every task whose
//! predecessors have all succeeded runs concurrently with its wave siblings,
//! failed tasks cascade [`TaskState::Skipped`] to their descendants, and the
//! run always ends with a serializable [`RunReport`].
//!
//! ```rust
//! use conveyor::{Executor, FnAction, Graph, Outcome, RunOptions, TaskNode};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let graph = Graph::builder("nightly")
//!     .task(TaskNode::new("extract", Arc::new(FnAction::noop("pull raw data"))))
//!     .task(TaskNode::new("transform", Arc::new(FnAction::noop("clean it up"))).after(["extract"]))
//!     .build()
//!     .unwrap();
//!
//! let report = Executor::new().run(&graph, &RunOptions::default()).await;
//! assert_eq!(report.outcome, Outcome::Success);
//! # }
//! ```
//!
//! Pipelines of external commands can also be defined in YAML and loaded with
//! [`YamlLoader`]; the `conveyor` binary wraps that in a small CLI.

pub mod config;
pub mod core;
pub mod events;
pub mod exec;
pub mod testing;

pub use crate::config::{ConfigError, PipelineConfig, RetryConfig, TaskConfig, YamlLoader};
pub use crate::core::action::{Action, ActionError, FnAction};
pub use crate::core::artifact::{ArtifactFormat, ArtifactRef};
pub use crate::core::graph::{Graph, GraphBuilder, GraphError};
pub use crate::core::node::TaskNode;
pub use crate::core::retry::RetryPolicy;
pub use crate::core::types::{PipelineId, RunId, TaskId};
pub use crate::events::{Event, Observer, ObserverSet};
pub use crate::exec::command::{CommandAction, CommandActionBuilder};
pub use crate::exec::report::{Outcome, RunReport, RunState, TaskReport, TaskState};
pub use crate::exec::runner::{CancelToken, Executor, RunOptions};
