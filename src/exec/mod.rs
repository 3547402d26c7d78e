//! Execution: the wave-based runner, command actions, and run reports.

pub mod command;
pub mod report;
pub mod runner;

pub use command::{CommandAction, CommandActionBuilder};
pub use report::{Outcome, RunReport, RunState, TaskReport, TaskState};
pub use runner::{CancelToken, Executor, RunOptions};
