//! The Action trait: the opaque unit of work a task node wraps.
//!
//! An action runs to completion and reports success or failure as a typed
//! outcome. It never raises past its own boundary, so the executor can apply
//! retry policy uniformly. Actions carry no inputs beyond what their
//! constructor captured; hand-off to downstream tasks happens through staged
//! artifacts.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

use super::artifact::ArtifactRef;

/// Errors an action can report.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action ran but did not produce a usable result.
    #[error("action failed: {0}")]
    Failed(String),

    /// An external command exited with a non-zero status.
    #[error("command exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// The action did not finish within its allotted time.
    #[error("action timed out after {0:?}")]
    Timeout(Duration),

    /// I/O failure while staging or reading artifacts.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The executable payload of a task node.
///
/// Side effects (file writes) are intentionally external and must be
/// idempotent or overwritable, since retries re-invoke the same action.
///
/// # Example
///
/// ```ignore
/// use conveyor::{Action, ActionError, ArtifactRef};
/// use async_trait::async_trait;
///
/// struct ExtractCsv {
///     output: ArtifactRef,
/// }
///
/// #[async_trait]
/// impl Action for ExtractCsv {
///     fn description(&self) -> &str {
///         "extract selected columns from vehicle-data.csv"
///     }
///
///     async fn execute(&self) -> Result<Vec<ArtifactRef>, ActionError> {
///         // ... write the file ...
///         Ok(vec![self.output.clone()])
///     }
/// }
/// ```
#[async_trait]
pub trait Action: Send + Sync {
    /// One-line description used in diagnostics and reports.
    fn description(&self) -> &str;

    /// Run the unit of work to completion.
    ///
    /// Returns the artifacts actually produced on success, or a typed
    /// failure cause. Must not panic.
    async fn execute(&self) -> Result<Vec<ArtifactRef>, ActionError>;
}

type ActionFuture = Pin<Box<dyn Future<Output = Result<Vec<ArtifactRef>, ActionError>> + Send>>;

/// Adapter turning a closure into an [`Action`].
///
/// Handy for library callers and tests that don't want a named type per task.
pub struct FnAction {
    description: String,
    func: Box<dyn Fn() -> ActionFuture + Send + Sync>,
}

impl FnAction {
    /// Wrap an async closure as an action.
    pub fn new<F, Fut>(description: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<ArtifactRef>, ActionError>> + Send + 'static,
    {
        Self {
            description: description.into(),
            func: Box::new(move || Box::pin(func())),
        }
    }

    /// An action that always succeeds and produces nothing. Useful in tests
    /// and as a join point for branches.
    pub fn noop(description: impl Into<String>) -> Self {
        Self::new(description, || async { Ok(Vec::new()) })
    }
}

#[async_trait]
impl Action for FnAction {
    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self) -> Result<Vec<ArtifactRef>, ActionError> {
        (self.func)().await
    }
}
