//! Task nodes: an action plus identity, predecessors, and retry policy.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::action::Action;
use super::artifact::ArtifactRef;
use super::retry::RetryPolicy;
use super::types::TaskId;

/// A node in the pipeline graph.
///
/// Wraps an [`Action`] with identity, the set of predecessor task ids, a
/// retry policy, and the artifacts the task declares it consumes and
/// produces. Run state is not stored here: it lives in the executor's
/// run-scoped state table, so one graph can back many runs.
#[derive(Clone)]
pub struct TaskNode {
    id: TaskId,
    predecessors: BTreeSet<TaskId>,
    action: Arc<dyn Action>,
    retry: RetryPolicy,
    consumes: Vec<ArtifactRef>,
    produces: Vec<ArtifactRef>,
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id)
            .field("predecessors", &self.predecessors)
            .field("action", &self.action.description())
            .field("retry", &self.retry)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .finish()
    }
}

impl TaskNode {
    /// Create a node with no predecessors and a single-attempt retry policy.
    pub fn new(id: impl Into<TaskId>, action: Arc<dyn Action>) -> Self {
        Self {
            id: id.into(),
            predecessors: BTreeSet::new(),
            action,
            retry: RetryPolicy::default(),
            consumes: Vec::new(),
            produces: Vec::new(),
        }
    }

    /// Builder: add predecessor task ids. Duplicates collapse; ordering is
    /// irrelevant.
    pub fn after<I, T>(mut self, predecessors: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.predecessors
            .extend(predecessors.into_iter().map(Into::into));
        self
    }

    /// Builder: set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder: declare an artifact this task reads.
    pub fn consumes(mut self, artifact: ArtifactRef) -> Self {
        self.consumes.push(artifact);
        self
    }

    /// Builder: declare an artifact this task writes.
    pub fn produces(mut self, artifact: ArtifactRef) -> Self {
        self.produces.push(artifact);
        self
    }

    /// The task identifier.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Predecessor task ids.
    pub fn predecessors(&self) -> &BTreeSet<TaskId> {
        &self.predecessors
    }

    /// The wrapped action.
    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }

    /// The retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Artifacts this task declares it reads.
    pub fn consumed_artifacts(&self) -> &[ArtifactRef] {
        &self.consumes
    }

    /// Artifacts this task declares it writes.
    pub fn produced_artifacts(&self) -> &[ArtifactRef] {
        &self.produces
    }
}
