//! The pipeline dependency graph.
//!
//! A [`Graph`] owns the mapping from task id to [`TaskNode`] and is validated
//! eagerly at build time: duplicate ids, unresolvable predecessors, cycles,
//! and unsatisfiable artifact declarations all fail the build before anything
//! runs. A validated graph is immutable and can back any number of runs.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use thiserror::Error;

use super::artifact::ArtifactRef;
use super::node::TaskNode;
use super::types::{PipelineId, TaskId};

/// Errors that fail graph construction. No partial graph is returned.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Two tasks share the same identifier.
    #[error("duplicate task id: {0}")]
    DuplicateId(TaskId),

    /// A task names a predecessor that is not in the graph.
    #[error("task '{task}' depends on unknown task '{predecessor}'")]
    UnknownPredecessor { task: TaskId, predecessor: TaskId },

    /// The predecessor relation contains a cycle (self-dependencies included).
    #[error("cycle detected involving task: {0}")]
    CycleDetected(TaskId),

    /// A task consumes an artifact no ancestor produces.
    #[error("task '{task}' consumes artifact {artifact} that no predecessor produces")]
    UnsatisfiedArtifact { task: TaskId, artifact: ArtifactRef },

    /// Two tasks declare the same artifact path as an output.
    #[error("tasks '{first}' and '{second}' both produce artifact path {path}")]
    ArtifactConflict {
        path: std::path::PathBuf,
        first: TaskId,
        second: TaskId,
    },
}

/// A validated, immutable pipeline graph.
#[derive(Clone, Debug)]
pub struct Graph {
    id: PipelineId,
    nodes: HashMap<TaskId, TaskNode>,
    /// Ready waves in execution order, lexically sorted within each wave.
    waves: Vec<Vec<TaskId>>,
}

impl Graph {
    /// Start building a graph.
    pub fn builder(id: impl Into<PipelineId>) -> GraphBuilder {
        GraphBuilder {
            id: id.into(),
            nodes: Vec::new(),
        }
    }

    /// The pipeline identifier.
    pub fn id(&self) -> &PipelineId {
        &self.id
    }

    /// Number of tasks in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph has no tasks.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by id.
    pub fn node(&self, id: &TaskId) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    /// All task ids, in wave order.
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.waves.iter().flatten().cloned().collect()
    }

    /// The ready waves: each wave holds every task whose predecessors all sit
    /// in earlier waves. Tasks within a wave are lexically ordered for
    /// determinism and may run concurrently.
    pub fn topological_batches(&self) -> &[Vec<TaskId>] {
        &self.waves
    }

    /// Tasks that directly depend on `id`.
    pub fn downstream(&self, id: &TaskId) -> Vec<TaskId> {
        let mut out: Vec<TaskId> = self
            .nodes
            .values()
            .filter(|n| n.predecessors().contains(id))
            .map(|n| n.id().clone())
            .collect();
        out.sort();
        out
    }

    /// All tasks downstream of `id`, directly or transitively.
    pub fn descendants(&self, id: &TaskId) -> HashSet<TaskId> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<TaskId> = self.downstream(id).into();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone()) {
                queue.extend(self.downstream(&next));
            }
        }
        seen
    }

    /// Leaf tasks: those nothing depends on. These are the default required
    /// sinks for a run.
    pub fn leaves(&self) -> BTreeSet<TaskId> {
        let mut referenced: HashSet<&TaskId> = HashSet::new();
        for node in self.nodes.values() {
            referenced.extend(node.predecessors().iter());
        }
        self.nodes
            .keys()
            .filter(|id| !referenced.contains(id))
            .cloned()
            .collect()
    }
}

/// Builder collecting task nodes; all validation happens in [`build`].
///
/// [`build`]: GraphBuilder::build
pub struct GraphBuilder {
    id: PipelineId,
    nodes: Vec<TaskNode>,
}

impl GraphBuilder {
    /// Add a task node.
    pub fn task(mut self, node: TaskNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Validate everything and produce the graph.
    ///
    /// Checks, in order: duplicate ids, unknown predecessors, cycles (a task
    /// listing itself is a one-node cycle), and artifact satisfiability.
    pub fn build(self) -> Result<Graph, GraphError> {
        let mut nodes: HashMap<TaskId, TaskNode> = HashMap::with_capacity(self.nodes.len());
        for node in self.nodes {
            if nodes.contains_key(node.id()) {
                return Err(GraphError::DuplicateId(node.id().clone()));
            }
            nodes.insert(node.id().clone(), node);
        }

        for node in nodes.values() {
            for pred in node.predecessors() {
                if !nodes.contains_key(pred) {
                    return Err(GraphError::UnknownPredecessor {
                        task: node.id().clone(),
                        predecessor: pred.clone(),
                    });
                }
            }
        }

        let waves = compute_waves(&nodes)?;
        validate_artifacts(&nodes)?;

        Ok(Graph {
            id: self.id,
            nodes,
            waves,
        })
    }
}

/// Kahn's algorithm, grouped by depth so each group is a ready wave.
fn compute_waves(nodes: &HashMap<TaskId, TaskNode>) -> Result<Vec<Vec<TaskId>>, GraphError> {
    let mut in_degree: HashMap<&TaskId, usize> = HashMap::new();
    let mut dependents: HashMap<&TaskId, Vec<&TaskId>> = HashMap::new();

    for (id, node) in nodes {
        in_degree.insert(id, node.predecessors().len());
        for pred in node.predecessors() {
            dependents.entry(pred).or_default().push(id);
        }
    }

    let mut current: Vec<&TaskId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut waves = Vec::new();
    let mut visited = 0usize;

    while !current.is_empty() {
        current.sort();
        visited += current.len();
        let mut next = Vec::new();
        for id in &current {
            if let Some(downstream) = dependents.get(*id) {
                for dep in downstream {
                    let degree = in_degree.get_mut(dep).expect("dependent was registered");
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(*dep);
                    }
                }
            }
        }
        waves.push(current.iter().map(|id| (*id).clone()).collect());
        current = next;
    }

    if visited != nodes.len() {
        // Any node still carrying in-degree sits on (or behind) a cycle;
        // report the lexically smallest for a stable message.
        let stuck = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(id, _)| (*id).clone())
            .min()
            .expect("unvisited node exists");
        return Err(GraphError::CycleDetected(stuck));
    }

    Ok(waves)
}

/// Every consumed artifact must be produced by some transitive predecessor
/// with the same path and format, and no path may have two producers.
fn validate_artifacts(nodes: &HashMap<TaskId, TaskNode>) -> Result<(), GraphError> {
    let mut producers: HashMap<&std::path::Path, &TaskId> = HashMap::new();
    let mut sorted: Vec<&TaskNode> = nodes.values().collect();
    sorted.sort_by(|a, b| a.id().cmp(b.id()));
    for node in &sorted {
        for artifact in node.produced_artifacts() {
            if let Some(first) = producers.insert(artifact.path(), node.id()) {
                return Err(GraphError::ArtifactConflict {
                    path: artifact.path().to_path_buf(),
                    first: first.clone(),
                    second: node.id().clone(),
                });
            }
        }
    }

    for node in &sorted {
        if node.consumed_artifacts().is_empty() {
            continue;
        }
        let ancestors = collect_ancestors(nodes, node.id());
        for wanted in node.consumed_artifacts() {
            let satisfied = ancestors.iter().any(|ancestor| {
                nodes[ancestor]
                    .produced_artifacts()
                    .iter()
                    .any(|produced| wanted.satisfied_by(produced))
            });
            if !satisfied {
                return Err(GraphError::UnsatisfiedArtifact {
                    task: node.id().clone(),
                    artifact: wanted.clone(),
                });
            }
        }
    }
    Ok(())
}

fn collect_ancestors(nodes: &HashMap<TaskId, TaskNode>, id: &TaskId) -> HashSet<TaskId> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<TaskId> = nodes[id].predecessors().iter().cloned().collect();
    while let Some(next) = queue.pop_front() {
        if seen.insert(next.clone()) {
            queue.extend(nodes[&next].predecessors().iter().cloned());
        }
    }
    seen
}
