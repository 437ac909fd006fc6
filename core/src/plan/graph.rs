//! Plan construction and structural validation.
//!
//! A plan is validated once at build time; no partially valid plan is ever
//! handed to the executor. Task state mutates during execution, but the
//! graph structure does not.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::task::{TaskId, TaskSpec};

/// Identifier for one goal's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalId(pub Uuid);

impl GoalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GoalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structural errors raised while building or leveling a plan.
///
/// All of these are fatal to the whole plan: no tasks execute.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("plan contains no tasks")]
    EmptyPlan,
    #[error("duplicate task id: {0}")]
    DuplicateId(TaskId),
    #[error("task {task} depends on unknown task {missing}")]
    DanglingDependency { task: TaskId, missing: TaskId },
    #[error("dependency cycle: {}", cycle_path(.0))]
    CycleDetected(Vec<TaskId>),
}

fn cycle_path(ids: &[TaskId]) -> String {
    ids.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A validated task DAG for one goal.
///
/// Tasks keep their insertion order, which downstream leveling uses as the
/// deterministic tie-break.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    goal_id: GoalId,
    tasks: Vec<TaskSpec>,
    index: HashMap<TaskId, usize>,
    /// Cost estimate carried over from the decomposition, in dollars.
    pub estimated_cost: f64,
    /// Time estimate carried over from the decomposition.
    pub estimated_time_secs: u64,
}

impl ExecutionPlan {
    /// Validate `specs` and build a plan.
    ///
    /// Rejects empty task lists, duplicate ids, dependencies on unknown
    /// tasks, and cycles (three-color depth-first search; the error names
    /// the offending cycle).
    pub fn build(goal_id: GoalId, specs: Vec<TaskSpec>) -> Result<Self, GraphError> {
        if specs.is_empty() {
            return Err(GraphError::EmptyPlan);
        }

        let mut index = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            if index.insert(spec.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateId(spec.id.clone()));
            }
        }

        for spec in &specs {
            for dep in &spec.dependencies {
                if !index.contains_key(dep) {
                    return Err(GraphError::DanglingDependency {
                        task: spec.id.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = find_cycle(&specs, &index) {
            return Err(GraphError::CycleDetected(cycle));
        }

        Ok(Self {
            goal_id,
            tasks: specs,
            index,
            estimated_cost: 0.0,
            estimated_time_secs: 0,
        })
    }

    /// Attach decomposition estimates to the plan.
    pub fn with_estimates(mut self, cost: f64, time_secs: u64) -> Self {
        self.estimated_cost = cost;
        self.estimated_time_secs = time_secs;
        self
    }

    pub fn goal_id(&self) -> GoalId {
        self.goal_id
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in insertion order.
    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskSpec> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Insertion-order position of a task.
    pub fn index_of(&self, id: &TaskId) -> Option<usize> {
        self.index.get(id).copied()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Three-color DFS over dependency edges. Returns the first cycle found,
/// listed in dependency order.
fn find_cycle(specs: &[TaskSpec], index: &HashMap<TaskId, usize>) -> Option<Vec<TaskId>> {
    let mut marks = vec![Mark::Unvisited; specs.len()];
    let mut path = Vec::new();

    for start in 0..specs.len() {
        if marks[start] == Mark::Unvisited {
            if let Some(cycle) = visit(start, specs, index, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit(
    node: usize,
    specs: &[TaskSpec],
    index: &HashMap<TaskId, usize>,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
) -> Option<Vec<TaskId>> {
    marks[node] = Mark::InProgress;
    path.push(node);

    for dep in &specs[node].dependencies {
        let dep_idx = index[dep];
        match marks[dep_idx] {
            Mark::Done => {}
            Mark::InProgress => {
                // Back-edge: the cycle is the path suffix starting at the
                // dependency, closed by the dependency itself.
                let from = path.iter().position(|&n| n == dep_idx).unwrap_or(0);
                let mut cycle: Vec<TaskId> =
                    path[from..].iter().map(|&n| specs[n].id.clone()).collect();
                cycle.push(specs[dep_idx].id.clone());
                return Some(cycle);
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(dep_idx, specs, index, marks, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    marks[node] = Mark::Done;
    None
}
