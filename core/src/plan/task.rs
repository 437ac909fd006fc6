//! Task definitions and lifecycle states.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier for a task, stable within its plan.
///
/// Ids are chosen by the decomposition (typically `task_1`, `task_2`, ...)
/// and carry no meaning outside their own plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single unit of work: one capability invocation with declared
/// dependencies.
///
/// Deserializes from the planner wire format; `tool_name` and `input_params`
/// are accepted as aliases for `capability` and `args`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "tool_name")]
    pub capability: String,
    #[serde(default, alias = "input_params")]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(id),
            name: String::new(),
            description: String::new(),
            capability: capability.into(),
            args: Map::new(),
            dependencies: Vec::new(),
        }
    }

    /// Add a dependency on another task.
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(TaskId::new(id));
        self
    }

    /// Set one input argument.
    pub fn arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }
}

/// Lifecycle state of a task during execution.
///
/// `Pending -> Running -> {Succeeded, Failed}`, or `Pending -> Skipped` when
/// an ancestor failed or the plan was cancelled. Terminal states are never
/// left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed { error: String },
    Skipped { reason: SkipReason },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed { .. } | TaskState::Skipped { .. }
        )
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, TaskState::Succeeded)
    }
}

/// Why a task was skipped instead of run.
///
/// Ancestor variants name the direct dependency that went wrong; the full
/// chain back to the originating failure can be recovered by following that
/// ancestor's own state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    AncestorFailed { ancestor: TaskId },
    AncestorSkipped { ancestor: TaskId },
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AncestorFailed { ancestor } => {
                write!(f, "dependency {} failed", ancestor)
            }
            SkipReason::AncestorSkipped { ancestor } => {
                write!(f, "dependency {} was skipped", ancestor)
            }
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}
