//! Engine error taxonomy.
//!
//! Everything here aborts a plan before any task executes. Failures of
//! individual tasks are not errors at this level; they are carried in the
//! task's `CapabilityResult` and aggregated into the plan outcome.

use thiserror::Error;

use crate::plan::{GraphError, TaskId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Structural problem with the plan (empty, duplicate ids, dangling
    /// dependencies, cycles).
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A task names a capability nobody registered. Caught at validation,
    /// never at dispatch.
    #[error("task {task} references unknown capability '{capability}'")]
    UnknownCapability { task: TaskId, capability: String },

    #[error("internal error: {0}")]
    Internal(String),
}
