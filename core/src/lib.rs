//! taskweave-core: goal-to-DAG task orchestration engine.
//!
//! Turns a decomposed goal into a validated DAG of capability invocations
//! and executes it level by level with bounded parallelism, per-capability
//! retry and circuit breaking, and a streamed event log.

pub mod capability;
pub mod decompose;
pub mod error;
pub mod event;
pub mod exec;
pub mod plan;

// Re-exports for convenience
pub use capability::{Capability, CapabilityFailure, CapabilityRegistry, CapabilityResult};
pub use error::EngineError;
pub use event::{ChannelSink, CollectorSink, EventSink, ExecutionEvent, NullSink};
pub use exec::{EngineConfig, ExecutionContext, Executor, PlanOutcome, PlanReport};
pub use plan::{levelize, ExecutionPlan, GoalId, GraphError, TaskId, TaskSpec, TaskState};
