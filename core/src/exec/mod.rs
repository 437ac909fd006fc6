//! Plan execution: configuration, context, resilience, and the leveled
//! executor.

pub mod breaker;
pub mod config;
pub mod context;
pub mod executor;
pub mod invoker;
pub mod usage;

pub use breaker::{Admission, BreakerBoard, BreakerState};
pub use config::{BreakerConfig, EngineConfig, RetryConfig};
pub use context::ExecutionContext;
pub use executor::{Executor, PlanOutcome, PlanReport, TaskReport};
pub use invoker::Invoker;
pub use usage::{UsageMeter, UsageSnapshot};
