//! Capability contract: named, externally implemented callables.
//!
//! The engine never contains tool business logic. It resolves capability
//! names against a registry, invokes them through the retry/breaker layer,
//! and records their results.

mod registry;

pub use registry::CapabilityRegistry;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::exec::ExecutionContext;

/// A named callable a task can invoke.
///
/// Idempotency is not assumed: a retried invocation may re-execute side
/// effects. Implementations that cannot tolerate that must report their
/// failures as non-retryable.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(
        &self,
        ctx: &ExecutionContext,
        args: &Map<String, Value>,
    ) -> Result<Value, CapabilityFailure>;
}

/// Error descriptor produced by a capability, or synthesized by the engine
/// for timeouts and open breakers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityFailure {
    pub message: String,
    pub code: Option<String>,
    /// Whether the failure is transient and worth retrying.
    pub retryable: bool,
}

impl CapabilityFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            retryable: false,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub(crate) fn timeout(budget: Duration) -> Self {
        Self::transient(format!("attempt timed out after {budget:?}")).with_code("TIMEOUT")
    }

    pub(crate) fn breaker_open(capability: &str) -> Self {
        Self::permanent(format!(
            "circuit breaker open for capability '{capability}'"
        ))
        .with_code("BREAKER_OPEN")
    }

    pub fn is_breaker_open(&self) -> bool {
        self.code.as_deref() == Some("BREAKER_OPEN")
    }
}

impl std::fmt::Display for CapabilityFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for CapabilityFailure {}

/// Outcome of one task invocation after retry and breaker handling.
#[derive(Debug, Clone)]
pub struct CapabilityResult {
    pub outcome: Result<Value, CapabilityFailure>,
    /// Wall time from first attempt to final outcome, backoff included.
    pub elapsed: Duration,
    /// Attempts actually made against the capability. Zero when the breaker
    /// denied the call outright.
    pub attempts: u32,
}

impl CapabilityResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn payload(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    pub fn failure(&self) -> Option<&CapabilityFailure> {
        self.outcome.as_ref().err()
    }
}
