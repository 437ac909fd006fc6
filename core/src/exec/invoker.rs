//! Retry and short-circuit wrapper around capability calls.
//!
//! This is the only place that decides whether a failure is retried,
//! escalated, or short-circuited. The executor just observes the final
//! `CapabilityResult`.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tokio::time::{sleep, timeout};
use tracing::debug;

use super::breaker::{Admission, BreakerBoard};
use super::config::EngineConfig;
use super::context::ExecutionContext;
use crate::capability::{Capability, CapabilityFailure, CapabilityResult};

pub struct Invoker {
    config: EngineConfig,
    breakers: BreakerBoard,
}

impl Invoker {
    pub fn new(config: EngineConfig) -> Self {
        let breakers = BreakerBoard::new(config.breaker.clone());
        Self { config, breakers }
    }

    pub fn breakers(&self) -> &BreakerBoard {
        &self.breakers
    }

    /// Invoke a capability with per-attempt timeout, transient-only retry
    /// with exponential backoff, and breaker admission.
    pub async fn invoke(
        &self,
        capability: Arc<dyn Capability>,
        ctx: &ExecutionContext,
        args: &Map<String, Value>,
    ) -> CapabilityResult {
        let started = Instant::now();
        let name = capability.name().to_string();
        let mut attempts = 0u32;
        let mut last_failure: Option<CapabilityFailure> = None;

        while attempts < self.config.retry.max_attempts {
            // The attempt already in flight when cancellation fires is
            // allowed to finish; further attempts are not.
            if attempts > 0 && ctx.is_cancelled() {
                break;
            }

            if self.breakers.admit(&name) == Admission::Denied {
                return CapabilityResult {
                    outcome: Err(CapabilityFailure::breaker_open(&name)),
                    elapsed: started.elapsed(),
                    attempts,
                };
            }

            attempts += 1;
            let attempt_started = Instant::now();
            let outcome = match timeout(self.config.attempt_timeout, capability.invoke(ctx, args))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(CapabilityFailure::timeout(self.config.attempt_timeout)),
            };
            ctx.usage().record_attempt(attempt_started.elapsed());

            match outcome {
                Ok(payload) => {
                    self.breakers.record_success(&name);
                    return CapabilityResult {
                        outcome: Ok(payload),
                        elapsed: started.elapsed(),
                        attempts,
                    };
                }
                Err(failure) => {
                    self.breakers.record_failure(&name);
                    debug!(
                        capability = %name,
                        attempt = attempts,
                        error = %failure,
                        "capability attempt failed"
                    );
                    if !failure.retryable {
                        return CapabilityResult {
                            outcome: Err(failure),
                            elapsed: started.elapsed(),
                            attempts,
                        };
                    }
                    let exhausted = attempts >= self.config.retry.max_attempts;
                    last_failure = Some(failure);
                    if !exhausted && !ctx.is_cancelled() {
                        sleep(self.config.retry.delay_after(attempts)).await;
                    }
                }
            }
        }

        let failure = last_failure
            .unwrap_or_else(|| CapabilityFailure::permanent("retry budget exhausted"));
        CapabilityResult {
            outcome: Err(failure),
            elapsed: started.elapsed(),
            attempts,
        }
    }
}
