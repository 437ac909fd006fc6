//! Engine configuration surface.
//!
//! Named options with stated defaults. These are configuration defaults,
//! not contract: embedders override them per deployment.

use std::time::Duration;

use rand::Rng;

/// Retry policy for capability invocations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per task invocation, first try included.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Upper bound on a single backoff delay.
    pub max_delay: Duration,
    /// Random jitter fraction applied to each delay; 0.0 disables.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before the attempt after `completed` attempts:
    /// `base * 2^(completed-1)`, capped at `max_delay`.
    pub(crate) fn delay_after(&self, completed: u32) -> Duration {
        if completed == 0 {
            return Duration::ZERO;
        }
        let exp = self.base_delay.as_millis() as f64 * 2f64.powi(completed as i32 - 1);
        let mut millis = exp.min(self.max_delay.as_millis() as f64);
        if self.jitter > 0.0 {
            let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..self.jitter);
            millis *= factor;
        }
        Duration::from_millis(millis as u64)
    }
}

/// Circuit breaker tuning, applied per capability name.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// How long an Open breaker waits before letting a probe through.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
    /// Per-attempt timeout for capability calls.
    pub attempt_timeout: Duration,
    /// Plan-wide bound on concurrently running tasks. `None` leaves the fan
    /// out within a level unbounded.
    pub max_in_flight: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
            attempt_timeout: Duration::from_secs(30),
            max_in_flight: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
        assert_eq!(config.retry.max_delay, Duration::from_secs(10));
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.cooldown, Duration::from_secs(30));
        assert_eq!(config.attempt_timeout, Duration::from_secs(30));
        assert!(config.max_in_flight.is_none());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            jitter: 0.0,
            ..RetryConfig::default()
        };

        assert_eq!(retry.delay_after(0), Duration::ZERO);
        assert_eq!(retry.delay_after(1), Duration::from_millis(100));
        assert_eq!(retry.delay_after(2), Duration::from_millis(200));
        assert_eq!(retry.delay_after(3), Duration::from_millis(400));
        // 100ms * 2^20 far exceeds the cap.
        assert_eq!(retry.delay_after(21), Duration::from_secs(10));
    }
}
