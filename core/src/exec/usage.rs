//! Plan-scoped usage aggregation.
//!
//! One meter per execution, merged into the final report. There are no
//! process-wide counters: concurrent plans never see each other's totals.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct UsageMeter {
    inner: Mutex<UsageSnapshot>,
}

/// Point-in-time view of a meter, embedded in the plan report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Capability attempts actually made, retries included.
    pub attempts: u64,
    /// Cumulative wall time spent inside capability calls.
    pub busy_ms: u64,
    /// Charges accumulated by capabilities (API spend, token cost, ...).
    pub cost: f64,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_attempt(&self, elapsed: Duration) {
        let mut inner = self.inner.lock();
        inner.attempts += 1;
        inner.busy_ms += elapsed.as_millis() as u64;
    }

    /// Add to the accumulated cost. Capabilities call this through their
    /// execution context.
    pub fn charge(&self, amount: f64) {
        self.inner.lock().cost += amount;
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_accumulates() {
        let meter = UsageMeter::new();
        meter.record_attempt(Duration::from_millis(12));
        meter.record_attempt(Duration::from_millis(8));
        meter.charge(0.01);
        meter.charge(0.04);

        let snap = meter.snapshot();
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.busy_ms, 20);
        assert!((snap.cost - 0.05).abs() < f64::EPSILON);
    }
}
