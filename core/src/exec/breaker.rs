//! Per-capability circuit breakers.
//!
//! Breaker state is shared by every task using the same capability name
//! within a process lifetime. Multiple tasks in one level may hit the same
//! capability concurrently, so all mutations happen behind a single lock.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::config::BreakerConfig;

/// Circuit state for one capability name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through; consecutive failures are counted.
    Closed,
    /// Calls fail immediately without touching the capability.
    Open,
    /// One probe call is in flight; everyone else is denied.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerEntry {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    open_until: Option<Instant>,
}

impl Default for BreakerEntry {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            open_until: None,
        }
    }
}

/// Outcome of asking the board whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Breaker is Open, or a HalfOpen probe is already out.
    Denied,
}

pub struct BreakerBoard {
    config: BreakerConfig,
    entries: Mutex<HashMap<String, BreakerEntry>>,
}

impl BreakerBoard {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Ask to place a call. When an Open breaker's cool-down has elapsed the
    /// caller receiving `Allowed` becomes the single HalfOpen probe.
    pub fn admit(&self, capability: &str) -> Admission {
        let mut entries = self.entries.lock();
        let entry = entries.entry(capability.to_string()).or_default();

        match entry.state {
            BreakerState::Closed => Admission::Allowed,
            BreakerState::HalfOpen => Admission::Denied,
            BreakerState::Open => {
                let due = entry.open_until.map_or(true, |t| Instant::now() >= t);
                if due {
                    debug!(capability, "breaker half-open, admitting probe");
                    entry.state = BreakerState::HalfOpen;
                    Admission::Allowed
                } else {
                    Admission::Denied
                }
            }
        }
    }

    pub fn record_success(&self, capability: &str) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(capability.to_string()).or_default();

        if entry.state == BreakerState::HalfOpen {
            debug!(capability, "probe succeeded, breaker closed");
        }
        entry.state = BreakerState::Closed;
        entry.consecutive_failures = 0;
        entry.open_until = None;
    }

    /// Record a real capability failure. Breaker-open denials never come
    /// through here: a denial is a symptom, not a new failure.
    pub fn record_failure(&self, capability: &str) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let entry = entries.entry(capability.to_string()).or_default();
        entry.last_failure = Some(now);

        match entry.state {
            BreakerState::HalfOpen => {
                warn!(capability, "probe failed, breaker re-opened");
                entry.state = BreakerState::Open;
                entry.open_until = Some(now + self.config.cooldown);
            }
            BreakerState::Closed => {
                entry.consecutive_failures += 1;
                if entry.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        capability,
                        failures = entry.consecutive_failures,
                        "breaker opened"
                    );
                    entry.state = BreakerState::Open;
                    entry.open_until = Some(now + self.config.cooldown);
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self, capability: &str) -> BreakerState {
        self.entries
            .lock()
            .get(capability)
            .map_or(BreakerState::Closed, |e| e.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn board(threshold: u32, cooldown: Duration) -> BreakerBoard {
        BreakerBoard::new(BreakerConfig {
            failure_threshold: threshold,
            cooldown,
        })
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let board = board(3, Duration::from_secs(60));

        board.record_failure("search");
        board.record_failure("search");
        assert_eq!(board.admit("search"), Admission::Allowed);

        board.record_failure("search");
        assert_eq!(board.state("search"), BreakerState::Open);
        assert_eq!(board.admit("search"), Admission::Denied);
    }

    #[test]
    fn test_success_resets_counter() {
        let board = board(3, Duration::from_secs(60));

        board.record_failure("search");
        board.record_failure("search");
        board.record_success("search");
        board.record_failure("search");
        board.record_failure("search");
        // Counter restarted after the success; still closed.
        assert_eq!(board.state("search"), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_admits_one_probe() {
        let board = board(1, Duration::from_millis(0));

        board.record_failure("search");
        assert_eq!(board.state("search"), BreakerState::Open);

        // Cool-down of zero: first admit becomes the probe.
        assert_eq!(board.admit("search"), Admission::Allowed);
        assert_eq!(board.state("search"), BreakerState::HalfOpen);
        // Probe still out: everyone else is denied.
        assert_eq!(board.admit("search"), Admission::Denied);
    }

    #[test]
    fn test_probe_success_closes() {
        let board = board(1, Duration::from_millis(0));
        board.record_failure("search");
        assert_eq!(board.admit("search"), Admission::Allowed);

        board.record_success("search");
        assert_eq!(board.state("search"), BreakerState::Closed);
        assert_eq!(board.admit("search"), Admission::Allowed);
    }

    #[test]
    fn test_probe_failure_reopens() {
        let board = board(1, Duration::from_secs(60));

        board.record_failure("search");
        // Force the cool-down to be treated as elapsed.
        {
            let mut entries = board.entries.lock();
            entries.get_mut("search").unwrap().open_until = Some(Instant::now());
        }
        assert_eq!(board.admit("search"), Admission::Allowed);

        board.record_failure("search");
        assert_eq!(board.state("search"), BreakerState::Open);
        assert_eq!(board.admit("search"), Admission::Denied);
    }

    #[test]
    fn test_breakers_are_independent_per_capability() {
        let board = board(1, Duration::from_secs(60));
        board.record_failure("search");
        assert_eq!(board.admit("search"), Admission::Denied);
        assert_eq!(board.admit("calculator"), Admission::Allowed);
    }
}
