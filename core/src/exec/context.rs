//! Per-execution context threaded through capability calls.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::usage::UsageMeter;
use crate::plan::GoalId;

/// Passed to every capability invocation. Carries the cancellation signal
/// and the plan-scoped usage meter; nothing here is shared across goals.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    goal_id: GoalId,
    cancellation: CancellationToken,
    usage: Arc<UsageMeter>,
}

impl ExecutionContext {
    pub fn new(goal_id: GoalId) -> Self {
        Self {
            goal_id,
            cancellation: CancellationToken::new(),
            usage: Arc::new(UsageMeter::new()),
        }
    }

    pub fn goal_id(&self) -> GoalId {
        self.goal_id
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Signal cancellation: in-flight attempts finish, nothing new starts.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn usage(&self) -> &UsageMeter {
        &self.usage
    }

    /// Child context sharing the meter, with a child cancellation token.
    pub fn child(&self) -> Self {
        Self {
            goal_id: self.goal_id,
            cancellation: self.cancellation.child_token(),
            usage: self.usage.clone(),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(GoalId::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_shares_meter_and_cancellation() {
        let ctx = ExecutionContext::new(GoalId::new());
        let child = ctx.child();

        ctx.usage().charge(0.25);
        assert_eq!(child.usage().snapshot().cost, 0.25);

        ctx.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_cancel_does_not_escape() {
        let ctx = ExecutionContext::default();
        let child = ctx.child();
        child.cancel();
        assert!(!ctx.is_cancelled());
    }
}
