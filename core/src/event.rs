//! Execution event stream.
//!
//! Events are emitted at defined lifecycle transition points, in causal
//! order: a task's `TaskStarted` always precedes its terminal event, and a
//! level's events all precede the next level's starts. Delivery to external
//! consumers is fire-and-forget, at-most-once per process lifetime; the
//! engine does not persist events itself.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::capability::CapabilityFailure;
use crate::exec::PlanOutcome;
use crate::plan::{GoalId, SkipReason, TaskId};

/// Immutable record of one lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ExecutionEvent {
    PlanStarted {
        goal_id: GoalId,
        total_tasks: usize,
        levels: usize,
        timestamp: DateTime<Utc>,
    },
    TaskStarted {
        task_id: TaskId,
        capability: String,
        level: usize,
        timestamp: DateTime<Utc>,
    },
    TaskSucceeded {
        task_id: TaskId,
        attempts: u32,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },
    TaskFailed {
        task_id: TaskId,
        error: CapabilityFailure,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
    TaskSkipped {
        task_id: TaskId,
        reason: SkipReason,
        timestamp: DateTime<Utc>,
    },
    PlanCompleted {
        goal_id: GoalId,
        outcome: PlanOutcome,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// The task this event concerns, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            ExecutionEvent::TaskStarted { task_id, .. }
            | ExecutionEvent::TaskSucceeded { task_id, .. }
            | ExecutionEvent::TaskFailed { task_id, .. }
            | ExecutionEvent::TaskSkipped { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

/// Consumer of the event stream.
///
/// `emit` must not block. Implementations relay events to a transport or
/// persistence layer; the executor treats them as fire-and-forget.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ExecutionEvent);
}

/// Drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ExecutionEvent) {}
}

/// Forwards events over an unbounded channel to an external consumer.
///
/// If the receiver is gone, events are silently dropped; the engine never
/// stalls on a slow or dead consumer.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ExecutionEvent) {
        let _ = self.tx.send(event);
    }
}

/// Buffers every event in memory. Intended for tests and inspection.
#[derive(Default)]
pub struct CollectorSink {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for CollectorSink {
    fn emit(&self, event: ExecutionEvent) {
        self.events.lock().push(event);
    }
}
