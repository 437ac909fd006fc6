//! Leveled plan execution.
//!
//! Levels run strictly in order: a level opens only once every task in the
//! previous level is terminal. Within a level, skip propagation happens
//! synchronously before any dispatch, then runnable tasks fan out up to the
//! plan-wide worker budget.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use super::config::EngineConfig;
use super::context::ExecutionContext;
use super::invoker::Invoker;
use super::usage::UsageSnapshot;
use crate::capability::{CapabilityFailure, CapabilityRegistry, CapabilityResult};
use crate::error::EngineError;
use crate::event::{EventSink, ExecutionEvent};
use crate::plan::{levelize, ExecutionPlan, GoalId, SkipReason, TaskId, TaskState};

/// Aggregate outcome of a fully processed plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOutcome {
    /// Every task succeeded.
    Completed,
    /// The graph was fully processed but at least one task failed or was
    /// skipped.
    CompletedWithFailures,
}

/// Final record for one task: terminal state, result slot, timestamps.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub id: TaskId,
    pub capability: String,
    pub state: TaskState,
    /// Written exactly once, by the worker that executed the task. `None`
    /// for skipped tasks.
    pub result: Option<CapabilityResult>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Result of executing a whole plan. Every task is terminal.
#[derive(Debug)]
pub struct PlanReport {
    pub goal_id: GoalId,
    pub outcome: PlanOutcome,
    /// Task reports in plan insertion order.
    pub tasks: Vec<TaskReport>,
    pub usage: UsageSnapshot,
}

impl PlanReport {
    pub fn task(&self, id: &TaskId) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, TaskState::Succeeded))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TaskState::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, TaskState::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&TaskState) -> bool) -> usize {
        self.tasks.iter().filter(|t| pred(&t.state)).count()
    }
}

pub struct Executor {
    registry: Arc<CapabilityRegistry>,
    invoker: Arc<Invoker>,
    config: EngineConfig,
    sink: Arc<dyn EventSink>,
}

impl Executor {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        config: EngineConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let invoker = Arc::new(Invoker::new(config.clone()));
        Self {
            registry,
            invoker,
            config,
            sink,
        }
    }

    /// Shared breaker state, for inspection.
    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    /// Execute a validated plan to a fully terminal state.
    ///
    /// Errors are only returned for pre-flight problems (unknown capability,
    /// leveling failure). Once dispatch begins, every task reaches a
    /// terminal state and the report carries the aggregate outcome.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        ctx: ExecutionContext,
    ) -> Result<PlanReport, EngineError> {
        self.registry.resolve(plan)?;
        let levels = levelize(plan)?;

        let mut records: HashMap<TaskId, TaskReport> = plan
            .tasks()
            .iter()
            .map(|spec| {
                (
                    spec.id.clone(),
                    TaskReport {
                        id: spec.id.clone(),
                        capability: spec.capability.clone(),
                        state: TaskState::Pending,
                        result: None,
                        queued_at: Utc::now(),
                        started_at: None,
                        finished_at: None,
                    },
                )
            })
            .collect();

        info!(
            goal = %ctx.goal_id(),
            tasks = plan.len(),
            levels = levels.len(),
            "executing plan"
        );
        self.sink.emit(ExecutionEvent::PlanStarted {
            goal_id: ctx.goal_id(),
            total_tasks: plan.len(),
            levels: levels.len(),
            timestamp: Utc::now(),
        });

        let budget = self
            .config
            .max_in_flight
            .unwrap_or(Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(budget));

        for (level_index, level) in levels.iter().enumerate() {
            // Skip pass: resolve every task doomed by a failed/skipped
            // ancestor (or by cancellation) before anything dispatches, so
            // skip propagation cannot race with execution.
            let mut runnable: Vec<TaskId> = Vec::new();
            for id in &level.tasks {
                if ctx.is_cancelled() {
                    self.mark_skipped(&mut records, id, SkipReason::Cancelled);
                } else if let Some(reason) = blocked_reason(plan, &records, id) {
                    self.mark_skipped(&mut records, id, reason);
                } else {
                    runnable.push(id.clone());
                }
            }

            // Fan out the rest, bounded by the plan-wide worker budget.
            // Workers report through a channel so results are processed in
            // completion order, not dispatch order.
            let (done_tx, mut done_rx) =
                mpsc::unbounded_channel::<(TaskId, CapabilityResult)>();
            for id in runnable {
                if ctx.is_cancelled() {
                    self.mark_skipped(&mut records, &id, SkipReason::Cancelled);
                    continue;
                }
                // Biased: when cancellation and a free permit are both
                // ready, the task must be skipped, not dispatched.
                let permit = tokio::select! {
                    biased;
                    _ = ctx.cancellation().cancelled() => {
                        self.mark_skipped(&mut records, &id, SkipReason::Cancelled);
                        continue;
                    }
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            self.mark_skipped(&mut records, &id, SkipReason::Cancelled);
                            continue;
                        }
                    },
                };

                // The registry was resolved before the first level.
                let spec = match plan.get(&id) {
                    Some(spec) => spec,
                    None => continue,
                };
                let capability = match self.registry.get(&spec.capability) {
                    Some(capability) => capability,
                    None => {
                        return Err(EngineError::Internal(format!(
                            "capability '{}' vanished after resolution",
                            spec.capability
                        )))
                    }
                };

                if let Some(record) = records.get_mut(&id) {
                    record.state = TaskState::Running;
                    record.started_at = Some(Utc::now());
                }
                debug!(task = %id, capability = %spec.capability, level = level_index, "task started");
                self.sink.emit(ExecutionEvent::TaskStarted {
                    task_id: id.clone(),
                    capability: spec.capability.clone(),
                    level: level_index,
                    timestamp: Utc::now(),
                });

                let invoker = self.invoker.clone();
                let task_ctx = ctx.clone();
                let args = spec.args.clone();
                let done_tx = done_tx.clone();
                tokio::spawn(async move {
                    let result = invoker.invoke(capability, &task_ctx, &args).await;
                    drop(permit);
                    let _ = done_tx.send((id, result));
                });
            }
            drop(done_tx);

            // Level barrier: every dispatched task reaches a terminal state
            // before the next level opens.
            while let Some((id, result)) = done_rx.recv().await {
                self.finish_task(&mut records, &id, result);
            }

            // A worker that panicked dropped its sender without reporting;
            // fail its task so the plan still terminates fully.
            for id in &level.tasks {
                let still_running = records
                    .get(id)
                    .is_some_and(|r| matches!(r.state, TaskState::Running));
                if still_running {
                    error!(task = %id, "task worker died without reporting");
                    let failure = CapabilityFailure::permanent("task worker panicked")
                        .with_code("PANIC");
                    self.finish_task(
                        &mut records,
                        id,
                        CapabilityResult {
                            outcome: Err(failure),
                            elapsed: std::time::Duration::ZERO,
                            attempts: 0,
                        },
                    );
                }
            }
        }

        // Reassemble in insertion order.
        let tasks: Vec<TaskReport> = plan
            .tasks()
            .iter()
            .filter_map(|spec| records.remove(&spec.id))
            .collect();

        let all_succeeded = tasks.iter().all(|t| t.state.is_succeeded());
        let outcome = if all_succeeded {
            PlanOutcome::Completed
        } else {
            PlanOutcome::CompletedWithFailures
        };

        let report = PlanReport {
            goal_id: ctx.goal_id(),
            outcome,
            tasks,
            usage: ctx.usage().snapshot(),
        };

        info!(
            goal = %ctx.goal_id(),
            outcome = ?outcome,
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "plan finished"
        );
        self.sink.emit(ExecutionEvent::PlanCompleted {
            goal_id: ctx.goal_id(),
            outcome,
            succeeded: report.succeeded(),
            failed: report.failed(),
            skipped: report.skipped(),
            timestamp: Utc::now(),
        });

        Ok(report)
    }

    fn mark_skipped(
        &self,
        records: &mut HashMap<TaskId, TaskReport>,
        id: &TaskId,
        reason: SkipReason,
    ) {
        let Some(record) = records.get_mut(id) else {
            return;
        };
        if record.state.is_terminal() {
            return;
        }
        debug!(task = %id, %reason, "task skipped");
        record.state = TaskState::Skipped {
            reason: reason.clone(),
        };
        record.finished_at = Some(Utc::now());
        self.sink.emit(ExecutionEvent::TaskSkipped {
            task_id: id.clone(),
            reason,
            timestamp: Utc::now(),
        });
    }

    fn finish_task(
        &self,
        records: &mut HashMap<TaskId, TaskReport>,
        id: &TaskId,
        result: CapabilityResult,
    ) {
        let Some(record) = records.get_mut(id) else {
            return;
        };
        record.finished_at = Some(Utc::now());

        match &result.outcome {
            Ok(_) => {
                record.state = TaskState::Succeeded;
                self.sink.emit(ExecutionEvent::TaskSucceeded {
                    task_id: id.clone(),
                    attempts: result.attempts,
                    elapsed_ms: result.elapsed.as_millis() as u64,
                    timestamp: Utc::now(),
                });
            }
            Err(failure) => {
                warn!(task = %id, error = %failure, attempts = result.attempts, "task failed");
                record.state = TaskState::Failed {
                    error: failure.to_string(),
                };
                self.sink.emit(ExecutionEvent::TaskFailed {
                    task_id: id.clone(),
                    error: failure.clone(),
                    attempts: result.attempts,
                    timestamp: Utc::now(),
                });
            }
        }
        record.result = Some(result);
    }
}

/// Reason this task must be skipped, if any dependency went wrong.
///
/// Levels guarantee dependencies are terminal by the time their dependents'
/// level opens, so `Pending`/`Running` ancestors indicate a scheduling bug;
/// they are treated as skipped defensively.
fn blocked_reason(
    plan: &ExecutionPlan,
    records: &HashMap<TaskId, TaskReport>,
    id: &TaskId,
) -> Option<SkipReason> {
    let spec = plan.get(id)?;
    for dep in &spec.dependencies {
        match records.get(dep).map(|r| &r.state) {
            Some(TaskState::Succeeded) => {}
            Some(TaskState::Failed { .. }) => {
                return Some(SkipReason::AncestorFailed {
                    ancestor: dep.clone(),
                })
            }
            Some(TaskState::Skipped { .. }) => {
                return Some(SkipReason::AncestorSkipped {
                    ancestor: dep.clone(),
                })
            }
            _ => {
                debug_assert!(false, "dependency {dep} not terminal when level opened");
                return Some(SkipReason::AncestorSkipped {
                    ancestor: dep.clone(),
                });
            }
        }
    }
    None
}
