//! Goal decomposition seam and plan-document parsing.
//!
//! Decomposition is pluggable: anything that turns a goal into a task list
//! can drive the engine, a language model being the usual suspect. The
//! engine never trusts a draft; it always passes through
//! `ExecutionPlan::build` and capability resolution before execution.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::plan::{TaskId, TaskSpec};

/// Raw decomposition output, prior to validation.
#[derive(Debug, Clone, Default)]
pub struct PlanDraft {
    pub tasks: Vec<TaskSpec>,
    /// Decomposer's cost estimate, in dollars.
    pub estimated_cost: f64,
    pub estimated_time_secs: u64,
}

#[derive(Debug, Error)]
pub enum DecomposeError {
    #[error("no JSON object found in decomposition output")]
    NoJson,
    #[error("invalid plan document: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("decomposition failed: {0}")]
    Upstream(String),
}

/// Produces a task breakdown for a natural-language goal.
#[async_trait]
pub trait Decomposer: Send + Sync {
    async fn decompose(&self, goal: &str) -> Result<PlanDraft, DecomposeError>;
}

#[derive(Debug, Deserialize)]
struct RawDraft {
    #[serde(default)]
    tasks: Vec<RawTask>,
    #[serde(default)]
    estimated_cost: f64,
    #[serde(default, alias = "estimated_time")]
    estimated_time_secs: u64,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "tool_name")]
    capability: Option<String>,
    #[serde(default, alias = "input_params")]
    args: Map<String, Value>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Parse a plan document out of model output.
///
/// Tolerates markdown code fences and prose around the JSON object. Missing
/// task ids are back-filled positionally (`task_1`, ...); tasks without a
/// capability name are dropped with a warning. The result is still a draft:
/// structural validation happens in `ExecutionPlan::build`.
pub fn parse_plan_document(content: &str) -> Result<PlanDraft, DecomposeError> {
    let json = extract_json(content).ok_or(DecomposeError::NoJson)?;
    let raw: RawDraft = serde_json::from_str(json)?;

    let mut tasks = Vec::with_capacity(raw.tasks.len());
    for (idx, task) in raw.tasks.into_iter().enumerate() {
        let id = task.id.unwrap_or_else(|| format!("task_{}", idx + 1));
        let Some(capability) = task.capability else {
            warn!(task = %id, "dropping task without a capability name");
            continue;
        };

        // Name and description fall back to each other, as the planner
        // output is often missing one of the two.
        let description = task
            .description
            .clone()
            .or_else(|| task.name.clone())
            .unwrap_or_default();
        let name = task.name.unwrap_or_else(|| truncated(&description, 50));

        tasks.push(TaskSpec {
            id: TaskId::new(id),
            name,
            description,
            capability,
            args: task.args,
            dependencies: task.dependencies.into_iter().map(TaskId::new).collect(),
        });
    }

    Ok(PlanDraft {
        tasks,
        estimated_cost: raw.estimated_cost,
        estimated_time_secs: raw.estimated_time_secs,
    })
}

fn truncated(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Locate the JSON object inside possibly-fenced, possibly-prosed output.
fn extract_json(content: &str) -> Option<&str> {
    let content = if let Some((_, rest)) = content.split_once("```json") {
        rest.split("```").next().unwrap_or(rest)
    } else if let Some((_, rest)) = content.split_once("```") {
        rest.split("```").next().unwrap_or(rest)
    } else {
        content
    };

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_bare_json() {
        let draft = parse_plan_document(
            r#"{"tasks": [{"id": "task_1", "tool_name": "web_search", "input_params": {"query": "x"}}], "estimated_cost": 0.05, "estimated_time": 60}"#,
        )
        .unwrap();

        assert_eq!(draft.tasks.len(), 1);
        assert_eq!(draft.tasks[0].capability, "web_search");
        assert_eq!(draft.estimated_time_secs, 60);
        assert!((draft.estimated_cost - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parses_fenced_json_with_prose() {
        let content = r#"Here is the plan you asked for:

```json
{"tasks": [{"id": "task_1", "capability": "calculator", "args": {"expression": "1+1"}}]}
```

Let me know if you need anything else."#;

        let draft = parse_plan_document(content).unwrap();
        assert_eq!(draft.tasks.len(), 1);
        assert_eq!(draft.tasks[0].args["expression"], "1+1");
    }

    #[test]
    fn test_backfills_missing_ids() {
        let draft = parse_plan_document(
            r#"{"tasks": [{"tool_name": "a"}, {"tool_name": "b"}]}"#,
        )
        .unwrap();

        assert_eq!(draft.tasks[0].id, TaskId::new("task_1"));
        assert_eq!(draft.tasks[1].id, TaskId::new("task_2"));
    }

    #[test]
    fn test_drops_tasks_without_capability() {
        let draft = parse_plan_document(
            r#"{"tasks": [{"id": "keep", "tool_name": "a"}, {"id": "drop", "name": "orphan"}]}"#,
        )
        .unwrap();

        assert_eq!(draft.tasks.len(), 1);
        assert_eq!(draft.tasks[0].id, TaskId::new("keep"));
    }

    #[test]
    fn test_name_falls_back_to_description() {
        let draft = parse_plan_document(
            r#"{"tasks": [{"id": "t", "tool_name": "a", "description": "fetch the weather"}]}"#,
        )
        .unwrap();

        assert_eq!(draft.tasks[0].name, "fetch the weather");
    }

    #[test]
    fn test_rejects_output_without_json() {
        assert!(matches!(
            parse_plan_document("I could not produce a plan."),
            Err(DecomposeError::NoJson)
        ));
    }
}
