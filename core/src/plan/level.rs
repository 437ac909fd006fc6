//! Level computation: partition a plan into waves of independent tasks.
//!
//! Kahn's algorithm over the validated plan. Every task in a level has all
//! of its dependencies in strictly earlier levels, so a level can fan out
//! concurrently once the previous level is fully terminal.

use super::graph::{ExecutionPlan, GraphError};
use super::task::TaskId;

/// One wave of tasks whose dependencies are all satisfied by earlier levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    /// Task ids in plan insertion order.
    pub tasks: Vec<TaskId>,
}

/// Compute the ordered level sequence for a plan.
///
/// Ties within a level are broken by insertion order, so event ordering and
/// logs are reproducible across runs of the same plan. The trailing cycle
/// check guards the invariant that `ExecutionPlan::build` already enforced.
pub fn levelize(plan: &ExecutionPlan) -> Result<Vec<Level>, GraphError> {
    let n = plan.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, task) in plan.tasks().iter().enumerate() {
        for dep in &task.dependencies {
            if let Some(d) = plan.index_of(dep) {
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }
    }

    let mut current: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut levels = Vec::new();
    let mut placed = 0;

    while !current.is_empty() {
        current.sort_unstable();
        placed += current.len();

        let mut next = Vec::new();
        for &i in &current {
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }

        levels.push(Level {
            tasks: current
                .iter()
                .map(|&i| plan.tasks()[i].id.clone())
                .collect(),
        });
        current = next;
    }

    if placed != n {
        let remaining: Vec<TaskId> = (0..n)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| plan.tasks()[i].id.clone())
            .collect();
        return Err(GraphError::CycleDetected(remaining));
    }

    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::graph::GoalId;
    use crate::plan::task::TaskSpec;

    fn plan(specs: Vec<TaskSpec>) -> ExecutionPlan {
        ExecutionPlan::build(GoalId::new(), specs).unwrap()
    }

    fn spec(id: &str, deps: &[&str]) -> TaskSpec {
        let mut s = TaskSpec::new(id, "noop");
        for dep in deps {
            s = s.depends_on(*dep);
        }
        s
    }

    fn ids(level: &Level) -> Vec<&str> {
        level.tasks.iter().map(TaskId::as_str).collect()
    }

    #[test]
    fn test_single_root_fan_out() {
        let levels = levelize(&plan(vec![
            spec("a", &[]),
            spec("b", &["a"]),
            spec("c", &["a"]),
        ]))
        .unwrap();

        assert_eq!(levels.len(), 2);
        assert_eq!(ids(&levels[0]), vec!["a"]);
        assert_eq!(ids(&levels[1]), vec!["b", "c"]);
    }

    #[test]
    fn test_diamond() {
        let levels = levelize(&plan(vec![
            spec("a", &[]),
            spec("b", &["a"]),
            spec("c", &["a"]),
            spec("d", &["b", "c"]),
        ]))
        .unwrap();

        assert_eq!(levels.len(), 3);
        assert_eq!(ids(&levels[1]), vec!["b", "c"]);
        assert_eq!(ids(&levels[2]), vec!["d"]);
    }

    #[test]
    fn test_insertion_order_tie_break() {
        // Three independent roots keep their declaration order.
        let levels = levelize(&plan(vec![
            spec("z", &[]),
            spec("m", &[]),
            spec("a", &[]),
        ]))
        .unwrap();

        assert_eq!(ids(&levels[0]), vec!["z", "m", "a"]);
    }

    #[test]
    fn test_union_of_levels_is_exactly_the_task_set() {
        let p = plan(vec![
            spec("a", &[]),
            spec("b", &["a"]),
            spec("c", &["a"]),
            spec("d", &["b"]),
            spec("e", &["b", "c"]),
        ]);
        let levels = levelize(&p).unwrap();

        let mut seen: Vec<&TaskId> = levels.iter().flat_map(|l| l.tasks.iter()).collect();
        assert_eq!(seen.len(), p.len());
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), p.len());
    }

    #[test]
    fn test_deeper_dependency_pushes_level_down() {
        // e depends on both a root and a level-1 task, so it lands in level 2.
        let levels = levelize(&plan(vec![
            spec("a", &[]),
            spec("b", &["a"]),
            spec("e", &["a", "b"]),
        ]))
        .unwrap();

        assert_eq!(levels.len(), 3);
        assert_eq!(ids(&levels[2]), vec!["e"]);
    }
}
