//! Dependency-graph checks for draft plans.

use super::plan::PlanDraft;
use super::value_objects::TaskKey;
use std::collections::{HashMap, HashSet};

/// A structural problem found in a draft plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanIssue {
    Empty,
    DuplicateKey(TaskKey),
    UnknownDependency { task: TaskKey, dependency: TaskKey },
    Cycle(Vec<TaskKey>),
}

impl std::fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanIssue::Empty => write!(f, "plan has no tasks"),
            PlanIssue::DuplicateKey(key) => write!(f, "duplicate task key '{}'", key),
            PlanIssue::UnknownDependency { task, dependency } => {
                write!(f, "task '{}' depends on unknown task '{}'", task, dependency)
            }
            PlanIssue::Cycle(path) => write!(
                f,
                "dependency cycle: {}",
                path.iter()
                    .map(TaskKey::as_str)
                    .collect::<Vec<_>>()
                    .join(" -> ")
            ),
        }
    }
}

/// Structural validation. `satisfied` lists keys that already succeeded in
/// an earlier plan and may be depended on without being re-declared.
pub fn validate_draft(draft: &PlanDraft, satisfied: &HashSet<TaskKey>) -> Vec<PlanIssue> {
    let mut issues = Vec::new();

    if draft.tasks.is_empty() {
        issues.push(PlanIssue::Empty);
        return issues;
    }

    let mut seen = HashSet::new();
    for task in &draft.tasks {
        if !seen.insert(task.key.clone()) {
            issues.push(PlanIssue::DuplicateKey(task.key.clone()));
        }
    }

    for task in &draft.tasks {
        for dep in &task.dependencies {
            if !seen.contains(dep) && !satisfied.contains(dep) {
                issues.push(PlanIssue::UnknownDependency {
                    task: task.key.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let graph: HashMap<&TaskKey, Vec<&TaskKey>> = draft
        .tasks
        .iter()
        .map(|t| (&t.key, t.dependencies.iter().collect()))
        .collect();
    let nodes: Vec<&TaskKey> = draft.tasks.iter().map(|t| &t.key).collect();
    if let Some(cycle) = detect_cycle(&nodes, &graph) {
        issues.push(PlanIssue::Cycle(cycle));
    }

    issues
}

/// Groups tasks into execution waves: wave 0 has no in-plan dependencies,
/// wave n depends only on earlier waves. Returns `None` for cyclic drafts.
pub fn execution_stages(draft: &PlanDraft) -> Option<HashMap<TaskKey, usize>> {
    let keys: HashSet<&TaskKey> = draft.tasks.iter().map(|t| &t.key).collect();
    let mut stages: HashMap<TaskKey, usize> = HashMap::new();

    while stages.len() < draft.tasks.len() {
        let before = stages.len();
        for task in &draft.tasks {
            if stages.contains_key(&task.key) {
                continue;
            }
            let mut stage = 0;
            let mut resolved = true;
            for dep in task.dependencies.iter().filter(|d| keys.contains(d)) {
                match stages.get(dep) {
                    Some(s) => stage = stage.max(s + 1),
                    None => {
                        resolved = false;
                        break;
                    }
                }
            }
            if resolved {
                stages.insert(task.key.clone(), stage);
            }
        }
        if stages.len() == before {
            return None;
        }
    }

    Some(stages)
}

fn detect_cycle<'a>(
    nodes: &[&'a TaskKey],
    graph: &HashMap<&'a TaskKey, Vec<&'a TaskKey>>,
) -> Option<Vec<TaskKey>> {
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    let mut path = Vec::new();

    for &node in nodes {
        if dfs(node, graph, &mut visited, &mut on_stack, &mut path) {
            return Some(path.into_iter().cloned().collect());
        }
    }
    None
}

fn dfs<'a>(
    node: &'a TaskKey,
    graph: &HashMap<&'a TaskKey, Vec<&'a TaskKey>>,
    visited: &mut HashSet<&'a TaskKey>,
    on_stack: &mut HashSet<&'a TaskKey>,
    path: &mut Vec<&'a TaskKey>,
) -> bool {
    if on_stack.contains(node) {
        path.push(node);
        return true;
    }
    if !visited.insert(node) {
        return false;
    }

    on_stack.insert(node);
    path.push(node);

    if let Some(deps) = graph.get(&node) {
        for &dep in deps {
            if dfs(dep, graph, visited, on_stack, path) {
                return true;
            }
        }
    }

    on_stack.remove(node);
    path.pop();
    false
}
