//! Reflector that enforces structural and tool policies.

use async_trait::async_trait;
use overmind_application::{CouncilError, Reflector};
use overmind_domain::{Blueprint, Critique, PlanDraft, PlanIssue, Task, Verification};
use serde_json::Value;
use std::collections::HashSet;

/// Largest plan approved by default.
pub const DEFAULT_MAX_TASKS: usize = 32;

pub struct PolicyReflector {
    tools: HashSet<String>,
    max_tasks: usize,
}

impl PolicyReflector {
    pub fn new(tools: impl IntoIterator<Item = String>) -> Self {
        Self {
            tools: tools.into_iter().collect(),
            max_tasks: DEFAULT_MAX_TASKS,
        }
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }
}

#[async_trait]
impl Reflector for PolicyReflector {
    async fn critique(
        &self,
        draft: &PlanDraft,
        blueprint: &Blueprint,
        issues: &[PlanIssue],
    ) -> Result<Critique, CouncilError> {
        let mut reasons: Vec<String> = issues.iter().map(ToString::to_string).collect();

        for task in &draft.tasks {
            if !self.tools.contains(&task.tool_name) {
                reasons.push(format!(
                    "task '{}' uses unknown tool '{}'",
                    task.key, task.tool_name
                ));
            }
        }
        if draft.tasks.len() > self.max_tasks {
            reasons.push(format!(
                "{} tasks exceed the limit of {}",
                draft.tasks.len(),
                self.max_tasks
            ));
        }
        if issues.is_empty() && blueprint.steps.len() != draft.tasks.len() {
            reasons.extend(blueprint.warnings.iter().cloned());
            reasons.push("blueprint does not cover every task".to_string());
        }

        if !reasons.is_empty() {
            return Ok(Critique::reject(reasons.join("; ")));
        }

        let stage_count = blueprint
            .steps
            .iter()
            .map(|s| s.stage + 1)
            .max()
            .unwrap_or(0);
        let mut rationale = format!("{} task(s) in {} stage(s)", draft.tasks.len(), stage_count);
        if !blueprint.warnings.is_empty() {
            rationale.push_str(&format!("; warnings: {}", blueprint.warnings.join("; ")));
        }
        Ok(Critique::approve(rationale))
    }

    async fn verify(&self, task: &Task, output: &Value) -> Result<Verification, CouncilError> {
        if output.is_null() {
            return Ok(Verification::unverified("tool returned no data"));
        }
        if let Some(error) = output.get("error").filter(|e| !e.is_null()) {
            return Ok(Verification::unverified(format!("tool reported {}", error)));
        }

        let verification = match task.tool_name.as_str() {
            "read_file" => match output.get("content").and_then(Value::as_str) {
                Some(content) => Verification::verified(format!("read {} bytes", content.len())),
                None => Verification::unverified("no file content in result"),
            },
            "write_file" => match output.get("bytes").and_then(Value::as_u64) {
                Some(bytes) => Verification::verified(format!("wrote {} bytes", bytes)),
                None => Verification::unverified("no byte count in result"),
            },
            "list_dir" => match output.get("entries").and_then(Value::as_array) {
                Some(entries) => Verification::verified(format!("{} entries", entries.len())),
                None => Verification::unverified("no entries in result"),
            },
            _ => Verification::verified("tool returned data"),
        };
        Ok(verification)
    }
}
