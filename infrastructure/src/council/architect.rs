//! Architect that orders a draft into execution stages.

use async_trait::async_trait;
use overmind_application::{Architect, CouncilError};
use overmind_domain::{Blueprint, BlueprintStep, PlanDraft, execution_stages};
use serde_json::Value;

/// Tools that can run without arguments.
const ARGLESS_TOOLS: &[&str] = &["echo"];

#[derive(Debug, Default)]
pub struct BlueprintArchitect;

impl BlueprintArchitect {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Architect for BlueprintArchitect {
    async fn elaborate(&self, draft: &PlanDraft) -> Result<Blueprint, CouncilError> {
        let Some(stages) = execution_stages(draft) else {
            return Ok(Blueprint {
                steps: Vec::new(),
                warnings: vec!["no execution order exists for the dependency graph".to_string()],
            });
        };

        let mut warnings = Vec::new();
        let steps = draft
            .tasks
            .iter()
            .map(|task| {
                if task.tool_args == Value::Null && !ARGLESS_TOOLS.contains(&task.tool_name.as_str())
                {
                    warnings.push(format!("task '{}' has no arguments", task.key));
                }
                let stage = stages.get(&task.key).copied().unwrap_or(0);
                BlueprintStep {
                    key: task.key.clone(),
                    stage,
                    notes: format!("stage {}: {} via {}", stage, task.description, task.tool_name),
                }
            })
            .collect();

        Ok(Blueprint { steps, warnings })
    }
}
