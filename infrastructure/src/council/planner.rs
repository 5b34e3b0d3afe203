//! Planner that reads the objective as a small command language.
//!
//! ```text
//! read Cargo.toml, list src then echo done
//! ```
//!
//! `then`, `;` and line breaks separate stages; commas separate tasks that
//! may run side by side. Every task depends on all tasks of the previous
//! stage. A task's first word picks the tool:
//!
//! | Verb | Tool | Arguments |
//! |------|------|-----------|
//! | `read <path>` | `read_file` | `path` |
//! | `list <path>` | `list_dir` | `path` |
//! | `write <path> <text>` | `write_file` | `path`, `content` |
//! | `wait <n>[ms\|s]`, `sleep ...` | `sleep` | `ms` |
//! | anything else | `echo` | `message` |

use async_trait::async_trait;
use overmind_application::{CouncilError, Planner};
use overmind_domain::{PlanDraft, PlanFeedback, TaskKey, TaskSpec};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

pub struct RulePlanner {
    tools: Vec<String>,
}

impl RulePlanner {
    /// `tools` are the names the tool invoker offers; verbs whose tool is
    /// missing fall back to `echo`.
    pub fn new(tools: Vec<String>) -> Self {
        Self { tools }
    }

    fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t == name)
    }

    fn interpret(&self, item: &str) -> (String, Value) {
        let (verb, rest) = item.split_once(' ').unwrap_or((item, ""));
        let rest = rest.trim();
        let (tool, args) = match verb.to_lowercase().as_str() {
            "read" if !rest.is_empty() => ("read_file", json!({ "path": rest })),
            "list" if !rest.is_empty() => ("list_dir", json!({ "path": rest })),
            "write" => match rest.split_once(' ') {
                Some((path, content)) => (
                    "write_file",
                    json!({ "path": path, "content": content.trim(), "create_dirs": true }),
                ),
                None => ("echo", json!({ "message": item })),
            },
            "wait" | "sleep" => match parse_millis(rest) {
                Some(ms) => ("sleep", json!({ "ms": ms })),
                None => ("echo", json!({ "message": item })),
            },
            "echo" | "say" if !rest.is_empty() => ("echo", json!({ "message": rest })),
            _ => ("echo", json!({ "message": item })),
        };

        if self.has_tool(tool) {
            (tool.to_string(), args)
        } else {
            ("echo".to_string(), json!({ "message": item }))
        }
    }
}

/// Splits the objective into stages of task phrases.
fn stages(objective: &str) -> Vec<Vec<String>> {
    let mut stages = Vec::new();
    for segment in objective.split([';', '\n']) {
        let mut current: Vec<&str> = Vec::new();
        for word in segment.split_whitespace() {
            if word.trim_end_matches(',').eq_ignore_ascii_case("then") {
                push_stage(&mut stages, &current.join(" "));
                current.clear();
            } else {
                current.push(word);
            }
        }
        push_stage(&mut stages, &current.join(" "));
    }
    stages
}

fn push_stage(stages: &mut Vec<Vec<String>>, text: &str) {
    let items: Vec<String> = text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if !items.is_empty() {
        stages.push(items);
    }
}

fn base_key(key: &TaskKey) -> &str {
    key.as_str().split('~').next().unwrap_or(key.as_str())
}

/// `250`, `250ms`, `2s`
fn parse_millis(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(ms) = text.strip_suffix("ms") {
        ms.trim().parse().ok()
    } else if let Some(secs) = text.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(|s| s.saturating_mul(1000))
    } else {
        text.parse().ok()
    }
}

#[async_trait]
impl Planner for RulePlanner {
    async fn propose(
        &self,
        objective: &str,
        feedback: Option<&PlanFeedback>,
    ) -> Result<PlanDraft, CouncilError> {
        let stages = stages(objective);
        // Keyed by base key so revised keys (`step-1~v2`) still match.
        let failures: HashMap<&str, &str> = feedback
            .map(|f| {
                f.failures
                    .iter()
                    .map(|(k, r)| (base_key(k), r.as_str()))
                    .collect()
            })
            .unwrap_or_default();

        let mut tasks = Vec::new();
        let mut previous: Vec<TaskKey> = Vec::new();
        let mut replaced = 0;
        for stage in &stages {
            let mut keys = Vec::with_capacity(stage.len());
            for item in stage {
                let key = TaskKey::new(format!("step-{}", tasks.len() + 1));
                let mut spec = match failures.get(key.as_str()) {
                    // A failed step is replaced by a report of the failure.
                    Some(reason) => {
                        replaced += 1;
                        TaskSpec::new(key.clone(), format!("report: {}", item), "echo").with_args(
                            json!({ "message": format!("'{}' could not be completed: {}", item, reason) }),
                        )
                    }
                    None => {
                        let (tool, args) = self.interpret(item);
                        TaskSpec::new(key.clone(), item.clone(), tool).with_args(args)
                    }
                };
                spec.dependencies = previous.clone();
                tasks.push(spec);
                keys.push(key);
            }
            previous = keys;
        }

        let rationale = match feedback {
            Some(f) => format!(
                "adaptation {}: {} task(s) in {} stage(s), {} failed step(s) replaced by reports",
                f.adaptation,
                tasks.len(),
                stages.len(),
                replaced
            ),
            None => format!("{} task(s) in {} stage(s)", tasks.len(), stages.len()),
        };
        debug!("Planner proposed {}", rationale);

        let mut draft = PlanDraft::new(objective, rationale);
        draft.tasks = tasks;
        Ok(draft)
    }
}
