//! Planning phase: propose, validate, elaborate, critique, persist.

use super::OvermindOrchestrator;
use super::types::{OrchestratorError, PlanningOutcome};
use crate::ports::council::CouncilRole;
use crate::ports::mission_repository::RepositoryError;
use overmind_domain::{
    EventType, MissionId, MissionStatus, NewMissionPlan, NewTask, PlanDraft, PlanFeedback,
    PlanStatus, TaskKey, TaskStatus, validate_draft,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

impl OvermindOrchestrator {
    /// One planning pass. The mission is PLANNING on entry; on approval it is
    /// PLANNED on return, on rejection it is still PLANNING and the caller
    /// fails it.
    pub(super) async fn plan_mission(
        &self,
        objective: &str,
        mission_id: MissionId,
        feedback: Option<&PlanFeedback>,
    ) -> Result<PlanningOutcome, OrchestratorError> {
        let existing = self.repository.get_tasks_for_mission(mission_id).await?;
        let satisfied: HashSet<TaskKey> = existing
            .iter()
            .filter(|t| t.status == TaskStatus::Success)
            .map(|t| t.task_key.clone())
            .collect();

        let planner = &self.council.planner;
        let proposed: PlanDraft = self
            .council_call(CouncilRole::Planner, || planner.propose(objective, feedback))
            .await?;
        debug!(
            "Planner proposed {} task(s) for mission {}",
            proposed.tasks.len(),
            mission_id
        );

        // Work that already succeeded is not redone.
        let mut draft = proposed.clone();
        draft.tasks.retain(|t| !satisfied.contains(&t.key));

        let issues = validate_draft(&draft, &satisfied);
        for issue in &issues {
            warn!("Mission {} plan issue: {}", mission_id, issue);
        }

        let architect = &self.council.architect;
        let blueprint = self
            .council_call(CouncilRole::Architect, || architect.elaborate(&draft))
            .await?;

        let reflector = &self.council.reflector;
        let critique = self
            .council_call(CouncilRole::Reflector, || {
                reflector.critique(&draft, &blueprint, &issues)
            })
            .await?;

        let mut warnings: Vec<String> = issues.iter().map(ToString::to_string).collect();
        warnings.extend(blueprint.warnings.iter().cloned());

        self.append_event(
            mission_id,
            EventType::PlanProposed,
            json!({
                "task_count": draft.tasks.len(),
                "reused": satisfied.len(),
                "warnings": warnings,
                "adaptation": feedback.map(|f| f.adaptation).unwrap_or(0),
            }),
        )
        .await?;

        let raw_plan = serde_json::to_value(&proposed).map_err(RepositoryError::from)?;
        let plan = self
            .repository
            .create_mission_plan(NewMissionPlan {
                mission_id,
                status: if critique.approved {
                    PlanStatus::Approved
                } else {
                    PlanStatus::Rejected
                },
                rationale: critique.rationale.clone(),
                stats: draft.stats(),
                warnings: json!(warnings),
                raw_plan,
                telemetry: json!({
                    "adaptation": feedback.map(|f| f.adaptation).unwrap_or(0),
                    "issues": issues.len(),
                    "blueprint": blueprint,
                }),
            })
            .await?;

        if !critique.approved {
            info!(
                "Mission {} plan v{} rejected: {}",
                mission_id, plan.version, critique.rationale
            );
            self.append_event(
                mission_id,
                EventType::PlanRejected,
                json!({
                    "plan_id": plan.id,
                    "version": plan.version,
                    "rationale": critique.rationale,
                }),
            )
            .await?;
            return Ok(PlanningOutcome::Rejected {
                rationale: critique.rationale,
            });
        }

        self.repository.set_active_plan(mission_id, plan.id).await?;

        let taken: HashSet<&TaskKey> = existing.iter().map(|t| &t.task_key).collect();
        let renames = revision_keys(&draft, &taken, plan.version);
        for task in &draft.tasks {
            let key = renames.get(&task.key).unwrap_or(&task.key).clone();
            let dependencies = task
                .dependencies
                .iter()
                .map(|d| renames.get(d).unwrap_or(d).clone())
                .collect();
            self.repository
                .create_task(NewTask {
                    mission_id,
                    plan_id: plan.id,
                    task_key: key,
                    description: task.description.clone(),
                    tool_name: task.tool_name.clone(),
                    tool_args: task.tool_args.clone(),
                    dependencies,
                })
                .await?;
        }

        info!(
            "Mission {} plan v{} approved with {} task(s)",
            mission_id,
            plan.version,
            draft.tasks.len()
        );
        self.append_event(
            mission_id,
            EventType::PlanApproved,
            json!({
                "plan_id": plan.id,
                "version": plan.version,
                "task_count": draft.tasks.len(),
                "rationale": critique.rationale,
            }),
        )
        .await?;
        self.transition(mission_id, MissionStatus::Planned, None)
            .await?;

        Ok(PlanningOutcome::Approved(plan))
    }
}

/// Keys of the draft that collide with tasks already in the mission, mapped
/// to their revision for `plan_version`.
fn revision_keys(
    draft: &PlanDraft,
    taken: &HashSet<&TaskKey>,
    plan_version: u32,
) -> HashMap<TaskKey, TaskKey> {
    draft
        .tasks
        .iter()
        .filter(|t| taken.contains(&t.key))
        .map(|t| (t.key.clone(), t.key.revision(plan_version)))
        .collect()
}
