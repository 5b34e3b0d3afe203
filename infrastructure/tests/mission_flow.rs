//! End-to-end mission runs against the rule-based council and real
//! repositories.

use async_trait::async_trait;
use futures::StreamExt;
use overmind_application::resilience::RetryConfig;
use overmind_application::{
    CircuitBreakerRegistry, Council, FailureClass, MissionRepository, MissionRunner,
    MissionService, MissionServiceError, OrchestratorParams, OvermindOrchestrator, ProgressKind,
    ResilienceConfig, RunnerParams,
};
use overmind_domain::{EventType, MissionId, MissionStatus, TaskStatus, ToolError};
use overmind_infrastructure::{
    BlueprintArchitect, InMemoryMissionRepository, PolicyReflector, RulePlanner,
    SqliteMissionRepository, Tool, ToolOperator, ToolRegistry, rule_based_council,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn fast_resilience() -> ResilienceConfig {
    ResilienceConfig::default().with_retry(RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential_base: 2.0,
        jitter: false,
        retry_on: vec![FailureClass::Transient, FailureClass::Timeout],
    })
}

fn orchestrator(
    repository: Arc<dyn MissionRepository>,
    registry: ToolRegistry,
) -> OvermindOrchestrator {
    let invoker = Arc::new(registry);
    OvermindOrchestrator::new(
        repository,
        rule_based_council(invoker),
        Arc::new(CircuitBreakerRegistry::new()),
    )
    .with_resilience(fast_resilience())
}

async fn event_types(repository: &dyn MissionRepository, id: MissionId) -> Vec<EventType> {
    repository
        .list_events(id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

async fn status_path(repository: &dyn MissionRepository, id: MissionId) -> Vec<MissionStatus> {
    repository
        .list_events(id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == EventType::StatusChanged)
        .map(|e| serde_json::from_value(e.payload["to"].clone()).unwrap())
        .collect()
}

/// `(from, to)` of every STATUS_CHANGED event, oldest first.
async fn status_changes(
    repository: &dyn MissionRepository,
    id: MissionId,
) -> Vec<(MissionStatus, MissionStatus)> {
    repository
        .list_events(id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == EventType::StatusChanged)
        .map(|e| {
            (
                serde_json::from_value(e.payload["from"].clone()).unwrap(),
                serde_json::from_value(e.payload["to"].clone()).unwrap(),
            )
        })
        .collect()
}

/// Echo that records when each message starts and ends.
struct RecordingEcho {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Tool for RecordingEcho {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "echo with a start/end log"
    }

    async fn call(&self, args: &Value) -> Result<Value, ToolError> {
        let message = args["message"].as_str().unwrap_or_default().to_string();
        self.log.lock().unwrap().push(format!("start:{}", message));
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.log.lock().unwrap().push(format!("end:{}", message));
        Ok(args.clone())
    }
}

async fn wait_for_status(
    service: &MissionService,
    id: MissionId,
    accept: impl Fn(MissionStatus) -> bool,
) -> MissionStatus {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = service.get_mission_status(id).await.unwrap().status;
        if accept(status) || Instant::now() > deadline {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_successful_mission_event_sequence() {
    let repository = Arc::new(InMemoryMissionRepository::new());
    let orchestrator = orchestrator(repository.clone(), ToolRegistry::with_builtin_tools());

    let mission = repository.create_mission("echo hello", 1).await.unwrap();
    let outcome = orchestrator.run(mission.id).await.unwrap();

    assert_eq!(outcome.status, MissionStatus::Success);
    assert_eq!(outcome.summary, "1 task(s) succeeded");
    assert_eq!(outcome.adaptations, 0);

    assert_eq!(
        event_types(repository.as_ref(), mission.id).await,
        vec![
            EventType::StatusChanged,
            EventType::PlanProposed,
            EventType::PlanApproved,
            EventType::StatusChanged,
            EventType::StatusChanged,
            EventType::TaskStarted,
            EventType::TaskSucceeded,
            EventType::StatusChanged,
            EventType::MissionCompleted,
        ]
    );
    assert_eq!(
        status_path(repository.as_ref(), mission.id).await,
        vec![
            MissionStatus::Planning,
            MissionStatus::Planned,
            MissionStatus::Running,
            MissionStatus::Success,
        ]
    );

    let stored = repository.get_mission(mission.id).await.unwrap();
    assert_eq!(stored.status, MissionStatus::Success);
    assert!(stored.active_plan_id.is_some());
    assert_eq!(stored.result_summary.as_deref(), Some("1 task(s) succeeded"));
}

#[tokio::test]
async fn test_dependent_stage_waits_for_previous_stage() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = ToolRegistry::new().register(RecordingEcho { log: log.clone() });
    let repository = Arc::new(InMemoryMissionRepository::new());
    let orchestrator = orchestrator(repository.clone(), registry)
        .with_params(OrchestratorParams::default().with_max_parallel_tasks(4));

    let mission = repository
        .create_mission("echo a, echo b then echo c", 1)
        .await
        .unwrap();
    let outcome = orchestrator.run(mission.id).await.unwrap();
    assert_eq!(outcome.status, MissionStatus::Success);

    let log = log.lock().unwrap().clone();
    let position = |entry: &str| log.iter().position(|e| e == entry).unwrap();
    assert!(position("start:c") > position("end:a"));
    assert!(position("start:c") > position("end:b"));

    let tasks = repository.get_tasks_for_mission(mission.id).await.unwrap();
    assert_eq!(tasks.len(), 3);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Success));
}

#[tokio::test]
async fn test_sqlite_mission_keeps_structured_results() {
    let dir = tempfile::tempdir().unwrap();
    let repository =
        Arc::new(SqliteMissionRepository::open(dir.path().join("missions.db")).unwrap());
    let registry = ToolRegistry::with_builtin_tools();
    let orchestrator = orchestrator(repository.clone(), registry);

    let mission = repository.create_mission("echo x", 7).await.unwrap();
    let outcome = orchestrator.run(mission.id).await.unwrap();
    assert_eq!(outcome.status, MissionStatus::Success);

    let tasks = repository.get_tasks_for_mission(mission.id).await.unwrap();
    assert_eq!(tasks[0].result, Some(json!({ "message": "x" })));

    let events = repository.list_events(mission.id).await.unwrap();
    let succeeded = events
        .iter()
        .find(|e| e.event_type == EventType::TaskSucceeded)
        .unwrap();
    assert_eq!(succeeded.payload["result"], json!({ "message": "x" }));
    assert!(succeeded.payload["result"].is_object());

    let details = repository.get_mission_by_id(mission.id).await.unwrap();
    assert_eq!(details.active_plan().map(|p| p.version), Some(1));
}

#[tokio::test]
async fn test_rejected_plan_fails_mission() {
    let repository = Arc::new(InMemoryMissionRepository::new());
    let invoker = Arc::new(ToolRegistry::with_builtin_tools());
    let tools = invoker.describe().into_iter().map(|(name, _)| name).collect::<Vec<_>>();
    let council = Council::new(
        Arc::new(RulePlanner::new(tools.clone())),
        Arc::new(BlueprintArchitect::new()),
        Arc::new(PolicyReflector::new(tools).with_max_tasks(1)),
        Arc::new(ToolOperator::new(invoker)),
    );
    let orchestrator = OvermindOrchestrator::new(
        repository.clone(),
        council,
        Arc::new(CircuitBreakerRegistry::new()),
    )
    .with_resilience(fast_resilience());

    let mission = repository.create_mission("echo a, echo b", 1).await.unwrap();
    let outcome = orchestrator.run(mission.id).await.unwrap();

    assert_eq!(outcome.status, MissionStatus::Failed);
    assert!(outcome.summary.starts_with("Plan rejected:"));

    let events = repository.list_events(mission.id).await.unwrap();
    let rejected = events
        .iter()
        .find(|e| e.event_type == EventType::PlanRejected)
        .unwrap();
    assert!(!rejected.payload["rationale"].as_str().unwrap().is_empty());
    assert_eq!(
        events.last().map(|e| e.event_type),
        Some(EventType::MissionFailed)
    );
    assert!(
        repository
            .get_tasks_for_mission(mission.id)
            .await
            .unwrap()
            .is_empty()
    );
    let details = repository.get_mission_by_id(mission.id).await.unwrap();
    assert!(details.mission.active_plan_id.is_none());
}

#[tokio::test]
async fn test_failed_task_is_replanned() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.txt");
    let repository = Arc::new(InMemoryMissionRepository::new());
    let orchestrator = orchestrator(repository.clone(), ToolRegistry::with_builtin_tools());

    let objective = format!("read {} then echo done", missing.display());
    let mission = repository.create_mission(&objective, 1).await.unwrap();
    let outcome = orchestrator.run(mission.id).await.unwrap();

    assert_eq!(outcome.status, MissionStatus::Success);
    assert_eq!(outcome.adaptations, 1);
    assert_eq!(
        status_path(repository.as_ref(), mission.id).await,
        vec![
            MissionStatus::Planning,
            MissionStatus::Planned,
            MissionStatus::Running,
            MissionStatus::Adapting,
            MissionStatus::Planning,
            MissionStatus::Planned,
            MissionStatus::Running,
            MissionStatus::Success,
        ]
    );

    let types = event_types(repository.as_ref(), mission.id).await;
    assert!(types.contains(&EventType::TaskFailed));
    assert!(types.contains(&EventType::AdaptationRequested));

    let details = repository.get_mission_by_id(mission.id).await.unwrap();
    assert_eq!(details.active_plan().map(|p| p.version), Some(2));

    let tasks = repository.get_tasks_for_mission(mission.id).await.unwrap();
    let active = details.mission.active_plan_id.unwrap();
    assert!(
        tasks
            .iter()
            .filter(|t| t.plan_id == active)
            .all(|t| t.status == TaskStatus::Success)
    );
    assert!(tasks.iter().all(|t| t.status.is_terminal()));
}

#[tokio::test]
async fn test_no_adaptation_budget_fails_mission() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.txt");
    let repository = Arc::new(InMemoryMissionRepository::new());
    let orchestrator = orchestrator(repository.clone(), ToolRegistry::with_builtin_tools())
        .with_params(OrchestratorParams::default().with_max_adaptations(0));

    let objective = format!("read {} then echo done", missing.display());
    let mission = repository.create_mission(&objective, 1).await.unwrap();
    let outcome = orchestrator.run(mission.id).await.unwrap();

    assert_eq!(outcome.status, MissionStatus::Failed);
    assert_eq!(outcome.adaptations, 0);

    let tasks = repository.get_tasks_for_mission(mission.id).await.unwrap();
    let status_of = |key: &str| {
        tasks
            .iter()
            .find(|t| t.task_key.as_str() == key)
            .map(|t| t.status)
    };
    assert_eq!(status_of("step-1"), Some(TaskStatus::Failed));
    assert_eq!(status_of("step-2"), Some(TaskStatus::Skipped));

    let types = event_types(repository.as_ref(), mission.id).await;
    assert!(!types.contains(&EventType::AdaptationRequested));
    assert_eq!(types.last(), Some(&EventType::MissionFailed));
}

#[tokio::test]
async fn test_service_runs_mission_and_streams_progress() {
    let repository: Arc<dyn MissionRepository> = Arc::new(InMemoryMissionRepository::new());
    let params = RunnerParams::default()
        .with_workers(1)
        .with_poll_interval(Duration::from_millis(10));
    let runner = Arc::new(
        MissionRunner::start(
            orchestrator(repository.clone(), ToolRegistry::with_builtin_tools()),
            &params,
        )
        .unwrap(),
    );
    let service = MissionService::new(repository.clone(), runner.clone(), params);

    let started = service.start_mission("  echo hi then echo bye ", 42).await.unwrap();
    assert_eq!(started.status, MissionStatus::Pending);
    assert_eq!(started.objective_excerpt, "echo hi then echo bye");

    let lines: Vec<_> = service.stream_progress(started.mission_id).collect().await;
    let last = lines.last().unwrap();
    assert_eq!(last.kind, ProgressKind::Terminal);
    assert_eq!(last.status, Some(MissionStatus::Success));
    assert_eq!(lines.iter().filter(|l| l.is_final()).count(), 1);

    let log = service.event_log(started.mission_id).await.unwrap();
    assert_eq!(log[0].event_type, EventType::Created);
    assert_eq!(log[0].payload["initiator_id"], json!(42));
    assert_eq!(
        log.last().map(|e| e.event_type),
        Some(EventType::MissionCompleted)
    );

    let snapshot = service.get_mission_status(started.mission_id).await.unwrap();
    assert!(snapshot.is_terminal);
    assert_eq!(snapshot.tasks.success, 2);

    runner.shutdown();
}

#[tokio::test]
async fn test_cancel_running_mission() {
    let repository: Arc<dyn MissionRepository> = Arc::new(InMemoryMissionRepository::new());
    let params = RunnerParams::default().with_workers(1);
    let runner = Arc::new(
        MissionRunner::start(
            orchestrator(repository.clone(), ToolRegistry::with_builtin_tools()),
            &params,
        )
        .unwrap(),
    );
    let service = MissionService::new(repository.clone(), runner.clone(), params);

    let started = service.start_mission("wait 60s then echo late", 1).await.unwrap();
    let status = wait_for_status(&service, started.mission_id, |s| {
        s == MissionStatus::Running
    })
    .await;
    assert_eq!(status, MissionStatus::Running);

    let snapshot = service.cancel_mission(started.mission_id).await.unwrap();
    assert_eq!(snapshot.status, MissionStatus::Canceled);
    assert!(snapshot.is_terminal);

    let deadline = Instant::now() + Duration::from_secs(10);
    while runner.is_active(started.mission_id) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!runner.is_active(started.mission_id));

    let mission = repository.get_mission(started.mission_id).await.unwrap();
    assert_eq!(mission.status, MissionStatus::Canceled);
    let tasks = repository
        .get_tasks_for_mission(started.mission_id)
        .await
        .unwrap();
    assert!(tasks.iter().all(|t| t.status.is_terminal()));
    assert!(tasks.iter().all(|t| t.status != TaskStatus::Success));

    let types = event_types(repository.as_ref(), started.mission_id).await;
    assert_eq!(
        types
            .iter()
            .filter(|t| **t == EventType::MissionCanceled)
            .count(),
        1
    );
    assert!(!types.contains(&EventType::MissionFailed));

    // Every recorded change starts where the previous one ended.
    let changes = status_changes(repository.as_ref(), started.mission_id).await;
    assert_eq!(changes.first().map(|c| c.0), Some(MissionStatus::Pending));
    assert!(changes.windows(2).all(|w| w[0].1 == w[1].0));
    assert_eq!(
        changes.last(),
        Some(&(MissionStatus::Running, MissionStatus::Canceled))
    );

    // Canceling again leaves the terminal mission alone.
    let again = service.cancel_mission(started.mission_id).await.unwrap();
    assert_eq!(again.status, MissionStatus::Canceled);

    runner.shutdown();
}

#[tokio::test]
async fn test_progress_stream_hands_off_to_background() {
    let repository: Arc<dyn MissionRepository> = Arc::new(InMemoryMissionRepository::new());
    let params = RunnerParams::default()
        .with_workers(1)
        .with_poll_interval(Duration::from_millis(10))
        .with_max_polls(2);
    let runner = Arc::new(
        MissionRunner::start(
            orchestrator(repository.clone(), ToolRegistry::with_builtin_tools()),
            &params,
        )
        .unwrap(),
    );
    let service = MissionService::new(repository.clone(), runner.clone(), params);

    let busy = service.start_mission("wait 60s", 1).await.unwrap();
    // The only worker is taken, so the second mission has not started.
    let queued = service.start_mission("echo later", 1).await.unwrap();
    let snapshot = service.get_mission_status(queued.mission_id).await.unwrap();
    assert!(matches!(
        snapshot.status,
        MissionStatus::Pending | MissionStatus::Planning
    ));
    assert!(!snapshot.is_terminal);

    let lines: Vec<_> = service.stream_progress(busy.mission_id).collect().await;
    let last = lines.last().unwrap();
    assert_eq!(last.kind, ProgressKind::Background);
    assert!(last.status.is_some_and(|s| !s.is_terminal()));
    assert_eq!(lines.iter().filter(|l| l.is_final()).count(), 1);
    assert!(lines.len() <= 3);

    service.cancel_mission(busy.mission_id).await.unwrap();
    service.cancel_mission(queued.mission_id).await.unwrap();
    runner.shutdown();
}

#[tokio::test]
async fn test_full_queue_rejects_mission() {
    let repository: Arc<dyn MissionRepository> = Arc::new(InMemoryMissionRepository::new());
    let params = RunnerParams::default()
        .with_workers(1)
        .with_queue_capacity(1);
    let runner = Arc::new(
        MissionRunner::start(
            orchestrator(repository.clone(), ToolRegistry::with_builtin_tools()),
            &params,
        )
        .unwrap(),
    );
    let service = MissionService::new(repository.clone(), runner.clone(), params);

    let mut accepted = Vec::new();
    let mut rejected = 0;
    for _ in 0..3 {
        match service.start_mission("wait 60s", 1).await {
            Ok(started) => accepted.push(started.mission_id),
            Err(MissionServiceError::QueueFull) => rejected += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert!(rejected >= 1);

    // Rejected missions are closed rather than left PENDING.
    let missions = repository.list_missions(10).await.unwrap();
    assert_eq!(missions.len(), 3);
    assert_eq!(
        missions
            .iter()
            .filter(|m| m.status == MissionStatus::Canceled)
            .count(),
        rejected
    );

    for id in accepted {
        service.cancel_mission(id).await.unwrap();
    }
    runner.shutdown();
}

#[tokio::test]
async fn test_invalid_objective_is_rejected() {
    let repository: Arc<dyn MissionRepository> = Arc::new(InMemoryMissionRepository::new());
    let service = MissionService::read_only(repository.clone(), RunnerParams::default());

    assert!(matches!(
        service.start_mission("   ", 1).await,
        Err(MissionServiceError::InvalidObjective(_))
    ));
    assert!(repository.list_missions(10).await.unwrap().is_empty());
}
