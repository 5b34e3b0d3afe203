//! SQLite mission repository.
//!
//! Each operation opens its own connection on the blocking pool. Writes that
//! read before they write (version assignment, transition and task checks)
//! run in `IMMEDIATE` transactions so concurrent writers serialize on the
//! database lock instead of racing.

mod schema;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use overmind_application::ports::mission_repository::{
    MissionRepository, RepositoryError, StatusTransition, check_mission_transition,
    check_task_update, status_changed_payload,
};
use overmind_domain::{
    DomainError, EventType, Mission, MissionDetails, MissionEvent, MissionId, MissionPlan,
    MissionStatus, NewMissionPlan, NewTask, PlanId, PlanStatus, Task, TaskId, TaskKey, TaskStatus,
};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure inside a blocking operation, before it is mapped to the port's
/// error type.
#[derive(Error, Debug)]
enum StoreError {
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Repository(RepositoryError::from(e))
    }
}

impl From<DomainError> for StoreError {
    fn from(e: DomainError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl From<chrono::ParseError> for StoreError {
    fn from(e: chrono::ParseError) -> Self {
        StoreError::Decode(format!("bad timestamp: {}", e))
    }
}

impl StoreError {
    fn into_repository(self, operation: &str) -> RepositoryError {
        match self {
            StoreError::Repository(e) => e,
            StoreError::Sql(rusqlite::Error::SqliteFailure(e, message))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RepositoryError::Conflict(message.unwrap_or_else(|| e.to_string()))
            }
            StoreError::Decode(message) => RepositoryError::Serialization(message),
            other => {
                RepositoryError::Storage(format!("sqlite store '{operation}' failed: {other}"))
            }
        }
    }
}

type StoreResult<T> = Result<T, StoreError>;

pub struct SqliteMissionRepository {
    database_path: PathBuf,
}

impl SqliteMissionRepository {
    /// Opens (or creates) the database at `database_path` and makes sure the
    /// schema exists.
    pub fn open(database_path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let database_path = database_path.into();
        open_connection(&database_path)
            .and_then(|connection| Ok(connection.execute_batch(schema::SCHEMA)?))
            .map_err(|e| e.into_repository("open"))?;
        debug!("SQLite mission store at {}", database_path.display());
        Ok(Self { database_path })
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    async fn with_connection<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let path = self.database_path.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut connection = open_connection(&path)?;
            f(&mut connection)
        })
        .await;

        match joined {
            Ok(result) => result.map_err(|e| e.into_repository(operation)),
            Err(e) => Err(RepositoryError::Storage(format!(
                "sqlite store '{operation}' task failed: {e}"
            ))),
        }
    }
}

#[async_trait]
impl MissionRepository for SqliteMissionRepository {
    async fn create_mission(
        &self,
        objective: &str,
        initiator_id: i64,
    ) -> Result<Mission, RepositoryError> {
        let objective = objective.to_string();
        self.with_connection("create_mission", move |connection| {
            let now = timestamp(Utc::now());
            connection.execute(
                "INSERT INTO missions (objective, status, initiator_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![objective, MissionStatus::Pending.as_str(), initiator_id, now],
            )?;
            let id = MissionId::new(connection.last_insert_rowid());
            require_mission(connection, id)
        })
        .await
    }

    async fn get_mission(&self, id: MissionId) -> Result<Mission, RepositoryError> {
        self.with_connection("get_mission", move |connection| {
            require_mission(connection, id)
        })
        .await
    }

    async fn get_mission_by_id(&self, id: MissionId) -> Result<MissionDetails, RepositoryError> {
        self.with_connection("get_mission_by_id", move |connection| {
            let mission = require_mission(connection, id)?;
            Ok(MissionDetails {
                mission,
                plans: select_plans(connection, id)?,
                tasks: select_tasks(connection, id)?,
                events: select_events(connection, id)?,
            })
        })
        .await
    }

    async fn list_missions(&self, limit: usize) -> Result<Vec<Mission>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_connection("list_missions", move |connection| {
            let mut statement = connection.prepare(&format!(
                "SELECT {} FROM missions ORDER BY id DESC LIMIT ?1",
                MissionRow::COLUMNS
            ))?;
            let rows = statement
                .query_map([limit], MissionRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(MissionRow::decode).collect()
        })
        .await
    }

    async fn update_mission_status(
        &self,
        id: MissionId,
        status: MissionStatus,
        result_summary: Option<String>,
    ) -> Result<StatusTransition, RepositoryError> {
        self.with_connection("update_mission_status", move |connection| {
            let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let from = require_mission(&transaction, id)?.status;
            check_mission_transition(from, status)?;
            transaction.execute(
                "UPDATE missions
                 SET status = ?2, result_summary = COALESCE(?3, result_summary), updated_at = ?4
                 WHERE id = ?1",
                params![id.get(), status.as_str(), result_summary, timestamp(Utc::now())],
            )?;
            let payload = serde_json::to_string(&status_changed_payload(from, status))?;
            let event = insert_event(&transaction, id, EventType::StatusChanged, &payload)?;
            let mission = require_mission(&transaction, id)?;
            transaction.commit()?;
            Ok(StatusTransition {
                from,
                mission,
                event,
            })
        })
        .await
    }

    async fn create_event(
        &self,
        mission_id: MissionId,
        event_type: EventType,
        payload: Value,
    ) -> Result<MissionEvent, RepositoryError> {
        let payload = serde_json::to_string(&payload)?;
        self.with_connection("create_event", move |connection| {
            require_mission(connection, mission_id)?;
            insert_event(connection, mission_id, event_type, &payload)
        })
        .await
    }

    async fn list_events(&self, mission_id: MissionId) -> Result<Vec<MissionEvent>, RepositoryError> {
        self.with_connection("list_events", move |connection| {
            select_events(connection, mission_id)
        })
        .await
    }

    async fn get_latest_plan_version(&self, mission_id: MissionId) -> Result<u32, RepositoryError> {
        self.with_connection("get_latest_plan_version", move |connection| {
            latest_version(connection, mission_id)
        })
        .await
    }

    async fn create_mission_plan(
        &self,
        plan: NewMissionPlan,
    ) -> Result<MissionPlan, RepositoryError> {
        let stats = serde_json::to_string(&plan.stats)?;
        let warnings = serde_json::to_string(&plan.warnings)?;
        let raw_plan = serde_json::to_string(&plan.raw_plan)?;
        let telemetry = serde_json::to_string(&plan.telemetry)?;
        let mission_id = plan.mission_id;
        let status = plan.status;
        let rationale = plan.rationale;

        self.with_connection("create_mission_plan", move |connection| {
            let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            require_mission(&transaction, mission_id)?;
            let version = latest_version(&transaction, mission_id)? + 1;
            transaction.execute(
                "INSERT INTO mission_plans (
                    mission_id, version, status, rationale, stats, warnings, raw_plan,
                    telemetry, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    mission_id.get(),
                    version,
                    status.as_str(),
                    rationale,
                    stats,
                    warnings,
                    raw_plan,
                    telemetry,
                    timestamp(Utc::now())
                ],
            )?;
            let id = PlanId::new(transaction.last_insert_rowid());
            let created = require_plan(&transaction, id)?;
            transaction.commit()?;
            Ok(created)
        })
        .await
    }

    async fn update_plan_status(
        &self,
        plan_id: PlanId,
        status: PlanStatus,
    ) -> Result<MissionPlan, RepositoryError> {
        self.with_connection("update_plan_status", move |connection| {
            let changed = connection.execute(
                "UPDATE mission_plans SET status = ?2 WHERE id = ?1",
                params![plan_id.get(), status.as_str()],
            )?;
            if changed == 0 {
                return Err(RepositoryError::plan_not_found(plan_id).into());
            }
            require_plan(connection, plan_id)
        })
        .await
    }

    async fn set_active_plan(
        &self,
        mission_id: MissionId,
        plan_id: PlanId,
    ) -> Result<(), RepositoryError> {
        self.with_connection("set_active_plan", move |connection| {
            let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mission = require_mission(&transaction, mission_id)?;
            let plan = require_plan(&transaction, plan_id)?;
            if plan.mission_id != mission_id {
                return Err(RepositoryError::Conflict(format!(
                    "plan {} does not belong to mission {}",
                    plan_id, mission_id
                ))
                .into());
            }

            if let Some(previous) = mission.active_plan_id.filter(|p| *p != plan_id) {
                transaction.execute(
                    "UPDATE mission_plans SET status = ?2 WHERE id = ?1",
                    params![previous.get(), PlanStatus::Superseded.as_str()],
                )?;
            }
            transaction.execute(
                "UPDATE missions SET active_plan_id = ?2, updated_at = ?3 WHERE id = ?1",
                params![mission_id.get(), plan_id.get(), timestamp(Utc::now())],
            )?;
            transaction.commit()?;
            Ok(())
        })
        .await
    }

    async fn create_task(&self, task: NewTask) -> Result<Task, RepositoryError> {
        let tool_args = serde_json::to_string(&task.tool_args)?;
        let dependencies = serde_json::to_string(&task.dependencies)?;

        self.with_connection("create_task", move |connection| {
            let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            require_mission(&transaction, task.mission_id)?;
            require_plan(&transaction, task.plan_id)?;
            let duplicate: Option<i64> = transaction
                .query_row(
                    "SELECT id FROM tasks WHERE mission_id = ?1 AND task_key = ?2",
                    params![task.mission_id.get(), task.task_key.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if duplicate.is_some() {
                return Err(RepositoryError::Conflict(format!(
                    "task key '{}' already exists in mission {}",
                    task.task_key, task.mission_id
                ))
                .into());
            }

            let now = timestamp(Utc::now());
            transaction.execute(
                "INSERT INTO tasks (
                    mission_id, plan_id, task_key, description, tool_name, tool_args,
                    dependencies, status, attempts, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)",
                params![
                    task.mission_id.get(),
                    task.plan_id.get(),
                    task.task_key.as_str(),
                    task.description,
                    task.tool_name,
                    tool_args,
                    dependencies,
                    TaskStatus::Pending.as_str(),
                    now
                ],
            )?;
            let id = TaskId::new(transaction.last_insert_rowid());
            let created = require_task(&transaction, id)?;
            transaction.commit()?;
            Ok(created)
        })
        .await
    }

    async fn update_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        result: Option<Value>,
    ) -> Result<Task, RepositoryError> {
        let result = result.map(|r| serde_json::to_string(&r)).transpose()?;

        self.with_connection("update_task_status", move |connection| {
            let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current = require_task(&transaction, task_id)?;
            let siblings = select_tasks(&transaction, current.mission_id)?;
            check_task_update(&current, status, &siblings)?;

            let started = i64::from(status == TaskStatus::Running);
            transaction.execute(
                "UPDATE tasks
                 SET status = ?2, attempts = attempts + ?3, result = COALESCE(?4, result),
                     updated_at = ?5
                 WHERE id = ?1",
                params![
                    task_id.get(),
                    status.as_str(),
                    started,
                    result,
                    timestamp(Utc::now())
                ],
            )?;
            let updated = require_task(&transaction, task_id)?;
            transaction.commit()?;
            Ok(updated)
        })
        .await
    }

    async fn get_tasks_for_mission(
        &self,
        mission_id: MissionId,
    ) -> Result<Vec<Task>, RepositoryError> {
        self.with_connection("get_tasks_for_mission", move |connection| {
            select_tasks(connection, mission_id)
        })
        .await
    }
}

// ==================== Rows ====================

struct MissionRow {
    id: i64,
    objective: String,
    status: String,
    initiator_id: i64,
    active_plan_id: Option<i64>,
    result_summary: Option<String>,
    created_at: String,
    updated_at: String,
}

impl MissionRow {
    const COLUMNS: &'static str =
        "id, objective, status, initiator_id, active_plan_id, result_summary, created_at, updated_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            objective: row.get(1)?,
            status: row.get(2)?,
            initiator_id: row.get(3)?,
            active_plan_id: row.get(4)?,
            result_summary: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn decode(self) -> StoreResult<Mission> {
        Ok(Mission {
            id: MissionId::new(self.id),
            objective: self.objective,
            status: self.status.parse()?,
            initiator_id: self.initiator_id,
            active_plan_id: self.active_plan_id.map(PlanId::new),
            result_summary: self.result_summary,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

struct PlanRow {
    id: i64,
    mission_id: i64,
    version: u32,
    status: String,
    rationale: String,
    stats: String,
    warnings: String,
    raw_plan: String,
    telemetry: String,
    created_at: String,
}

impl PlanRow {
    const COLUMNS: &'static str = "id, mission_id, version, status, rationale, stats, warnings, \
         raw_plan, telemetry, created_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            mission_id: row.get(1)?,
            version: row.get(2)?,
            status: row.get(3)?,
            rationale: row.get(4)?,
            stats: row.get(5)?,
            warnings: row.get(6)?,
            raw_plan: row.get(7)?,
            telemetry: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn decode(self) -> StoreResult<MissionPlan> {
        Ok(MissionPlan {
            id: PlanId::new(self.id),
            mission_id: MissionId::new(self.mission_id),
            version: self.version,
            status: self.status.parse()?,
            rationale: self.rationale,
            stats: serde_json::from_str(&self.stats)?,
            warnings: serde_json::from_str(&self.warnings)?,
            raw_plan: serde_json::from_str(&self.raw_plan)?,
            telemetry: serde_json::from_str(&self.telemetry)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct TaskRow {
    id: i64,
    mission_id: i64,
    plan_id: i64,
    task_key: String,
    description: String,
    tool_name: String,
    tool_args: String,
    dependencies: String,
    status: String,
    attempts: u32,
    result: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    const COLUMNS: &'static str = "id, mission_id, plan_id, task_key, description, tool_name, \
         tool_args, dependencies, status, attempts, result, created_at, updated_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            mission_id: row.get(1)?,
            plan_id: row.get(2)?,
            task_key: row.get(3)?,
            description: row.get(4)?,
            tool_name: row.get(5)?,
            tool_args: row.get(6)?,
            dependencies: row.get(7)?,
            status: row.get(8)?,
            attempts: row.get(9)?,
            result: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn decode(self) -> StoreResult<Task> {
        Ok(Task {
            id: TaskId::new(self.id),
            mission_id: MissionId::new(self.mission_id),
            plan_id: PlanId::new(self.plan_id),
            task_key: TaskKey::new(self.task_key),
            description: self.description,
            tool_name: self.tool_name,
            tool_args: serde_json::from_str(&self.tool_args)?,
            dependencies: serde_json::from_str(&self.dependencies)?,
            status: self.status.parse()?,
            attempts: self.attempts,
            result: self
                .result
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

struct EventRow {
    id: i64,
    mission_id: i64,
    event_type: String,
    payload: String,
    created_at: String,
}

impl EventRow {
    const COLUMNS: &'static str = "id, mission_id, event_type, payload, created_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            mission_id: row.get(1)?,
            event_type: row.get(2)?,
            payload: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn decode(self) -> StoreResult<MissionEvent> {
        Ok(MissionEvent {
            id: self.id.into(),
            mission_id: MissionId::new(self.mission_id),
            event_type: self.event_type.parse()?,
            payload: serde_json::from_str(&self.payload)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

// ==================== Queries ====================

fn open_connection(database_path: &Path) -> StoreResult<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let connection = Connection::open(database_path)?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    Ok(connection)
}

fn require_mission(connection: &Connection, id: MissionId) -> StoreResult<Mission> {
    connection
        .query_row(
            &format!("SELECT {} FROM missions WHERE id = ?1", MissionRow::COLUMNS),
            [id.get()],
            MissionRow::read,
        )
        .optional()?
        .ok_or_else(|| StoreError::from(RepositoryError::mission_not_found(id)))?
        .decode()
}

fn require_plan(connection: &Connection, id: PlanId) -> StoreResult<MissionPlan> {
    connection
        .query_row(
            &format!("SELECT {} FROM mission_plans WHERE id = ?1", PlanRow::COLUMNS),
            [id.get()],
            PlanRow::read,
        )
        .optional()?
        .ok_or_else(|| StoreError::from(RepositoryError::plan_not_found(id)))?
        .decode()
}

fn require_task(connection: &Connection, id: TaskId) -> StoreResult<Task> {
    connection
        .query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TaskRow::COLUMNS),
            [id.get()],
            TaskRow::read,
        )
        .optional()?
        .ok_or_else(|| StoreError::from(RepositoryError::task_not_found(id)))?
        .decode()
}

fn select_plans(connection: &Connection, mission_id: MissionId) -> StoreResult<Vec<MissionPlan>> {
    let mut statement = connection.prepare(&format!(
        "SELECT {} FROM mission_plans WHERE mission_id = ?1 ORDER BY version",
        PlanRow::COLUMNS
    ))?;
    let rows = statement
        .query_map([mission_id.get()], PlanRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(PlanRow::decode).collect()
}

fn select_tasks(connection: &Connection, mission_id: MissionId) -> StoreResult<Vec<Task>> {
    let mut statement = connection.prepare(&format!(
        "SELECT {} FROM tasks WHERE mission_id = ?1 ORDER BY id",
        TaskRow::COLUMNS
    ))?;
    let rows = statement
        .query_map([mission_id.get()], TaskRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(TaskRow::decode).collect()
}

/// Appends to the event log; `payload` is already JSON text.
fn insert_event(
    connection: &Connection,
    mission_id: MissionId,
    event_type: EventType,
    payload: &str,
) -> StoreResult<MissionEvent> {
    connection.execute(
        "INSERT INTO mission_events (mission_id, event_type, payload, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            mission_id.get(),
            event_type.as_str(),
            payload,
            timestamp(Utc::now())
        ],
    )?;
    let id = connection.last_insert_rowid();
    let row = connection.query_row(
        &format!("SELECT {} FROM mission_events WHERE id = ?1", EventRow::COLUMNS),
        [id],
        EventRow::read,
    )?;
    row.decode()
}

fn select_events(connection: &Connection, mission_id: MissionId) -> StoreResult<Vec<MissionEvent>> {
    let mut statement = connection.prepare(&format!(
        "SELECT {} FROM mission_events WHERE mission_id = ?1 ORDER BY id",
        EventRow::COLUMNS
    ))?;
    let rows = statement
        .query_map([mission_id.get()], EventRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(EventRow::decode).collect()
}

fn latest_version(connection: &Connection, mission_id: MissionId) -> StoreResult<u32> {
    Ok(connection.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM mission_plans WHERE mission_id = ?1",
        [mission_id.get()],
        |row| row.get(0),
    )?)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
