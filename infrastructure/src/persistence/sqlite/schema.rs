//! SQLite schema. Every statement is idempotent; it runs on each open.

pub(super) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS missions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    objective TEXT NOT NULL,
    status TEXT NOT NULL,
    initiator_id INTEGER NOT NULL,
    active_plan_id INTEGER,
    result_summary TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS mission_plans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mission_id INTEGER NOT NULL REFERENCES missions (id),
    version INTEGER NOT NULL,
    status TEXT NOT NULL,
    rationale TEXT NOT NULL,
    stats TEXT NOT NULL,
    warnings TEXT NOT NULL,
    raw_plan TEXT NOT NULL,
    telemetry TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (mission_id, version)
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mission_id INTEGER NOT NULL REFERENCES missions (id),
    plan_id INTEGER NOT NULL REFERENCES mission_plans (id),
    task_key TEXT NOT NULL,
    description TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    tool_args TEXT NOT NULL,
    dependencies TEXT NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    result TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (mission_id, task_key)
);

CREATE TABLE IF NOT EXISTS mission_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mission_id INTEGER NOT NULL REFERENCES missions (id),
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_mission ON tasks (mission_id, id);
CREATE INDEX IF NOT EXISTS idx_events_mission ON mission_events (mission_id, id);
"#;
