//! The task entity store: typed CRUD over `tasks`, organization-scoped,
//! soft-deletable, checksum- and vector-clock-bearing.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use sync_engine::record::{TaskFields, TaskPriority, TaskStatus};
use sync_engine::VectorClock;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<String>,
    pub position: String,
    pub tags: Vec<String>,
    pub custom_fields: JsonValue,
    pub version: i64,
    pub vector_clock: JsonValue,
    pub checksum: String,
    pub last_modified_user_id: Option<Uuid>,
    pub last_modified_device_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn fields(&self) -> TaskFields {
        TaskFields {
            title: self.title.clone(),
            description: self.description.clone(),
            status: parse_status(&self.status),
            priority: parse_priority(&self.priority),
            due_date: self.due_date.map(|d| d.timestamp_millis()),
            assigned_to: self.assigned_to.clone(),
            tags: self.tags.clone(),
            custom_fields: json_as_map(&self.custom_fields),
            position: self.position.clone(),
        }
    }

    pub fn vector_clock(&self) -> VectorClock {
        serde_json::from_value(self.vector_clock.clone()).unwrap_or_default()
    }
}

fn parse_status(raw: &str) -> TaskStatus {
    match raw {
        "in_progress" => TaskStatus::InProgress,
        "blocked" => TaskStatus::Blocked,
        "done" => TaskStatus::Done,
        "cancelled" => TaskStatus::Cancelled,
        _ => TaskStatus::Todo,
    }
}

fn parse_priority(raw: &str) -> TaskPriority {
    match raw {
        "low" => TaskPriority::Low,
        "high" => TaskPriority::High,
        "urgent" => TaskPriority::Urgent,
        _ => TaskPriority::Medium,
    }
}

pub fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "todo",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Blocked => "blocked",
        TaskStatus::Done => "done",
        TaskStatus::Cancelled => "cancelled",
    }
}

pub fn priority_str(priority: TaskPriority) -> &'static str {
    match priority {
        TaskPriority::Low => "low",
        TaskPriority::Medium => "medium",
        TaskPriority::High => "high",
        TaskPriority::Urgent => "urgent",
    }
}

fn json_as_map(value: &JsonValue) -> serde_json::Map<String, JsonValue> {
    value.as_object().cloned().unwrap_or_default()
}

/// Load a task by id, including soft-deleted rows, locking it for the
/// duration of `tx` (the entity store's `any(...)` path, used for conflict
/// detection and orphan checks).
pub async fn get_any_for_update(
    tx: &mut Transaction<'_, Postgres>,
    organization_id: Uuid,
    task_id: Uuid,
) -> Result<Option<TaskRow>, sqlx::Error> {
    sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, organization_id, project_id, title, description, status, priority,
               due_date, assigned_to, position, tags, custom_fields, version, vector_clock, checksum,
               last_modified_user_id, last_modified_device_id, created_at, updated_at, deleted_at
        FROM tasks
        WHERE id = $1 AND organization_id = $2
        FOR UPDATE
        "#,
    )
    .bind(task_id)
    .bind(organization_id)
    .fetch_optional(&mut **tx)
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    organization_id: Uuid,
    fields: &TaskFields,
    vector_clock: &VectorClock,
    checksum: &str,
    user_id: Uuid,
    device_id: Uuid,
) -> Result<TaskRow, sqlx::Error> {
    let clock_json = serde_json::to_value(vector_clock).unwrap_or_default();
    let due_date = fields
        .due_date
        .and_then(DateTime::<Utc>::from_timestamp_millis);

    sqlx::query_as::<_, TaskRow>(
        r#"
        INSERT INTO tasks (
            id, organization_id, title, description, status, priority, due_date,
            assigned_to, position, tags, custom_fields, version, vector_clock, checksum,
            last_modified_user_id, last_modified_device_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 1, $12, $13, $14, $15)
        RETURNING id, organization_id, project_id, title, description, status, priority,
                  due_date, assigned_to, position, tags, custom_fields, version, vector_clock, checksum,
                  last_modified_user_id, last_modified_device_id, created_at, updated_at, deleted_at
        "#,
    )
    .bind(id)
    .bind(organization_id)
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(status_str(fields.status))
    .bind(priority_str(fields.priority))
    .bind(due_date)
    .bind(&fields.assigned_to)
    .bind(&fields.position)
    .bind(&fields.tags)
    .bind(JsonValue::Object(fields.custom_fields.clone()))
    .bind(clock_json)
    .bind(checksum)
    .bind(user_id)
    .bind(device_id)
    .fetch_one(&mut **tx)
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn overwrite(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    fields: &TaskFields,
    vector_clock: &VectorClock,
    checksum: &str,
    version: i64,
    user_id: Uuid,
    device_id: Uuid,
) -> Result<TaskRow, sqlx::Error> {
    let clock_json = serde_json::to_value(vector_clock).unwrap_or_default();
    let due_date = fields
        .due_date
        .and_then(DateTime::<Utc>::from_timestamp_millis);

    sqlx::query_as::<_, TaskRow>(
        r#"
        UPDATE tasks SET
            title = $2, description = $3, status = $4, priority = $5, due_date = $6,
            assigned_to = $7, position = $8, tags = $9, custom_fields = $10, version = $11,
            vector_clock = $12, checksum = $13, last_modified_user_id = $14,
            last_modified_device_id = $15, updated_at = now(), deleted_at = NULL
        WHERE id = $1
        RETURNING id, organization_id, project_id, title, description, status, priority,
                  due_date, assigned_to, position, tags, custom_fields, version, vector_clock, checksum,
                  last_modified_user_id, last_modified_device_id, created_at, updated_at, deleted_at
        "#,
    )
    .bind(id)
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(status_str(fields.status))
    .bind(priority_str(fields.priority))
    .bind(due_date)
    .bind(&fields.assigned_to)
    .bind(&fields.position)
    .bind(&fields.tags)
    .bind(JsonValue::Object(fields.custom_fields.clone()))
    .bind(version)
    .bind(clock_json)
    .bind(checksum)
    .bind(user_id)
    .bind(device_id)
    .fetch_one(&mut **tx)
    .await
}

/// Refresh attribution only, leaving content, version, and clock untouched
/// (the `EQUAL`-relation no-op path).
pub async fn touch_attribution(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    user_id: Uuid,
    device_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE tasks
        SET last_modified_user_id = $2, last_modified_device_id = $3, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(device_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn soft_delete(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE tasks SET deleted_at = now(), updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Tasks updated after `since`, excluding the caller's own device, for the
/// pull response. Includes soft-deleted rows per the documented pull
/// contract.
pub async fn list_since(
    pool: &PgPool,
    organization_id: Uuid,
    since: DateTime<Utc>,
    caller_device_id: Uuid,
    limit: i64,
) -> Result<Vec<TaskRow>, sqlx::Error> {
    sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, organization_id, project_id, title, description, status, priority,
               due_date, assigned_to, position, tags, custom_fields, version, vector_clock, checksum,
               last_modified_user_id, last_modified_device_id, created_at, updated_at, deleted_at
        FROM tasks
        WHERE organization_id = $1
          AND updated_at > $2
          AND (last_modified_device_id IS NULL OR last_modified_device_id <> $3)
        ORDER BY updated_at ASC
        LIMIT $4
        "#,
    )
    .bind(organization_id)
    .bind(since)
    .bind(caller_device_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Every live (non-deleted) task vector clock in the organization, for the
/// organization vector clock aggregation.
pub async fn live_vector_clocks(
    pool: &PgPool,
    organization_id: Uuid,
) -> Result<Vec<JsonValue>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT vector_clock FROM tasks
        WHERE organization_id = $1 AND deleted_at IS NULL
        "#,
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| row.get::<JsonValue, _>("vector_clock"))
        .collect())
}
