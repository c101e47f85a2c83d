//! The comment entity store. Comments only carry `content` as a mergeable
//! field; everything else is identity/attribution.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use sync_engine::record::CommentFields;
use sync_engine::VectorClock;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct CommentRow {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub edited: bool,
    pub version: i64,
    pub vector_clock: JsonValue,
    pub last_modified_user_id: Option<Uuid>,
    pub last_modified_device_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CommentRow {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn fields(&self) -> CommentFields {
        CommentFields {
            content: self.content.clone(),
        }
    }

    pub fn vector_clock(&self) -> VectorClock {
        serde_json::from_value(self.vector_clock.clone()).unwrap_or_default()
    }
}

pub async fn get_any_for_update(
    tx: &mut Transaction<'_, Postgres>,
    comment_id: Uuid,
) -> Result<Option<CommentRow>, sqlx::Error> {
    sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT id, task_id, author_id, parent_id, content, edited, version, vector_clock,
               last_modified_user_id, last_modified_device_id, created_at, updated_at, deleted_at
        FROM comments
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(comment_id)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    task_id: Uuid,
    author_id: Uuid,
    parent_id: Option<Uuid>,
    fields: &CommentFields,
    vector_clock: &VectorClock,
    device_id: Uuid,
) -> Result<CommentRow, sqlx::Error> {
    let clock_json = serde_json::to_value(vector_clock).unwrap_or_default();

    sqlx::query_as::<_, CommentRow>(
        r#"
        INSERT INTO comments (
            id, task_id, author_id, parent_id, content, version, vector_clock,
            last_modified_user_id, last_modified_device_id
        )
        VALUES ($1, $2, $3, $4, $5, 1, $6, $3, $7)
        RETURNING id, task_id, author_id, parent_id, content, edited, version, vector_clock,
                  last_modified_user_id, last_modified_device_id, created_at, updated_at, deleted_at
        "#,
    )
    .bind(id)
    .bind(task_id)
    .bind(author_id)
    .bind(parent_id)
    .bind(&fields.content)
    .bind(clock_json)
    .bind(device_id)
    .fetch_one(&mut **tx)
    .await
}

pub async fn overwrite(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    fields: &CommentFields,
    vector_clock: &VectorClock,
    version: i64,
    user_id: Uuid,
    device_id: Uuid,
) -> Result<CommentRow, sqlx::Error> {
    let clock_json = serde_json::to_value(vector_clock).unwrap_or_default();

    sqlx::query_as::<_, CommentRow>(
        r#"
        UPDATE comments SET
            content = $2, edited = true, version = $3, vector_clock = $4,
            last_modified_user_id = $5, last_modified_device_id = $6,
            updated_at = now(), deleted_at = NULL
        WHERE id = $1
        RETURNING id, task_id, author_id, parent_id, content, edited, version, vector_clock,
                  last_modified_user_id, last_modified_device_id, created_at, updated_at, deleted_at
        "#,
    )
    .bind(id)
    .bind(&fields.content)
    .bind(version)
    .bind(clock_json)
    .bind(user_id)
    .bind(device_id)
    .fetch_one(&mut **tx)
    .await
}

pub async fn touch_attribution(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    user_id: Uuid,
    device_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE comments
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

pub async fn soft_delete(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE comments SET deleted_at = now(), updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Comments on tasks belonging to `organization_id`, updated after `since`,
/// excluding the caller's own device.
pub async fn list_since(
    pool: &PgPool,
    organization_id: Uuid,
    since: DateTime<Utc>,
    caller_device_id: Uuid,
    limit: i64,
) -> Result<Vec<CommentRow>, sqlx::Error> {
    sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT c.id, c.task_id, c.author_id, c.parent_id, c.content, c.edited, c.version,
               c.vector_clock, c.last_modified_user_id, c.last_modified_device_id,
               c.created_at, c.updated_at, c.deleted_at
        FROM comments c
        JOIN tasks t ON t.id = c.task_id
        WHERE t.organization_id = $1
          AND c.updated_at > $2
          AND (c.last_modified_device_id IS NULL OR c.last_modified_device_id <> $3)
        ORDER BY c.updated_at ASC
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

pub async fn live_vector_clocks(
    pool: &PgPool,
    organization_id: Uuid,
) -> Result<Vec<JsonValue>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT c.vector_clock FROM comments c
        JOIN tasks t ON t.id = c.task_id
        WHERE t.organization_id = $1 AND c.deleted_at IS NULL
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
