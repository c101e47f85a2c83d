//! Pull handler: ships every org-visible change the caller's device hasn't
//! seen yet, paginated by a simple limit/has-more cursor on `updated_at`.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sync_engine::VectorClock;
use uuid::Uuid;

use crate::auth::{AuthUser, DeviceHeader};
use crate::db;
use crate::db::comments::CommentRow;
use crate::db::tasks::TaskRow;
use crate::db::tombstones::TombstoneRow;
use crate::error::{AppError, Result};
use crate::throttle::{Principal, Scope};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct PullParams {
    /// Milliseconds since the epoch; absent or unparseable means "since the epoch".
    pub since: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub id: Uuid,
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
    pub vector_clock: VectorClock,
    pub checksum: String,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

impl From<TaskRow> for TaskPayload {
    fn from(row: TaskRow) -> Self {
        let deleted = row.is_deleted();
        let vector_clock = row.vector_clock();
        TaskPayload {
            id: row.id,
            project_id: row.project_id,
            title: row.title,
            description: row.description,
            status: row.status,
            priority: row.priority,
            due_date: row.due_date,
            assigned_to: row.assigned_to,
            position: row.position,
            tags: row.tags,
            custom_fields: row.custom_fields,
            version: row.version,
            vector_clock,
            checksum: row.checksum,
            updated_at: row.updated_at,
            deleted,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPayload {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub edited: bool,
    pub version: i64,
    pub vector_clock: VectorClock,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

impl From<CommentRow> for CommentPayload {
    fn from(row: CommentRow) -> Self {
        let deleted = row.is_deleted();
        let vector_clock = row.vector_clock();
        CommentPayload {
            id: row.id,
            task_id: row.task_id,
            author_id: row.author_id,
            parent_id: row.parent_id,
            content: row.content,
            edited: row.edited,
            version: row.version,
            vector_clock,
            updated_at: row.updated_at,
            deleted,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TombstonePayload {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub deleted_by_user_id: Option<Uuid>,
    pub vector_clock: VectorClock,
    pub created_at: DateTime<Utc>,
}

impl From<TombstoneRow> for TombstonePayload {
    fn from(row: TombstoneRow) -> Self {
        let vector_clock: VectorClock = serde_json::from_value(row.vector_clock).unwrap_or_default();
        TombstonePayload {
            id: row.id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            deleted_by_user_id: row.deleted_by_user_id,
            vector_clock,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullChanges {
    pub tasks: Vec<TaskPayload>,
    pub comments: Vec<CommentPayload>,
    pub tombstones: Vec<TombstonePayload>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub changes: PullChanges,
    pub server_vector_clock: VectorClock,
    pub has_more: bool,
    pub timestamp: i64,
}

/// `GET /api/sync/pull/`
pub async fn pull_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    DeviceHeader(device_id): DeviceHeader,
    Query(params): Query<PullParams>,
) -> Result<Json<PullResponse>> {
    state.rate_limiter.check(
        Scope::SyncPull,
        Principal::User(auth.user_id),
        state.config.rate_limit_sync_pull,
    )?;

    db::devices::get_owned_device(&state.pool, device_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::InvalidDevice(device_id.to_string()))?;

    let since = params
        .since
        .as_deref()
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or(Utc::now()));

    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT);
    // Fetch one extra row per entity kind to detect truncation without a
    // separate COUNT query.
    let fetch_limit = limit + 1;

    let outcome = tokio::time::timeout(
        state.config.request_timeout,
        run_pull(&state, &auth, device_id, since, fetch_limit, limit),
    )
    .await
    .map_err(|_| AppError::Internal("pull request timed out".into()))??;

    db::devices::touch_last_sync(&state.pool, device_id).await?;

    Ok(Json(outcome))
}

async fn run_pull(
    state: &AppState,
    auth: &AuthUser,
    device_id: Uuid,
    since: DateTime<Utc>,
    fetch_limit: i64,
    limit: i64,
) -> Result<PullResponse> {
    let mut tasks = db::tasks::list_since(&state.pool, auth.organization_id, since, device_id, fetch_limit)
        .await?;
    let mut comments =
        db::comments::list_since(&state.pool, auth.organization_id, since, device_id, fetch_limit).await?;
    let mut tombstones =
        db::tombstones::list_since(&state.pool, auth.organization_id, since, device_id, fetch_limit).await?;

    let has_more = tasks.len() as i64 > limit
        || comments.len() as i64 > limit
        || tombstones.len() as i64 > limit;

    tasks.truncate(limit as usize);
    comments.truncate(limit as usize);
    tombstones.truncate(limit as usize);

    let server_vector_clock = db::organizations::vector_clock(&state.pool, auth.organization_id).await?;

    Ok(PullResponse {
        changes: PullChanges {
            tasks: tasks.into_iter().map(TaskPayload::from).collect(),
            comments: comments.into_iter().map(CommentPayload::from).collect(),
            tombstones: tombstones.into_iter().map(TombstonePayload::from).collect(),
        },
        server_vector_clock,
        has_more,
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}
