//! Push handler: the transactional heart of the sync protocol.
//!
//! One request, one transaction, one `SyncLog` row. Every change is applied
//! in the order the client sent it; a single change that errors is logged
//! and skipped, not allowed to abort its siblings. The log row is opened
//! against the pool before the transaction starts, so a transaction abort
//! (including a timeout) still leaves a `failed` audit row behind.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use sqlx::{PgPool, Postgres, Transaction};
use sync_engine::record::{CommentFields, EntityType, TaskFields, TaskPriority, TaskStatus};
use sync_engine::{
    auto_resolve_comment, auto_resolve_task, checksum::task_checksum, detect_conflict,
    CommentMergeOutcome, ConflictOutcome, TaskMergeOutcome, VectorClock,
};
use uuid::Uuid;

use crate::auth::{AuthUser, DeviceHeader};
use crate::db;
use crate::db::comments::CommentRow;
use crate::db::tasks::TaskRow;
use crate::error::{AppError, Result};
use crate::throttle::{Principal, Scope};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskChangeData {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<i64>,
    pub assigned_to: Option<String>,
    pub tags: Option<Vec<String>>,
    pub custom_fields: Option<JsonMap<String, JsonValue>>,
    pub position: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentChangeData {
    pub task_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskChange {
    pub id: Uuid,
    pub operation: ChangeOperation,
    pub vector_clock: VectorClock,
    #[serde(default)]
    pub data: TaskChangeData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentChange {
    pub id: Uuid,
    pub operation: ChangeOperation,
    pub vector_clock: VectorClock,
    #[serde(default)]
    pub data: CommentChangeData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushChanges {
    #[serde(default)]
    pub tasks: Vec<TaskChange>,
    #[serde(default)]
    pub comments: Vec<CommentChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub device_id: Uuid,
    pub vector_clock: VectorClock,
    #[allow(dead_code)]
    pub timestamp: i64,
    pub changes: PushChanges,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictSummary {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub conflict_reason: String,
    pub server_version: JsonValue,
    pub server_vector_clock: VectorClock,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub success: bool,
    pub processed: u32,
    pub conflicts: Vec<ConflictSummary>,
    pub server_vector_clock: VectorClock,
    pub timestamp: i64,
}

/// `POST /api/sync/push/`
pub async fn push_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    DeviceHeader(device_id): DeviceHeader,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>> {
    state.rate_limiter.check(
        Scope::SyncPush,
        Principal::User(auth.user_id),
        state.config.rate_limit_sync_push,
    )?;

    if device_id != request.device_id {
        return Err(AppError::InvalidDevice(
            "X-Device-Id header does not match request body deviceId".into(),
        ));
    }

    let device = db::devices::get_owned_device(&state.pool, device_id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::InvalidDevice(device_id.to_string()))?;

    let log_id = Uuid::new_v4();
    db::sync_logs::open(&state.pool, log_id, device_id, auth.user_id, "push").await?;

    let started = std::time::Instant::now();
    let result = tokio::time::timeout(
        state.config.request_timeout,
        run_push(
            &state.pool,
            &auth,
            device_id,
            &device,
            request,
            state.config.tombstone_retention_days,
            log_id,
        ),
    )
    .await;

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            db::sync_logs::close_failed(&state.pool, log_id, &err.to_string()).await?;
            return Err(err);
        }
        Err(_) => {
            db::sync_logs::close_failed(&state.pool, log_id, "push request timed out").await?;
            return Err(AppError::Internal("push request timed out".into()));
        }
    };

    let duration_ms = started.elapsed().as_millis() as i32;
    tracing::debug!(
        device_id = %device_id,
        processed = outcome.processed,
        conflicts = outcome.conflicts.len(),
        duration_ms,
        "push completed"
    );

    Ok(Json(outcome))
}

#[allow(clippy::too_many_arguments)]
async fn run_push(
    pool: &PgPool,
    auth: &AuthUser,
    device_id: Uuid,
    device: &db::devices::DeviceRow,
    request: PushRequest,
    retention_days: i64,
    log_id: Uuid,
) -> Result<PushResponse> {
    let mut tx = pool.begin().await?;

    let mut processed = 0u32;
    let mut conflicts = Vec::new();
    let mut conflicts_resolved = 0u32;
    let mut priority_counts: BTreeMap<u8, u32> = BTreeMap::new();

    for change in &request.changes.tasks {
        match apply_task_change(&mut tx, auth, device_id, change, retention_days).await {
            Ok(TaskApplyOutcome::Processed(priority)) => {
                processed += 1;
                *priority_counts.entry(priority).or_insert(0) += 1;
            }
            Ok(TaskApplyOutcome::AutoResolved(priority)) => {
                processed += 1;
                conflicts_resolved += 1;
                *priority_counts.entry(priority).or_insert(0) += 1;
            }
            Ok(TaskApplyOutcome::Surfaced(summary)) => conflicts.push(summary),
            Ok(TaskApplyOutcome::Dropped) => {}
            Err(err) => {
                tracing::warn!(task_id = %change.id, error = %err, "skipping task change");
            }
        }
    }

    for change in &request.changes.comments {
        match apply_comment_change(&mut tx, auth, device_id, change, retention_days).await {
            Ok(CommentApplyOutcome::Processed) => processed += 1,
            Ok(CommentApplyOutcome::AutoResolved) => {
                processed += 1;
                conflicts_resolved += 1;
            }
            Ok(CommentApplyOutcome::Surfaced(summary)) => conflicts.push(summary),
            Ok(CommentApplyOutcome::Dropped) | Ok(CommentApplyOutcome::Orphaned) => {
                processed += 1;
            }
            Err(err) => {
                tracing::warn!(comment_id = %change.id, error = %err, "skipping comment change");
            }
        }
    }

    let merged_device_clock = device_clock_from_row(device).merge(&request.vector_clock);
    let merged_device_clock_json = serde_json::to_value(&merged_device_clock).unwrap_or_default();
    db::devices::merge_clock_and_touch(&mut tx, device_id, &merged_device_clock_json).await?;

    let metadata = json!({ "syncPriorityCounts": priority_counts });
    let conflicts_detected = (conflicts.len() as u32) + conflicts_resolved;
    db::sync_logs::close_success(
        &mut tx,
        log_id,
        processed as i32,
        0,
        conflicts_detected as i32,
        conflicts_resolved as i32,
        0,
        metadata,
    )
    .await?;

    tx.commit().await?;

    let server_vector_clock = db::organizations::vector_clock(pool, auth.organization_id).await?;

    Ok(PushResponse {
        success: true,
        processed,
        conflicts,
        server_vector_clock,
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}

fn device_clock_from_row(row: &db::devices::DeviceRow) -> VectorClock {
    serde_json::from_value(row.device_clock.clone()).unwrap_or_default()
}

enum TaskApplyOutcome {
    Processed(u8),
    AutoResolved(u8),
    Surfaced(ConflictSummary),
    Dropped,
}

async fn apply_task_change(
    tx: &mut Transaction<'_, Postgres>,
    auth: &AuthUser,
    device_id: Uuid,
    change: &TaskChange,
    retention_days: i64,
) -> Result<TaskApplyOutcome> {
    let existing = db::tasks::get_any_for_update(tx, auth.organization_id, change.id).await?;

    match change.operation {
        ChangeOperation::Create => match existing {
            None => {
                let fields = build_task_fields(None, &change.data)?;
                let checksum = task_checksum(&fields);
                let priority = sync_priority(&ChangeOperation::Create, None, &fields);
                db::tasks::insert(
                    tx,
                    change.id,
                    auth.organization_id,
                    &fields,
                    &change.vector_clock,
                    &checksum,
                    auth.user_id,
                    device_id,
                )
                .await?;
                append_history(tx, change.id, auth, device_id, "created", &fields, None, &change.vector_clock).await?;
                Ok(TaskApplyOutcome::Processed(priority))
            }
            Some(row) => apply_task_update(tx, auth, device_id, change, row).await,
        },
        ChangeOperation::Update => match existing {
            None => {
                let fields = build_task_fields(None, &change.data)?;
                let checksum = task_checksum(&fields);
                let priority = sync_priority(&ChangeOperation::Create, None, &fields);
                db::tasks::insert(
                    tx,
                    change.id,
                    auth.organization_id,
                    &fields,
                    &change.vector_clock,
                    &checksum,
                    auth.user_id,
                    device_id,
                )
                .await?;
                append_history(tx, change.id, auth, device_id, "created", &fields, None, &change.vector_clock).await?;
                Ok(TaskApplyOutcome::Processed(priority))
            }
            Some(row) => apply_task_update(tx, auth, device_id, change, row).await,
        },
        ChangeOperation::Delete => {
            if let Some(row) = existing {
                if !row.is_deleted() {
                    db::tasks::soft_delete(tx, change.id).await?;
                    append_history(
                        tx,
                        change.id,
                        auth,
                        device_id,
                        "deleted",
                        &row.fields(),
                        Some(&row.fields()),
                        &change.vector_clock,
                    )
                    .await?;
                    db::tombstones::insert(
                        tx,
                        Uuid::new_v4(),
                        auth.organization_id,
                        db::entity_type_str(EntityType::Task),
                        change.id,
                        auth.user_id,
                        device_id,
                        &change.vector_clock,
                        row_snapshot(&row),
                        retention_days,
                    )
                    .await?;
                }
            }
            Ok(TaskApplyOutcome::Processed(1))
        }
    }
}

async fn apply_task_update(
    tx: &mut Transaction<'_, Postgres>,
    auth: &AuthUser,
    device_id: Uuid,
    change: &TaskChange,
    existing: TaskRow,
) -> Result<TaskApplyOutcome> {
    let server_clock = existing.vector_clock();
    match detect_conflict(&change.vector_clock, &server_clock) {
        ConflictOutcome::Reject => Ok(TaskApplyOutcome::Dropped),
        ConflictOutcome::NoOp => {
            db::tasks::touch_attribution(tx, change.id, auth.user_id, device_id).await?;
            Ok(TaskApplyOutcome::Processed(1))
        }
        ConflictOutcome::Accept => {
            let fields = build_task_fields(Some(&existing.fields()), &change.data)?;
            let checksum = task_checksum(&fields);
            let priority = sync_priority(&ChangeOperation::Update, Some(&existing.fields()), &fields);
            db::tasks::overwrite(
                tx,
                change.id,
                &fields,
                &change.vector_clock,
                &checksum,
                existing.version + 1,
                auth.user_id,
                device_id,
            )
            .await?;
            append_history(
                tx,
                change.id,
                auth,
                device_id,
                "updated",
                &fields,
                Some(&existing.fields()),
                &change.vector_clock,
            )
            .await?;
            Ok(TaskApplyOutcome::Processed(priority))
        }
        ConflictOutcome::Concurrent => {
            let incoming_fields = build_task_fields(Some(&existing.fields()), &change.data)?;
            match auto_resolve_task(&incoming_fields, &existing.fields()) {
                TaskMergeOutcome::AutoResolved(merged) => {
                    let merged_clock = change.vector_clock.merge(&server_clock);
                    let checksum = task_checksum(&merged);
                    db::tasks::overwrite(
                        tx,
                        change.id,
                        &merged,
                        &merged_clock,
                        &checksum,
                        existing.version + 1,
                        auth.user_id,
                        device_id,
                    )
                    .await?;
                    append_history(
                        tx,
                        change.id,
                        auth,
                        device_id,
                        "updated",
                        &merged,
                        Some(&existing.fields()),
                        &merged_clock,
                    )
                    .await?;
                    persist_conflict_row(
                        tx,
                        auth,
                        device_id,
                        EntityType::Task,
                        change.id,
                        &incoming_fields_json(&incoming_fields),
                        &incoming_fields_json(&existing.fields()),
                        &change.vector_clock,
                        &server_clock,
                        "Concurrent modification detected, auto-resolved.",
                        true,
                    )
                    .await?;
                    Ok(TaskApplyOutcome::AutoResolved(1))
                }
                TaskMergeOutcome::Unresolvable(fields) => {
                    let reason = format!(
                        "Concurrent modification detected. Unresolvable fields: {}",
                        fields.join(", ")
                    );
                    persist_conflict_row(
                        tx,
                        auth,
                        device_id,
                        EntityType::Task,
                        change.id,
                        &incoming_fields_json(&incoming_fields),
                        &incoming_fields_json(&existing.fields()),
                        &change.vector_clock,
                        &server_clock,
                        &reason,
                        false,
                    )
                    .await?;
                    Ok(TaskApplyOutcome::Surfaced(ConflictSummary {
                        entity_type: db::entity_type_str(EntityType::Task).to_string(),
                        entity_id: change.id,
                        conflict_reason: reason,
                        server_version: incoming_fields_json(&existing.fields()),
                        server_vector_clock: server_clock,
                    }))
                }
            }
        }
    }
}

enum CommentApplyOutcome {
    Processed,
    AutoResolved,
    Surfaced(ConflictSummary),
    Dropped,
    Orphaned,
}

async fn apply_comment_change(
    tx: &mut Transaction<'_, Postgres>,
    auth: &AuthUser,
    device_id: Uuid,
    change: &CommentChange,
    retention_days: i64,
) -> Result<CommentApplyOutcome> {
    let existing = db::comments::get_any_for_update(tx, change.id).await?;

    match change.operation {
        ChangeOperation::Create | ChangeOperation::Update => match existing {
            None => {
                let task_id = change
                    .data
                    .task_id
                    .ok_or_else(|| AppError::BadRequest("comment change missing taskId".into()))?;
                let task = db::tasks::get_any_for_update(tx, auth.organization_id, task_id).await?;
                let Some(task) = task else {
                    return Ok(CommentApplyOutcome::Orphaned);
                };
                if task.is_deleted() {
                    return Ok(CommentApplyOutcome::Orphaned);
                }

                let content = change
                    .data
                    .content
                    .clone()
                    .ok_or_else(|| AppError::BadRequest("comment change missing content".into()))?;
                let fields = CommentFields { content };
                db::comments::insert(
                    tx,
                    change.id,
                    task_id,
                    auth.user_id,
                    change.data.parent_id,
                    &fields,
                    &change.vector_clock,
                    device_id,
                )
                .await?;
                Ok(CommentApplyOutcome::Processed)
            }
            Some(row) => apply_comment_update(tx, auth, device_id, change, row).await,
        },
        ChangeOperation::Delete => {
            if let Some(row) = existing {
                if !row.is_deleted() {
                    db::comments::soft_delete(tx, change.id).await?;
                    db::tombstones::insert(
                        tx,
                        Uuid::new_v4(),
                        auth.organization_id,
                        db::entity_type_str(EntityType::Comment),
                        change.id,
                        auth.user_id,
                        device_id,
                        &change.vector_clock,
                        json!({ "content": row.content }),
                        retention_days,
                    )
                    .await?;
                }
            }
            Ok(CommentApplyOutcome::Dropped)
        }
    }
}

async fn apply_comment_update(
    tx: &mut Transaction<'_, Postgres>,
    auth: &AuthUser,
    device_id: Uuid,
    change: &CommentChange,
    existing: CommentRow,
) -> Result<CommentApplyOutcome> {
    let server_clock = existing.vector_clock();
    match detect_conflict(&change.vector_clock, &server_clock) {
        ConflictOutcome::Reject => Ok(CommentApplyOutcome::Dropped),
        ConflictOutcome::NoOp => {
            db::comments::touch_attribution(tx, change.id, auth.user_id, device_id).await?;
            Ok(CommentApplyOutcome::Processed)
        }
        ConflictOutcome::Accept => {
            let content = change
                .data
                .content
                .clone()
                .unwrap_or_else(|| existing.content.clone());
            let fields = CommentFields { content };
            db::comments::overwrite(
                tx,
                change.id,
                &fields,
                &change.vector_clock,
                existing.version + 1,
                auth.user_id,
                device_id,
            )
            .await?;
            Ok(CommentApplyOutcome::Processed)
        }
        ConflictOutcome::Concurrent => {
            let incoming = CommentFields {
                content: change
                    .data
                    .content
                    .clone()
                    .unwrap_or_else(|| existing.content.clone()),
            };
            match auto_resolve_comment(&incoming, &existing.fields()) {
                CommentMergeOutcome::AutoResolved(merged) => {
                    let merged_clock = change.vector_clock.merge(&server_clock);
                    db::comments::overwrite(
                        tx,
                        change.id,
                        &merged,
                        &merged_clock,
                        existing.version + 1,
                        auth.user_id,
                        device_id,
                    )
                    .await?;
                    persist_conflict_row(
                        tx,
                        auth,
                        device_id,
                        EntityType::Comment,
                        change.id,
                        &json!({ "content": incoming.content }),
                        &json!({ "content": existing.content }),
                        &change.vector_clock,
                        &server_clock,
                        "Concurrent modification detected, auto-resolved.",
                        true,
                    )
                    .await?;
                    Ok(CommentApplyOutcome::AutoResolved)
                }
                CommentMergeOutcome::Unresolvable(_) => {
                    let reason =
                        "Concurrent modification detected. Unresolvable fields: content".to_string();
                    persist_conflict_row(
                        tx,
                        auth,
                        device_id,
                        EntityType::Comment,
                        change.id,
                        &json!({ "content": incoming.content }),
                        &json!({ "content": existing.content }),
                        &change.vector_clock,
                        &server_clock,
                        &reason,
                        false,
                    )
                    .await?;
                    Ok(CommentApplyOutcome::Surfaced(ConflictSummary {
                        entity_type: db::entity_type_str(EntityType::Comment).to_string(),
                        entity_id: change.id,
                        conflict_reason: reason,
                        server_version: json!({ "content": existing.content }),
                        server_vector_clock: server_clock,
                    }))
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn persist_conflict_row(
    tx: &mut Transaction<'_, Postgres>,
    auth: &AuthUser,
    device_id: Uuid,
    entity_type: EntityType,
    entity_id: Uuid,
    local_version: &JsonValue,
    server_version: &JsonValue,
    local_clock: &VectorClock,
    server_clock: &VectorClock,
    reason: &str,
    auto_resolved: bool,
) -> Result<()> {
    db::conflicts::insert(
        tx,
        Uuid::new_v4(),
        auth.organization_id,
        db::entity_type_str(entity_type),
        entity_id,
        auth.user_id,
        device_id,
        local_version,
        server_version,
        &serde_json::to_value(local_clock).unwrap_or_default(),
        &serde_json::to_value(server_clock).unwrap_or_default(),
        reason,
        auto_resolved,
    )
    .await?;
    Ok(())
}

async fn append_history(
    tx: &mut Transaction<'_, Postgres>,
    task_id: Uuid,
    auth: &AuthUser,
    device_id: Uuid,
    change_type: &str,
    fields: &TaskFields,
    previous: Option<&TaskFields>,
    vector_clock: &VectorClock,
) -> Result<()> {
    let diff = incoming_fields_json(fields);
    let previous_state = previous.map(incoming_fields_json);
    db::task_history::append(
        tx,
        Uuid::new_v4(),
        task_id,
        auth.user_id,
        device_id,
        change_type,
        diff,
        previous_state,
        vector_clock,
    )
    .await?;
    Ok(())
}

fn incoming_fields_json(fields: &TaskFields) -> JsonValue {
    serde_json::to_value(fields).unwrap_or(JsonValue::Null)
}

fn row_snapshot(row: &TaskRow) -> JsonValue {
    serde_json::to_value(row.fields()).unwrap_or(JsonValue::Null)
}

/// Build the fully-proposed `TaskFields` from an existing row (if any) and
/// the change's partial `data`: present fields override, absent fields fall
/// back to the server's stored value, and a brand-new task without a prior
/// row requires at least a title.
fn build_task_fields(existing: Option<&TaskFields>, data: &TaskChangeData) -> Result<TaskFields> {
    let base = existing.cloned();

    let title = data
        .title
        .clone()
        .or_else(|| base.as_ref().map(|f| f.title.clone()))
        .ok_or_else(|| AppError::BadRequest("task change missing title".into()))?;

    Ok(TaskFields {
        title,
        description: data
            .description
            .clone()
            .or_else(|| base.as_ref().and_then(|f| f.description.clone())),
        status: data
            .status
            .unwrap_or_else(|| base.as_ref().map(|f| f.status).unwrap_or(TaskStatus::Todo)),
        priority: data
            .priority
            .unwrap_or_else(|| base.as_ref().map(|f| f.priority).unwrap_or(TaskPriority::Medium)),
        due_date: data.due_date.or_else(|| base.as_ref().and_then(|f| f.due_date)),
        assigned_to: data
            .assigned_to
            .clone()
            .or_else(|| base.as_ref().and_then(|f| f.assigned_to.clone())),
        tags: data
            .tags
            .clone()
            .unwrap_or_else(|| base.as_ref().map(|f| f.tags.clone()).unwrap_or_default()),
        custom_fields: data
            .custom_fields
            .clone()
            .unwrap_or_else(|| base.as_ref().map(|f| f.custom_fields.clone()).unwrap_or_default()),
        position: data
            .position
            .clone()
            .unwrap_or_else(|| base.as_ref().map(|f| f.position.clone()).unwrap_or_else(|| "1000".to_string())),
    })
}

/// A change's audit priority: `1` for create/status changes, up to `5`
/// otherwise. Recorded in the sync log's metadata only, never affects
/// processing order or outcome.
fn sync_priority(
    operation: &ChangeOperation,
    previous: Option<&TaskFields>,
    current: &TaskFields,
) -> u8 {
    let Some(previous) = previous else {
        return 1;
    };
    if matches!(operation, ChangeOperation::Create) || previous.status != current.status {
        return 1;
    }
    if previous.priority != current.priority || previous.assigned_to != current.assigned_to {
        return 2;
    }
    if previous.due_date != current.due_date || previous.position != current.position {
        return 3;
    }
    if previous.tags != current.tags || previous.custom_fields != current.custom_fields {
        return 4;
    }
    5
}
