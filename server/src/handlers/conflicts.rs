//! Manual conflict resolution: list what the auto-resolver couldn't settle,
//! and apply a human's chosen resolution back through the entity store.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sync_engine::record::{CommentFields, TaskFields};
use sync_engine::{checksum::task_checksum, VectorClock};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db;
use crate::error::{AppError, Result};
use crate::throttle::{Principal, Scope};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPayload {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub local_version: JsonValue,
    pub server_version: JsonValue,
    pub local_vector_clock: JsonValue,
    pub server_vector_clock: JsonValue,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl From<db::conflicts::ConflictRow> for ConflictPayload {
    fn from(row: db::conflicts::ConflictRow) -> Self {
        ConflictPayload {
            id: row.id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            local_version: row.local_version,
            server_version: row.server_version,
            local_vector_clock: row.local_vector_clock,
            server_vector_clock: row.server_vector_clock,
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

/// `GET /api/sync/conflicts/`
pub async fn list_conflicts_handler(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ConflictPayload>>> {
    let rows = db::conflicts::list_unresolved(&state.pool, auth.organization_id).await?;
    Ok(Json(rows.into_iter().map(ConflictPayload::from).collect()))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Local,
    Remote,
    Custom,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    pub resolution: Resolution,
    pub custom_resolution: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictResponse {
    pub success: bool,
    pub resolution_strategy: String,
}

/// `POST /api/sync/conflicts/{id}/resolve/`
pub async fn resolve_conflict_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveConflictRequest>,
) -> Result<Json<ResolveConflictResponse>> {
    state.rate_limiter.check(
        Scope::ConflictResolution,
        Principal::User(auth.user_id),
        state.config.rate_limit_conflict_resolution,
    )?;

    let mut tx = state.pool.begin().await?;

    let conflict = db::conflicts::get_for_update(&mut tx, id, auth.organization_id)
        .await?
        .ok_or_else(|| AppError::Conflict(id.to_string()))?;

    let resolved_payload = match request.resolution {
        Resolution::Local => conflict.local_version.clone(),
        Resolution::Remote => conflict.server_version.clone(),
        Resolution::Custom => request
            .custom_resolution
            .clone()
            .ok_or_else(|| AppError::BadRequest("customResolution is required for custom resolution".into()))?,
    };

    let strategy = match request.resolution {
        Resolution::Local => "local_wins",
        Resolution::Remote => "server_wins",
        Resolution::Custom => "manual",
    };

    let local_clock: VectorClock =
        serde_json::from_value(conflict.local_vector_clock.clone()).unwrap_or_default();
    let server_clock: VectorClock =
        serde_json::from_value(conflict.server_vector_clock.clone()).unwrap_or_default();
    let merged_clock = local_clock.merge(&server_clock);
    let device_id = conflict.device_id.unwrap_or_else(Uuid::nil);

    match conflict.entity_type.as_str() {
        "task" => {
            let fields: TaskFields = serde_json::from_value(resolved_payload.clone())
                .map_err(|e| AppError::BadRequest(format!("invalid task payload: {e}")))?;
            let existing = db::tasks::get_any_for_update(&mut tx, auth.organization_id, conflict.entity_id)
                .await?
                .ok_or_else(|| AppError::NotFound(conflict.entity_id.to_string()))?;
            let checksum = task_checksum(&fields);
            db::tasks::overwrite(
                &mut tx,
                conflict.entity_id,
                &fields,
                &merged_clock,
                &checksum,
                existing.version + 1,
                auth.user_id,
                device_id,
            )
            .await?;
            db::task_history::append(
                &mut tx,
                Uuid::new_v4(),
                conflict.entity_id,
                auth.user_id,
                device_id,
                "updated",
                serde_json::to_value(&fields).unwrap_or(JsonValue::Null),
                Some(serde_json::to_value(existing.fields()).unwrap_or(JsonValue::Null)),
                &merged_clock,
            )
            .await?;
        }
        "comment" => {
            let fields: CommentFields = serde_json::from_value(resolved_payload.clone())
                .map_err(|e| AppError::BadRequest(format!("invalid comment payload: {e}")))?;
            let existing = db::comments::get_any_for_update(&mut tx, conflict.entity_id)
                .await?
                .ok_or_else(|| AppError::NotFound(conflict.entity_id.to_string()))?;
            db::comments::overwrite(
                &mut tx,
                conflict.entity_id,
                &fields,
                &merged_clock,
                existing.version + 1,
                auth.user_id,
                device_id,
            )
            .await?;
        }
        other => return Err(AppError::Internal(format!("unsupported conflict entity type: {other}"))),
    }

    db::conflicts::mark_resolved(&mut tx, id, strategy, &resolved_payload, auth.user_id).await?;

    tx.commit().await?;

    Ok(Json(ResolveConflictResponse {
        success: true,
        resolution_strategy: strategy.to_string(),
    }))
}
