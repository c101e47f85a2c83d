//! Conflict records: one row per concurrent change the detector saw,
//! whether auto-resolved or left for a human.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub user_id: Option<Uuid>,
    pub device_id: Option<Uuid>,
    pub local_version: JsonValue,
    pub server_version: JsonValue,
    pub local_vector_clock: JsonValue,
    pub server_vector_clock: JsonValue,
    pub reason: String,
    pub resolution_strategy: Option<String>,
    pub resolved_payload: Option<JsonValue>,
    pub resolved_by_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Insert a conflict row. `auto_resolved`, when true, marks it resolved at
/// creation time with strategy `auto_resolved`; otherwise it is left
/// unresolved (`resolution_strategy` and `resolved_at` both null) for a
/// human to act on.
#[allow(clippy::too_many_arguments)]
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    organization_id: Uuid,
    entity_type: &str,
    entity_id: Uuid,
    user_id: Uuid,
    device_id: Uuid,
    local_version: &JsonValue,
    server_version: &JsonValue,
    local_vector_clock: &JsonValue,
    server_vector_clock: &JsonValue,
    reason: &str,
    auto_resolved: bool,
) -> Result<Uuid, sqlx::Error> {
    let strategy = auto_resolved.then_some("auto_resolved");

    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO conflicts (
            id, organization_id, entity_type, entity_id, user_id, device_id,
            local_version, server_version, local_vector_clock, server_vector_clock,
            reason, resolution_strategy, resolved_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                CASE WHEN $12 IS NOT NULL THEN now() ELSE NULL END)
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(organization_id)
    .bind(entity_type)
    .bind(entity_id)
    .bind(user_id)
    .bind(device_id)
    .bind(local_version)
    .bind(server_version)
    .bind(local_vector_clock)
    .bind(server_vector_clock)
    .bind(reason)
    .bind(strategy)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.0)
}

/// Unresolved conflicts for an organization, newest first.
pub async fn list_unresolved(
    pool: &PgPool,
    organization_id: Uuid,
) -> Result<Vec<ConflictRow>, sqlx::Error> {
    sqlx::query_as::<_, ConflictRow>(
        r#"
        SELECT id, organization_id, entity_type, entity_id, user_id, device_id,
               local_version, server_version, local_vector_clock, server_vector_clock,
               reason, resolution_strategy, resolved_payload, resolved_by_user_id,
               created_at, resolved_at
        FROM conflicts
        WHERE organization_id = $1 AND resolved_at IS NULL
        ORDER BY created_at DESC
        "#,
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await
}

/// A single conflict scoped to the caller's organization, locked for
/// resolution.
pub async fn get_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    organization_id: Uuid,
) -> Result<Option<ConflictRow>, sqlx::Error> {
    sqlx::query_as::<_, ConflictRow>(
        r#"
        SELECT id, organization_id, entity_type, entity_id, user_id, device_id,
               local_version, server_version, local_vector_clock, server_vector_clock,
               reason, resolution_strategy, resolved_payload, resolved_by_user_id,
               created_at, resolved_at
        FROM conflicts
        WHERE id = $1 AND organization_id = $2
        FOR UPDATE
        "#,
    )
    .bind(id)
    .bind(organization_id)
    .fetch_optional(&mut **tx)
    .await
}

pub async fn mark_resolved(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    strategy: &str,
    resolved_payload: &JsonValue,
    resolver_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE conflicts SET
            resolution_strategy = $2, resolved_payload = $3, resolved_by_user_id = $4,
            resolved_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(strategy)
    .bind(resolved_payload)
    .bind(resolver_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
