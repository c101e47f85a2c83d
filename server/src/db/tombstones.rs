//! Tombstones: retained deletion records used to propagate deletes to
//! devices that pull after the fact.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use sync_engine::VectorClock;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TombstoneRow {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    #[serde(skip)]
    pub organization_id: Uuid,
    pub deleted_by_user_id: Option<Uuid>,
    pub deleted_from_device_id: Option<Uuid>,
    pub vector_clock: JsonValue,
    #[serde(skip)]
    pub entity_snapshot: JsonValue,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    organization_id: Uuid,
    entity_type: &str,
    entity_id: Uuid,
    deleted_by_user_id: Uuid,
    deleted_from_device_id: Uuid,
    vector_clock: &VectorClock,
    entity_snapshot: JsonValue,
    retention_days: i64,
) -> Result<(), sqlx::Error> {
    let clock_json = serde_json::to_value(vector_clock).unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO tombstones (
            id, organization_id, entity_type, entity_id, deleted_by_user_id,
            deleted_from_device_id, vector_clock, entity_snapshot, created_at, expires_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now() + make_interval(days => $9))
        "#,
    )
    .bind(id)
    .bind(organization_id)
    .bind(entity_type)
    .bind(entity_id)
    .bind(deleted_by_user_id)
    .bind(deleted_from_device_id)
    .bind(clock_json)
    .bind(entity_snapshot)
    .bind(retention_days)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Tombstones created after `since`, not yet expired, excluding the
/// caller's own device.
pub async fn list_since(
    pool: &PgPool,
    organization_id: Uuid,
    since: DateTime<Utc>,
    caller_device_id: Uuid,
    limit: i64,
) -> Result<Vec<TombstoneRow>, sqlx::Error> {
    sqlx::query_as::<_, TombstoneRow>(
        r#"
        SELECT id, entity_type, entity_id, organization_id, deleted_by_user_id,
               deleted_from_device_id, vector_clock, entity_snapshot, created_at, expires_at
        FROM tombstones
        WHERE organization_id = $1
          AND created_at > $2
          AND expires_at > now()
          AND (deleted_from_device_id IS NULL OR deleted_from_device_id <> $3)
        ORDER BY created_at ASC
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

/// Delete tombstones whose `expires_at` has passed. Returns the number
/// removed. Used by the `cleanup` subcommand.
pub async fn delete_expired(pool: &PgPool, dry_run: bool) -> Result<u64, sqlx::Error> {
    if dry_run {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tombstones WHERE expires_at <= now()")
                .fetch_one(pool)
                .await?;
        return Ok(count as u64);
    }

    let result = sqlx::query("DELETE FROM tombstones WHERE expires_at <= now()")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
