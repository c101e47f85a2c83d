//! Per-request sync audit log, opened at the start of push/pull/conflict
//! resolution and closed with counters and status on completion.

use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Open a log row against the pool directly, not the work transaction: the
/// row must survive even if the sync transaction it's auditing rolls back,
/// or a failed sync would leave no audit trail at all.
pub async fn open(
    pool: &PgPool,
    id: Uuid,
    device_id: Uuid,
    user_id: Uuid,
    sync_type: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_logs (id, device_id, user_id, sync_type)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(id)
    .bind(device_id)
    .bind(user_id)
    .bind(sync_type)
    .execute(pool)
    .await?;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn close_success(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    pushed_count: i32,
    pulled_count: i32,
    conflicts_detected: i32,
    conflicts_resolved: i32,
    duration_ms: i32,
    metadata: JsonValue,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE sync_logs SET
            pushed_count = $2, pulled_count = $3, conflicts_detected = $4,
            conflicts_resolved = $5, duration_ms = $6, status = 'success',
            metadata = $7, completed_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(pushed_count)
    .bind(pulled_count)
    .bind(conflicts_detected)
    .bind(conflicts_resolved)
    .bind(duration_ms)
    .bind(metadata)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Close a log row as failed, outside any transaction (the one that failed
/// has already rolled back).
pub async fn close_failed(pool: &PgPool, id: Uuid, error: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE sync_logs SET status = 'failed', error = $2, completed_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Average successful sync duration over the last 24 hours. Carries the
/// intent of the upstream metrics helper; not exposed as an HTTP route.
pub async fn average_successful_duration_ms_last_24h(
    pool: &PgPool,
) -> Result<Option<f64>, sqlx::Error> {
    let (avg,): (Option<f64>,) = sqlx::query_as(
        r#"
        SELECT AVG(duration_ms)::float8
        FROM sync_logs
        WHERE status = 'success' AND created_at > now() - interval '24 hours'
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(avg)
}

/// Delete sync log rows older than `retention_days`. Used by the `cleanup`
/// subcommand.
pub async fn delete_older_than(
    pool: &PgPool,
    retention_days: i64,
    dry_run: bool,
) -> Result<u64, sqlx::Error> {
    if dry_run {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sync_logs WHERE created_at <= now() - make_interval(days => $1)",
        )
        .bind(retention_days)
        .fetch_one(pool)
        .await?;
        return Ok(count as u64);
    }

    let result = sqlx::query(
        "DELETE FROM sync_logs WHERE created_at <= now() - make_interval(days => $1)",
    )
    .bind(retention_days)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
