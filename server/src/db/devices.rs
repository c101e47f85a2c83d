//! Device rows: the per-device vector-clock component and last-sync time.

use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct DeviceRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_clock: JsonValue,
}

/// Look up a device and confirm it belongs to `user_id`. Returns `None` if
/// the device does not exist or belongs to someone else.
pub async fn get_owned_device(
    pool: &PgPool,
    device_id: Uuid,
    user_id: Uuid,
) -> Result<Option<DeviceRow>, sqlx::Error> {
    sqlx::query_as::<_, DeviceRow>(
        r#"
        SELECT id, user_id, device_clock
        FROM devices
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(device_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Merge `incoming_clock` into the device's stored clock and refresh
/// `last_sync_at`, inside the caller's transaction.
pub async fn merge_clock_and_touch(
    tx: &mut Transaction<'_, Postgres>,
    device_id: Uuid,
    merged_clock: &JsonValue,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE devices
        SET device_clock = $2, last_sync_at = now(), updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(device_id)
    .bind(merged_clock)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Touch `last_sync_at` without changing the clock (used by pull).
pub async fn touch_last_sync(pool: &PgPool, device_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE devices
        SET last_sync_at = now(), updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(device_id)
    .execute(pool)
    .await?;

    Ok(())
}
