//! Append-only history of accepted task writes. Written, never read back by
//! the sync algorithm itself — audit display only.

use serde_json::Value as JsonValue;
use sqlx::{Postgres, Transaction};
use sync_engine::VectorClock;
use uuid::Uuid;

#[allow(clippy::too_many_arguments)]
pub async fn append(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    task_id: Uuid,
    user_id: Uuid,
    device_id: Uuid,
    change_type: &str,
    diff: JsonValue,
    previous_state: Option<JsonValue>,
    vector_clock: &VectorClock,
) -> Result<(), sqlx::Error> {
    let clock_json = serde_json::to_value(vector_clock).unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO task_history (
            id, task_id, user_id, device_id, change_type, diff, previous_state, vector_clock
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id)
    .bind(task_id)
    .bind(user_id)
    .bind(device_id)
    .bind(change_type)
    .bind(diff)
    .bind(previous_state)
    .bind(clock_json)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
