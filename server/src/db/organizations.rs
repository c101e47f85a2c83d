//! The organization vector clock: a cheap fingerprint of org-global state,
//! computed on demand (never persisted — see DESIGN.md Open Question 3).

use sqlx::PgPool;
use sync_engine::VectorClock;
use uuid::Uuid;

use super::{comments, tasks};

pub async fn vector_clock(pool: &PgPool, organization_id: Uuid) -> Result<VectorClock, sqlx::Error> {
    let mut merged = VectorClock::new();

    for raw in tasks::live_vector_clocks(pool, organization_id).await? {
        let clock: VectorClock = serde_json::from_value(raw).unwrap_or_default();
        merged = merged.merge(&clock);
    }

    for raw in comments::live_vector_clocks(pool, organization_id).await? {
        let clock: VectorClock = serde_json::from_value(raw).unwrap_or_default();
        merged = merged.merge(&clock);
    }

    Ok(merged)
}
