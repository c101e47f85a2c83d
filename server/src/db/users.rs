//! Queries for the authenticated principal.
//!
//! Real authentication is out of scope: the bearer token is taken as the
//! user's id, unverified. This module only surfaces the organization and
//! role that back the principal the token names.

use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub role: String,
}

pub async fn get_active_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, organization_id, role
        FROM users
        WHERE id = $1 AND deleted_at IS NULL
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Used only by the `/api/auth/login/` stub: any password is accepted, so
/// this just resolves the email to the id the bearer token will carry.
pub async fn get_active_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, organization_id, role
        FROM users
        WHERE email = $1 AND deleted_at IS NULL
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}
