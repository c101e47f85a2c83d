//! Bearer-token principal extraction.
//!
//! Real authentication is out of scope: the bearer token is taken as the
//! caller's user id, unverified, then used to look up the live organization
//! and role that back it.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthorized)?;
        let user_id = Uuid::parse_str(token).map_err(|_| AppError::Unauthorized)?;

        let user = db::users::get_active_user(&state.pool, user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthUser {
            user_id: user.id,
            organization_id: user.organization_id,
            role: user.role,
        })
    }
}

/// Like [`AuthUser`], but a missing or invalid token resolves to `None`
/// rather than rejecting the request.
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await.ok();
        Ok(OptionalAuthUser(user))
    }
}

/// The `X-Device-Id` header, required on every sync endpoint that acts on
/// behalf of one specific device.
pub struct DeviceHeader(pub Uuid);

impl FromRequestParts<AppState> for DeviceHeader {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("X-Device-Id")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::BadRequest("missing X-Device-Id header".into()))?;

        let device_id = Uuid::parse_str(raw)
            .map_err(|_| AppError::BadRequest("X-Device-Id is not a valid UUID".into()))?;

        Ok(DeviceHeader(device_id))
    }
}
