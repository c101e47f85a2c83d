//! Authentication stub routes.
//!
//! Real authentication is out of scope: these exist so a client's
//! login/refresh flow has somewhere to land. Any credentials are accepted;
//! the "token" returned is just the user id, which is what `AuthUser`
//! already treats the bearer token as.

use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, Result};
use crate::AppState;
use axum::extract::State;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    #[allow(dead_code)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub token: String,
}

/// `POST /api/auth/login/`
async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    let user = db::users::get_active_user_by_email(&state.pool, &request.email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(TokenResponse {
        token: user.id.to_string(),
        user_id: user.id,
    }))
}

/// `POST /api/auth/refresh/`
async fn refresh_handler(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>> {
    let user_id = Uuid::parse_str(&request.token).map_err(|_| AppError::Unauthorized)?;
    let user = db::users::get_active_user(&state.pool, user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(TokenResponse {
        token: user.id.to_string(),
        user_id: user.id,
    }))
}

/// Create auth routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login/", post(login_handler))
        .route("/api/auth/refresh/", post(refresh_handler))
}
