//! Sync endpoint routes: push, pull.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{pull_handler, push_handler};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/sync/push/", post(push_handler))
        .route("/api/sync/pull/", get(pull_handler))
}
