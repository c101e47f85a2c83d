//! HTTP route definitions.

mod auth;
mod conflicts;
mod health;
mod sync;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(sync::routes())
        .merge(conflicts::routes())
        .merge(auth::routes())
}
