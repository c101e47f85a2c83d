//! Manual conflict resolution routes.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{list_conflicts_handler, resolve_conflict_handler};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/sync/conflicts/", get(list_conflicts_handler))
        .route("/api/sync/conflicts/{id}/resolve/", post(resolve_conflict_handler))
}
