//! Layout and page routes.

use crate::handlers::layout::{create, delete, list, load, update};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn layout_routes(state: AppState) -> Router {
    Router::new()
        .route("/layout", get(list).post(create))
        .route("/layout/:layout", get(load).put(update).delete(delete))
        .with_state(state)
}
