//! Bookmark routes. All are POST with JSON bodies, as the frontend sends them.

use crate::handlers::bookmark::{add, list, remove};
use crate::state::AppState;
use axum::{routing::post, Router};

pub fn bookmark_routes(state: AppState) -> Router {
    Router::new()
        .route("/bookmark/list", post(list))
        .route("/bookmark/addBookmark", post(add))
        .route("/bookmark/removeBookmark", post(remove))
        .with_state(state)
}
