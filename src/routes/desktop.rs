//! Desktop routes. Save and delete check the caller's role in the handler.

use crate::handlers::desktop::{delete, list, load, save};
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

pub fn desktop_routes(state: AppState) -> Router {
    Router::new()
        .route("/desktop", get(list))
        .route("/desktop/getDesktops", post(load))
        .route("/desktop/:desktop", put(save).delete(delete))
        .with_state(state)
}
