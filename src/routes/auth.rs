//! Auth routes: login against the platform, logout, refresh.

use crate::handlers::auth::{login, logout, refresh};
use crate::state::AppState;
use axum::{routing::post, Router};

pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh-token", post(refresh))
        .route("/auth/refresh", post(refresh))
        .with_state(state)
}
