//! Route tables. Common routes sit at the root; feature routes are nested under `/api`.

pub mod auth;
pub mod bookmark;
pub mod common;
pub mod desktop;
pub mod layout;
pub mod model;
pub mod widget;

pub use auth::auth_routes;
pub use bookmark::bookmark_routes;
pub use common::common_routes;
pub use desktop::desktop_routes;
pub use layout::layout_routes;
pub use model::model_routes;
pub use widget::widget_routes;

use crate::state::AppState;
use axum::Router;

/// Feature routes, relative to `/api`.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .merge(auth_routes(state.clone()))
        .merge(model_routes(state.clone()))
        .merge(bookmark_routes(state.clone()))
        .merge(widget_routes(state.clone()))
        .merge(layout_routes(state.clone()))
        .merge(desktop_routes(state))
}

/// Full route table without middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .nest("/api", api_routes(state))
}
