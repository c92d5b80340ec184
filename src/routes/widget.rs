//! Widget routes: generic instance CRUD by model name, plus value suggest.

use crate::handlers::widget::{create, delete_item, get_item, get_items, list, save_item, suggest};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn widget_routes(state: AppState) -> Router {
    Router::new()
        .route("/widget", get(list).post(create))
        .route("/widget/suggest", get(suggest))
        .route("/widget/:model_name", get(get_items))
        .route(
            "/widget/:model_name/:model_id",
            get(get_item).patch(save_item).delete(delete_item),
        )
        .with_state(state)
}
