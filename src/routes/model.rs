//! Entity model routes: name suggest, description, process step models.

use crate::handlers::model::{model, step_list_model, step_model, step_model_by_event_pk, suggest};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn model_routes(state: AppState) -> Router {
    Router::new()
        .route("/model", get(suggest))
        .route("/model/model", get(model))
        .route("/model/stepListModel", get(step_list_model))
        .route("/model/stepModel", get(step_model))
        .route("/model/stepModelByEventPk", post(step_model_by_event_pk))
        .with_state(state)
}
