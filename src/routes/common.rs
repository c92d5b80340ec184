//! Common routes: health, readiness, version.

use crate::session::SessionStatus;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    edf: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// Ready once the service account holds a platform token.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    let session = state.client.session().status();
    if session == SessionStatus::Success {
        return (
            StatusCode::OK,
            Json(ReadyBody {
                status: "ok",
                edf: session.as_str(),
            }),
        );
    }
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ReadyBody {
            status: "degraded",
            edf: session.as_str(),
        }),
    )
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn api_status() -> &'static str {
    "OK"
}

async fn api_version() -> &'static str {
    "v1"
}

/// GET /health, /ready, /info, /api/status, /api/version.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/info", get(version))
        .route("/api/status", get(api_status))
        .route("/api/version", get(api_version))
        .with_state(state)
}
