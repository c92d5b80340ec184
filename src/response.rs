//! Response helpers. The frontend consumes platform payloads as-is, without an extra envelope.

use axum::{http::StatusCode, Json};
use serde::Serialize;

pub fn ok<T: Serialize>(data: T) -> (StatusCode, Json<T>) {
    (StatusCode::OK, Json(data))
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(data))
}

/// `{"ok": true}` acknowledgement for endpoints with nothing to return.
pub fn ack() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
