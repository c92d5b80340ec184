//! Typed errors and HTTP mapping.

use crate::config::Environment;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Network or HTTP failure talking to the platform. `status` is absent for connection-level errors.
    #[error("upstream: {message}")]
    Upstream { status: Option<u16>, message: String },
    /// The platform answered but its status envelope was not SUCCESS.
    #[error("[{code}] {message}")]
    Backend {
        code: String,
        message: String,
        params: Option<serde_json::Value>,
    },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// HTTP status and stable error code for this error kind.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Upstream { status: Some(s), .. } => (
                StatusCode::from_u16(*s).unwrap_or(StatusCode::BAD_GATEWAY),
                "upstream_error",
            ),
            AppError::Upstream { status: None, .. } => (StatusCode::BAD_GATEWAY, "upstream_unavailable"),
            AppError::Backend { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "backend_error"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let details = match &self {
            AppError::Backend { params, .. } => params.clone(),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        let mut response = (status, Json(&body)).into_response();
        response.extensions_mut().insert(body);
        response
    }
}

/// Middleware: in production, re-render error bodies without `details`.
pub async fn hide_error_details(State(env): State<Environment>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    if env != Environment::Production {
        return response;
    }
    let Some(mut body) = response.extensions_mut().remove::<ErrorBody>() else {
        return response;
    };
    if body.error.details.take().is_none() {
        return response;
    }
    (response.status(), Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_is_mirrored() {
        let err = AppError::Upstream {
            status: Some(403),
            message: "forbidden".into(),
        };
        assert_eq!(err.status_and_code().0, StatusCode::FORBIDDEN);

        let err = AppError::Upstream {
            status: None,
            message: "connection refused".into(),
        };
        assert_eq!(err.status_and_code().0, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn backend_error_message_carries_code() {
        let err = AppError::Backend {
            code: "ERROR_VALIDATION".into(),
            message: "bad field".into(),
            params: None,
        };
        assert_eq!(err.to_string(), "[ERROR_VALIDATION] bad field");
        assert_eq!(err.status_and_code().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    async fn error_body(env: Environment) -> serde_json::Value {
        use axum::{middleware, routing::get, Router};
        use tower::ServiceExt;

        async fn failing() -> Result<(), AppError> {
            Err(AppError::Backend {
                code: "ERROR_VALIDATION".into(),
                message: "bad field".into(),
                params: Some(serde_json::json!(["amount"])),
            })
        }
        let app = Router::new()
            .route("/fail", get(failing))
            .layer(middleware::from_fn_with_state(env, hide_error_details));
        let request = axum::http::Request::builder().uri("/fail").body(axum::body::Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn production_hides_backend_params() {
        let body = error_body(Environment::Production).await;
        assert_eq!(body["error"]["code"], "backend_error");
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn development_shows_backend_params() {
        let body = error_body(Environment::Development).await;
        assert_eq!(body["error"]["details"], serde_json::json!(["amount"]));
    }
}
