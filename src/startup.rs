//! Process startup: validate settings, connect, load lookup lists, warm the model-name cache, serve.

use crate::config::{validate, Settings};
use crate::edf::{EdfClient, EdfTransport};
use crate::error::{hide_error_details, AppError};
use crate::lists::{load_lists, LookupLists};
use crate::routes::router;
use crate::session::Session;
use crate::state::AppState;
use axum::{middleware, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Build the application state. Only invalid settings are fatal; an unreachable
/// platform leaves the session in ERROR and the service starts degraded.
pub async fn bootstrap(settings: &Settings, transport: Arc<dyn EdfTransport>) -> Result<AppState, AppError> {
    validate(settings)?;

    let session = Arc::new(Session::new());
    let client = EdfClient::new(
        settings.edf_uri.clone(),
        transport,
        session,
        settings.service_account.clone(),
    )
    .reauth_on_400(settings.reauth_on_400);

    if !client.connect().await {
        tracing::warn!(uri = %settings.edf_uri, "EDF not connected, starting degraded");
    }

    let lists = match load_lists(&settings.lists_path).await {
        Ok(lists) => lists,
        Err(e) => {
            tracing::error!(path = %settings.lists_path.display(), error = %e, "lookup lists unavailable");
            LookupLists::new()
        }
    };

    let state = AppState::new(client, lists, settings.models.clone()).with_environment(settings.env);
    if let Err(e) = state.model_names.refill(&state.client).await {
        tracing::warn!(error = %e, "model name cache not filled at startup");
    }
    Ok(state)
}

/// Routes with tracing, a request body limit, and environment-aware error bodies.
pub fn app(state: AppState) -> Router {
    let env = state.env;
    router(state)
        .layer(middleware::from_fn_with_state(env, hide_error_details))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(settings: &Settings, state: AppState) -> Result<(), AppError> {
    let listener = TcpListener::bind(settings.listen_addr()).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_with;
    use crate::edf::client::TOKEN_PATH;
    use crate::edf::testing::{http_status, success, token, FakeTransport};
    use crate::session::SessionStatus;
    use serde_json::json;
    use std::collections::HashMap;

    fn settings(lists: &std::path::Path) -> Settings {
        let vars: HashMap<&str, String> = HashMap::from([
            ("EDF_URI", "http://edf/api/".to_string()),
            ("EDF_DEFAULT_PASSWORD", "secret".to_string()),
            ("EDF_LISTS_PATH", lists.display().to_string()),
        ]);
        load_with(|k| vars.get(k).cloned()).unwrap()
    }

    #[tokio::test]
    async fn connects_loads_lists_and_fills_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("CRM_Client")).unwrap();
        std::fs::write(dir.path().join("CRM_Client").join("city"), "Moscow\nKazan\n").unwrap();
        let fake = FakeTransport::new(|call| {
            if call.url.ends_with(TOKEN_PATH) {
                return Ok(token("t0"));
            }
            Ok(success(json!({"rows": [{"object": {"name": "CRM_Client"}}], "paging": {"totalRows": 1}})))
        })
        .into_arc();

        let state = bootstrap(&settings(dir.path()), fake.clone()).await.unwrap();
        assert_eq!(state.client.session().status(), SessionStatus::Success);
        assert_eq!(state.client.session().default_access_token().as_deref(), Some("Bearer t0"));
        assert_eq!(state.lists.get("CRM_Client", "city").unwrap(), ["Moscow", "Kazan"]);
        assert_eq!(state.model_names.snapshot(), vec!["CRM_Client"]);
        assert_eq!(fake.calls_to(TOKEN_PATH)[0].url, "http://edf/api/authentication/v1/getToken");
    }

    #[tokio::test]
    async fn unreachable_platform_starts_degraded() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeTransport::new(|_| Err(http_status(503))).into_arc();
        let state = bootstrap(&settings(dir.path()), fake).await.unwrap();
        assert_eq!(state.client.session().status(), SessionStatus::Error);
        assert!(state.model_names.snapshot().is_empty());
    }

    #[tokio::test]
    async fn invalid_settings_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = settings(dir.path());
        bad.edf_uri = "ftp://edf".into();
        let fake = FakeTransport::new(|_| Ok(success(json!({})))).into_arc();
        assert!(matches!(bootstrap(&bad, fake.clone()).await, Err(AppError::Config(_))));
        assert!(fake.calls().is_empty());
    }
}
