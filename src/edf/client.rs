//! Authenticated request client: default-token injection, one re-authentication
//! and retry on a rejected credential, and envelope unwrapping into typed errors.

use crate::config::ServiceAccount;
use crate::edf::envelope::{Envelope, EntityInstancePk, SearchPage, SearchRequest, TokenRequest, TokenResponse, NOT_FOUND_CODE};
use crate::edf::transport::{EdfTransport, OutboundCall, TransportError};
use crate::error::AppError;
use crate::session::Session;
use serde_json::{json, Value};
use std::sync::Arc;

pub const TOKEN_PATH: &str = "authentication/v1/getToken";
pub const SEARCH_PATH: &str = "searchEntityInstances";
pub const READ_PATH: &str = "readEntityInstances";
pub const CREATE_PATH: &str = "createEntityInstances";
pub const UPDATE_PATH: &str = "updateEntityInstances";
pub const DELETE_PATH: &str = "deleteEntityInstances";
pub const DESCRIBE_PATH: &str = "getEntityDescriptions";

const GRANT_TYPE: &str = "authorization_code";

pub struct EdfClient {
    base: String,
    transport: Arc<dyn EdfTransport>,
    session: Arc<Session>,
    account: ServiceAccount,
    reauth_on_400: bool,
}

impl EdfClient {
    pub fn new(
        base: impl Into<String>,
        transport: Arc<dyn EdfTransport>,
        session: Arc<Session>,
        account: ServiceAccount,
    ) -> Self {
        EdfClient {
            base: base.into().trim_end_matches('/').to_string(),
            transport,
            session,
            account,
            reauth_on_400: false,
        }
    }

    /// Also re-authenticate when the platform answers 400 to a stale token.
    pub fn reauth_on_400(mut self, enabled: bool) -> Self {
        self.reauth_on_400 = enabled;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn endpoint(&self, operation: &str) -> String {
        format!("{}/{}", self.base, operation.trim_start_matches('/'))
    }

    /// Obtain a fresh service-account token and make it the default.
    /// Never fails: on error the session is marked ERROR and `false` is returned.
    pub async fn connect(&self) -> bool {
        self.session.mark_connecting();
        tracing::info!(user = %self.account.client_id, "connecting to EDF");
        match self.get_token(&self.account.client_id, &self.account.client_secret).await {
            Ok(token) => {
                self.session.store_token(token.bearer());
                tracing::debug!("default access token received");
                true
            }
            Err(AppError::Unauthorized(msg)) => {
                tracing::error!(user = %self.account.client_id, error = %msg, "service account rejected");
                self.session.mark_error();
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "EDF authentication failed");
                self.session.mark_error();
                false
            }
        }
    }

    /// Exchange user credentials for a token. The token endpoint has no status envelope.
    pub async fn get_token(&self, client_id: &str, client_secret: &str) -> Result<TokenResponse, AppError> {
        let body = serde_json::to_value(TokenRequest {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            grant_type: GRANT_TYPE,
        })
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
        let call = OutboundCall::post(self.endpoint(TOKEN_PATH), body);
        let value = self.transport.send(&call).await.map_err(|e| match e.status() {
            Some(401) => AppError::Unauthorized(format!("user {} not found", client_id)),
            _ => transport_error(e),
        })?;
        serde_json::from_value(value).map_err(|e| AppError::Upstream {
            status: None,
            message: format!("malformed token response: {}", e),
        })
    }

    /// Perform one call and return the envelope `data`.
    ///
    /// Without a caller token the current default token is injected. A rejected
    /// credential triggers one session refresh and exactly one retry.
    pub async fn call(&self, mut call: OutboundCall) -> Result<Value, AppError> {
        let uses_default = call.authorization.is_none();
        if uses_default {
            call.authorization = self.session.default_access_token();
        }
        tracing::info!(method = %call.method, url = %call.url, "EDF call");

        let body = match self.transport.send(&call).await {
            Ok(body) => body,
            Err(e) if self.is_auth_failure(&e) => {
                tracing::warn!(url = %call.url, status = ?e.status(), "credential rejected, reconnecting");
                if !self.connect().await {
                    tracing::warn!("reconnect failed, retrying with the current token");
                }
                if uses_default {
                    call.authorization = self.session.default_access_token();
                }
                self.transport.send(&call).await.map_err(|e| {
                    tracing::error!(url = %call.url, error = %e, "retry after reconnect failed");
                    transport_error(e)
                })?
            }
            Err(e) => {
                tracing::error!(url = %call.url, error = %e, "EDF call failed");
                return Err(transport_error(e));
            }
        };
        unwrap_envelope(body)
    }

    fn is_auth_failure(&self, err: &TransportError) -> bool {
        match err.status() {
            Some(401) => true,
            Some(400) => self.reauth_on_400,
            _ => false,
        }
    }

    fn post(&self, operation: &str, authorization: Option<String>, body: Value) -> OutboundCall {
        OutboundCall::post(self.endpoint(operation), body).with_authorization(authorization)
    }

    /// Search returning the raw `data` object.
    pub async fn search(&self, authorization: Option<String>, request: &SearchRequest) -> Result<Value, AppError> {
        let body = serde_json::to_value(request).map_err(|e| AppError::BadRequest(e.to_string()))?;
        self.call(self.post(SEARCH_PATH, authorization, body)).await
    }

    pub async fn search_page(&self, authorization: Option<String>, request: &SearchRequest) -> Result<SearchPage, AppError> {
        let data = self.search(authorization, request).await?;
        serde_json::from_value(data).map_err(|e| AppError::Upstream {
            status: None,
            message: format!("malformed search response: {}", e),
        })
    }

    pub async fn read_instances(
        &self,
        authorization: Option<String>,
        user_login: &str,
        pks: &[EntityInstancePk],
    ) -> Result<Value, AppError> {
        let body = json!({ "userLogin": user_login, "entityInstancePks": pks });
        self.call(self.post(READ_PATH, authorization, body)).await
    }

    pub async fn create_instances(&self, authorization: Option<String>, instances: Vec<Value>) -> Result<Value, AppError> {
        let body = json!({ "entityInstances": instances });
        self.call(self.post(CREATE_PATH, authorization, body)).await
    }

    pub async fn update_instances(&self, authorization: Option<String>, instances: Vec<Value>) -> Result<Value, AppError> {
        let body = json!({ "entityInstances": instances });
        self.call(self.post(UPDATE_PATH, authorization, body)).await
    }

    pub async fn delete_instances(&self, authorization: Option<String>, pks: &[EntityInstancePk]) -> Result<Value, AppError> {
        let body = json!({ "entityInstancePks": pks });
        self.call(self.post(DELETE_PATH, authorization, body)).await
    }

    /// Model descriptions (fields, tags) for the named entity models.
    pub async fn entity_descriptions(
        &self,
        authorization: Option<String>,
        login: &str,
        is_super_user: bool,
        names: &[&str],
    ) -> Result<Value, AppError> {
        let entity_pks: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
        let body = json!({
            "authContext": { "login": login, "isSuperUser": is_super_user },
            "entityPks": entity_pks,
        });
        self.call(self.post(DESCRIBE_PATH, authorization, body)).await
    }
}

fn transport_error(e: TransportError) -> AppError {
    match e {
        TransportError::Status { status: 401, message } => AppError::Unauthorized(message),
        TransportError::Status { status, message } => AppError::Upstream {
            status: Some(status),
            message,
        },
        TransportError::Network(message) => AppError::Upstream { status: None, message },
    }
}

/// Return `data` for a SUCCESS envelope, otherwise the mapped domain error.
pub fn unwrap_envelope(body: Value) -> Result<Value, AppError> {
    let envelope: Envelope = serde_json::from_value(body).map_err(|e| AppError::Upstream {
        status: None,
        message: format!("malformed EDF envelope: {}", e),
    })?;
    if envelope.status.is_success() {
        return Ok(envelope.data);
    }
    let status = envelope.status;
    let code = status.code.unwrap_or_else(|| "UNKNOWN".into());
    let message = status.message.unwrap_or_default();
    tracing::error!(code = %code, message = %message, params = ?status.params, "EDF API error");
    if code == NOT_FOUND_CODE {
        let params = status.params.map(|p| p.to_string()).unwrap_or_default();
        return Err(AppError::NotFound(format!("[{}] {}: {}", code, message, params)));
    }
    Err(AppError::Backend {
        code,
        message,
        params: status.params,
    })
}
