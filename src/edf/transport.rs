//! Outbound HTTP to the platform. The trait is the seam tests replace with an in-memory fake.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

/// One outbound call. `authorization` left unset means "use the service-account token".
#[derive(Clone, Debug)]
pub struct OutboundCall {
    pub method: Method,
    pub url: String,
    pub authorization: Option<String>,
    pub body: Value,
}

impl OutboundCall {
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        OutboundCall {
            method: Method::POST,
            url: url.into(),
            authorization: None,
            body,
        }
    }

    /// Attach the caller's bearer credential; `None` keeps the default-token fallback.
    pub fn with_authorization(mut self, authorization: Option<String>) -> Self {
        self.authorization = authorization.filter(|a| !a.trim().is_empty());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The platform answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    /// Connection, timeout or body decoding failure.
    #[error("network: {0}")]
    Network(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Network(_) => None,
        }
    }
}

#[async_trait]
pub trait EdfTransport: Send + Sync {
    /// Perform the call and return the decoded JSON body.
    async fn send(&self, call: &OutboundCall) -> Result<Value, TransportError>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl EdfTransport for HttpTransport {
    async fn send(&self, call: &OutboundCall) -> Result<Value, TransportError> {
        let mut req = self.client.request(call.method.clone(), &call.url);
        if let Some(auth) = &call.authorization {
            req = req.header(reqwest::header::AUTHORIZATION, auth);
        }
        if call.method != Method::GET {
            req = req.json(&call.body);
        }
        let resp = req.send().await.map_err(|e| match e.status() {
            Some(s) => TransportError::Status {
                status: s.as_u16(),
                message: e.to_string(),
            },
            None => TransportError::Network(e.to_string()),
        })?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: if message.is_empty() {
                    status.to_string()
                } else {
                    message
                },
            });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| TransportError::Network(format!("invalid JSON from {}: {}", call.url, e)))
    }
}
