//! In-memory platform double: records every call and answers from a closure.

use crate::edf::transport::{EdfTransport, OutboundCall, TransportError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = Box<dyn Fn(&OutboundCall) -> Result<Value, TransportError> + Send + Sync>;

pub struct FakeTransport {
    calls: Mutex<Vec<OutboundCall>>,
    responder: Responder,
    delay: Option<Duration>,
}

impl FakeTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&OutboundCall) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        FakeTransport {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
            delay: None,
        }
    }

    /// Sleep before answering, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<OutboundCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose URL ends with `suffix`.
    pub fn calls_to(&self, suffix: &str) -> Vec<OutboundCall> {
        self.calls().into_iter().filter(|c| c.url.ends_with(suffix)).collect()
    }
}

#[async_trait]
impl EdfTransport for FakeTransport {
    async fn send(&self, call: &OutboundCall) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push(call.clone());
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        (self.responder)(call)
    }
}

pub fn success(data: Value) -> Value {
    json!({ "status": { "type": "SUCCESS" }, "data": data })
}

pub fn failure(code: &str, message: &str) -> Value {
    json!({ "status": { "type": "ERROR", "code": code, "message": message, "params": ["p1"] }, "data": null })
}

pub fn token(access_token: &str) -> Value {
    json!({ "token_type": "Bearer", "access_token": access_token })
}

pub fn http_status(status: u16) -> TransportError {
    TransportError::Status {
        status,
        message: format!("status {}", status),
    }
}

/// Unsigned JWT whose payload carries an EDF user and roles.
pub fn jwt_for(user_name: &str, public_id: &str, roles: &[&str]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let roles: Vec<Value> = roles.iter().map(|r| json!({ "public_id": r })).collect();
    let payload = json!({
        "EDF_ACM_User": { "name": user_name, "public_id": public_id },
        "EDF_ACM_Role": roles,
    });
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.sig", header, payload)
}
