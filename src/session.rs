//! Process-wide session: the service-account token used when a caller brings none.
//! Writes are last-write-wins; any valid token is as good as another.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Initial,
    Connecting,
    Success,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Initial => "INITIAL",
            SessionStatus::Connecting => "CONNECTING",
            SessionStatus::Success => "SUCCESS",
            SessionStatus::Error => "ERROR",
        }
    }
}

#[derive(Clone, Debug)]
struct SessionInner {
    status: SessionStatus,
    default_access_token: Option<String>,
    headers: HashMap<String, String>,
}

#[derive(Debug)]
pub struct Session {
    inner: RwLock<SessionInner>,
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            inner: RwLock::new(SessionInner {
                status: SessionStatus::Initial,
                default_access_token: None,
                headers: HashMap::new(),
            }),
        }
    }

    /// Session already holding a token, for tests and offline tools.
    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Session::new();
        session.store_token(token.into());
        session
    }

    pub fn status(&self) -> SessionStatus {
        self.read().status
    }

    pub fn default_access_token(&self) -> Option<String> {
        self.read().default_access_token.clone()
    }

    /// Auth headers derived from the default token.
    pub fn headers(&self) -> HashMap<String, String> {
        self.read().headers.clone()
    }

    pub fn mark_connecting(&self) {
        self.write().status = SessionStatus::Connecting;
    }

    /// Keeps the previous token; a stale token is still worth a retry.
    pub fn mark_error(&self) {
        self.write().status = SessionStatus::Error;
    }

    pub fn store_token(&self, token: String) {
        let mut inner = self.write();
        inner.headers = HashMap::from([("Authorization".to_string(), token.clone())]);
        inner.default_access_token = Some(token);
        inner.status = SessionStatus::Success;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_has_no_token() {
        let s = Session::new();
        assert_eq!(s.status(), SessionStatus::Initial);
        assert!(s.default_access_token().is_none());
        assert!(s.headers().is_empty());
    }

    #[test]
    fn storing_token_derives_headers_and_succeeds() {
        let s = Session::new();
        s.mark_connecting();
        assert_eq!(s.status(), SessionStatus::Connecting);
        s.store_token("Bearer abc".into());
        assert_eq!(s.status(), SessionStatus::Success);
        assert_eq!(s.default_access_token().as_deref(), Some("Bearer abc"));
        assert_eq!(s.headers().get("Authorization").map(String::as_str), Some("Bearer abc"));
    }

    #[test]
    fn error_keeps_last_token() {
        let s = Session::with_token("Bearer old");
        s.mark_error();
        assert_eq!(s.status(), SessionStatus::Error);
        assert_eq!(s.default_access_token().as_deref(), Some("Bearer old"));
    }
}
