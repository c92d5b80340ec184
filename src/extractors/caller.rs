//! Extract the caller's bearer token (header, else `jwt`/`jwt_type` cookies) and user identity.

use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;

pub const ANONYMOUS: &str = "anonymous";

/// Identity carried in the EDF access token payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerUser {
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub roles: Vec<String>,
}

/// Caller context. `authorization` is `None` when the request carried no token;
/// the client then falls back to the service-account token.
#[derive(Clone, Debug, Default)]
pub struct Caller {
    pub authorization: Option<String>,
    pub user: Option<CallerUser>,
}

impl Caller {
    pub fn login(&self) -> &str {
        self.user
            .as_ref()
            .and_then(|u| u.username.as_deref())
            .unwrap_or(ANONYMOUS)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.user_id.as_deref())
    }

    pub fn has_any_role(&self, allowed: &[&str]) -> bool {
        self.user
            .as_ref()
            .map(|u| u.roles.iter().any(|r| allowed.contains(&r.as_str())))
            .unwrap_or(false)
    }

    pub fn is_super_user(&self) -> bool {
        self.user
            .as_ref()
            .map(|u| u.roles.iter().any(|r| r == "admin"))
            .unwrap_or(false)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                parts
                    .headers
                    .get(header::COOKIE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(token_from_cookies)
            });
        let identity_token = authorization
            .clone()
            .or_else(|| state.client.session().default_access_token());
        let user = identity_token.as_deref().and_then(decode_user);
        Ok(Caller { authorization, user })
    }
}

/// `jwt=<token>; jwt_type=<type>` → `"<type> <token>"`.
pub fn token_from_cookies(cookie_header: &str) -> Option<String> {
    let cookie = |name: &str| {
        cookie_header
            .split(';')
            .map(str::trim)
            .find_map(|c| c.strip_prefix(name).and_then(|rest| rest.strip_prefix('=')))
            .map(str::to_string)
    };
    let token = cookie("jwt").filter(|t| !t.is_empty())?;
    let token_type = cookie("jwt_type").filter(|t| !t.is_empty()).unwrap_or_else(|| "Bearer".into());
    Some(format!("{} {}", token_type, token))
}

/// Read the user from an `Authorization` value or a bare JWT. The signature is not checked.
pub fn decode_user(authorization: &str) -> Option<CallerUser> {
    let token = authorization.split_whitespace().last()?;
    if token == "null" {
        return None;
    }
    let payload = token.split('.').nth(1)?;
    let bytes = match URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "error decoding token payload");
            return None;
        }
    };
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let text = |v: &Value| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    let username = claims.pointer("/EDF_ACM_User/name").and_then(text);
    let user_id = claims.pointer("/EDF_ACM_User/public_id").and_then(text);
    let roles = claims
        .get("EDF_ACM_Role")
        .and_then(Value::as_array)
        .map(|roles| roles.iter().filter_map(|r| r.get("public_id").and_then(text)).collect())
        .unwrap_or_default();
    if username.is_none() && user_id.is_none() {
        return None;
    }
    Some(CallerUser { username, user_id, roles })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edf::testing::jwt_for;

    #[test]
    fn decodes_user_and_roles() {
        let jwt = jwt_for("ivan", "u-42", &["admin", "web_admin"]);
        let user = decode_user(&format!("Bearer {}", jwt)).unwrap();
        assert_eq!(user.username.as_deref(), Some("ivan"));
        assert_eq!(user.user_id.as_deref(), Some("u-42"));
        assert_eq!(user.roles, vec!["admin", "web_admin"]);
    }

    #[test]
    fn null_and_garbage_tokens_yield_no_user() {
        assert!(decode_user("Bearer null").is_none());
        assert!(decode_user("Bearer not-a-jwt").is_none());
        assert!(decode_user("Bearer a.!!!.c").is_none());
    }

    #[test]
    fn cookies_compose_authorization() {
        assert_eq!(
            token_from_cookies("theme=dark; jwt=abc.def.ghi; jwt_type=Bearer").as_deref(),
            Some("Bearer abc.def.ghi")
        );
        assert_eq!(token_from_cookies("jwt=t1").as_deref(), Some("Bearer t1"));
        assert!(token_from_cookies("jwt_type=Bearer").is_none());
    }

    #[test]
    fn anonymous_login_without_user() {
        let caller = Caller::default();
        assert_eq!(caller.login(), ANONYMOUS);
        assert!(!caller.is_super_user());
        assert!(!caller.has_any_role(&["admin"]));
    }

    #[test]
    fn role_membership() {
        let caller = Caller {
            authorization: None,
            user: decode_user(&jwt_for("olga", "u-7", &["head", "web_user"])),
        };
        assert!(caller.has_any_role(&["admin", "head"]));
        assert!(!caller.has_any_role(&["web_admin"]));
    }
}
