//! Login against the platform token endpoint; logout and refresh are acknowledgements.

use crate::edf::TokenResponse;
use crate::error::AppError;
use crate::extractors::{decode_user, CallerUser};
use crate::response::ack;
use crate::state::AppState;
use axum::{extract::State, Json};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

/// The decoded user merged with the whole token endpoint answer.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub user: CallerUser,
    #[serde(flatten)]
    pub token: TokenResponse,
}

/// Lowercase hex MD5, the form the platform stores passwords in.
pub fn password_digest(password: &str) -> String {
    format!("{:x}", Md5::digest(password.as_bytes()))
}

/// POST /api/auth/login
pub async fn login(State(state): State<AppState>, Json(body): Json<LoginBody>) -> Result<Json<LoginResponse>, AppError> {
    tracing::info!(user = %body.username, "login");
    let token = state
        .client
        .get_token(&body.username, &password_digest(&body.password))
        .await?;
    let user = decode_user(&token.access_token)
        .ok_or_else(|| AppError::Unauthorized(format!("no user in token for {}", body.username)))?;
    Ok(Json(LoginResponse { user, token }))
}

/// POST /api/auth/logout
pub async fn logout() -> Json<serde_json::Value> {
    ack()
}

/// POST /api/auth/refresh-token
pub async fn refresh() -> Json<serde_json::Value> {
    ack()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_lowercase_hex() {
        assert_eq!(password_digest("password"), "5f4dcc3b5aa765d61d8327deb882cf99");
        assert_eq!(password_digest(""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
