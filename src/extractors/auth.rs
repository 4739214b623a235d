//! Token authentication: `Authorization: Token <key>` or `Authorization: Bearer <key>`.

use crate::error::AppError;
use crate::model::User;
use crate::service::TokenService;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

const SCHEMES: [&str; 2] = ["Token", "Bearer"];

/// The user owning the request's token.
#[derive(Clone, Debug)]
pub struct AuthUser(pub User);

/// Key from an `Authorization` header value; the scheme is matched case-insensitively.
pub fn token_key(value: &str) -> Option<&str> {
    let (scheme, key) = value.trim().split_once(' ')?;
    let key = key.trim();
    if key.is_empty() || key.contains(' ') {
        return None;
    }
    SCHEMES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(scheme))
        .then_some(key)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(key) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(token_key)
        else {
            tracing::warn!(path = %parts.uri.path(), "missing or malformed authorization header");
            return Err(AppError::Unauthorized);
        };
        match TokenService::authenticate(state, key).await? {
            Some(user) => Ok(AuthUser(user)),
            None => {
                tracing::warn!(path = %parts.uri.path(), "unknown token");
                Err(AppError::Unauthorized)
            }
        }
    }
}

/// Route layer rejecting requests without a valid token; the user is stored in the
/// request extensions for handlers that want it.
pub async fn require_token(AuthUser(user): AuthUser, mut request: Request, next: Next) -> Response {
    tracing::debug!(user = %user.username, "authenticated");
    request.extensions_mut().insert(user);
    next.run(request).await
}
