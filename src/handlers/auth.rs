//! Token issuing endpoint.

use super::json_body;
use crate::error::AppError;
use crate::payload::{parse_body, Credentials};
use crate::service::TokenService;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct TokenBody {
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api-token-auth/",
    request_body = Credentials,
    responses(
        (status = 200, description = "The user's token, created on first login", body = TokenBody),
        (status = 400, description = "Unknown user or wrong password")
    ),
    tag = "auth"
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<TokenBody>, AppError> {
    let credentials: Credentials = parse_body(json_body(body)?)?;
    let token = TokenService::obtain(&state, &credentials).await?;
    Ok(Json(TokenBody { token }))
}
