//! Store handlers. Writes resolve the nested `address` and `openingHours` lists.

use super::{json_body, parse_id, ListParams};
use crate::error::AppError;
use crate::model::Store;
use crate::payload::{parse_body, StorePayload};
use crate::query::{ListQuery, STORE_FIELDS};
use crate::response::{paginated, success_one, success_one_ok};
use crate::service::StoreService;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

#[utoipa::path(
    get,
    path = "/stores/",
    params(ListParams),
    responses(
        (status = 200, description = "Page of stores with embedded records under `data`", body = [Store]),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Page out of range")
    ),
    security(("token" = [])),
    tag = "stores"
)]
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let query = ListQuery::parse(&params, STORE_FIELDS)?;
    let page = StoreService::list(&state, &query).await?;
    paginated(page, &query)
}

#[utoipa::path(
    post,
    path = "/stores/",
    request_body = StorePayload,
    responses(
        (status = 201, description = "Created store under `data`", body = Store),
        (status = 400, description = "Validation error, unknown nested id or shared record conflict")
    ),
    security(("token" = [])),
    tag = "stores"
)]
pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload: StorePayload = parse_body(json_body(body)?)?;
    let store = StoreService::create(&state, &payload).await?;
    Ok(success_one(store))
}

#[utoipa::path(
    get,
    path = "/stores/{id}/",
    params(("id" = i64, Path, description = "Store id")),
    responses(
        (status = 200, description = "Store under `data`", body = Store),
        (status = 404, description = "No such store")
    ),
    security(("token" = [])),
    tag = "stores"
)]
pub async fn read(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id_str)?;
    let store = StoreService::get(&state, id).await?;
    Ok(success_one_ok(store))
}

#[utoipa::path(
    put,
    path = "/stores/{id}/",
    params(("id" = i64, Path, description = "Store id")),
    request_body = StorePayload,
    responses(
        (status = 200, description = "Updated store under `data`", body = Store),
        (status = 400, description = "Validation error, unknown nested id or shared record conflict"),
        (status = 404, description = "No such store")
    ),
    security(("token" = [])),
    tag = "stores"
)]
pub async fn update(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id_str)?;
    let payload: StorePayload = parse_body(json_body(body)?)?;
    let store = StoreService::update(&state, id, &payload).await?;
    Ok(success_one_ok(store))
}

#[utoipa::path(
    delete,
    path = "/stores/{id}/",
    params(("id" = i64, Path, description = "Store id")),
    responses(
        (status = 204, description = "Deleted; addresses and opening hours remain"),
        (status = 404, description = "No such store")
    ),
    security(("token" = [])),
    tag = "stores"
)]
pub async fn delete(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id_str)?;
    StoreService::delete(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
