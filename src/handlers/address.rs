//! Address CRUD handlers.

use super::{json_body, parse_id, ListParams};
use crate::error::AppError;
use crate::model::Address;
use crate::payload::{parse_body, AddressPayload};
use crate::query::{ListQuery, ADDRESS_FIELDS};
use crate::response::{paginated, success_one, success_one_ok};
use crate::service::CrudService;
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
    path = "/addresses/",
    params(ListParams),
    responses(
        (status = 200, description = "Page of addresses under `data`", body = [Address]),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Page out of range")
    ),
    security(("token" = [])),
    tag = "addresses"
)]
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let query = ListQuery::parse(&params, ADDRESS_FIELDS)?;
    let page = CrudService::list_addresses(&state, &query).await?;
    paginated(page, &query)
}

#[utoipa::path(
    post,
    path = "/addresses/",
    request_body = AddressPayload,
    responses(
        (status = 201, description = "Created address under `data`", body = Address),
        (status = 400, description = "Validation error")
    ),
    security(("token" = [])),
    tag = "addresses"
)]
pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload: AddressPayload = parse_body(json_body(body)?)?;
    let address = CrudService::create_address(&state, &payload).await?;
    Ok(success_one(address))
}

#[utoipa::path(
    get,
    path = "/addresses/{id}/",
    params(("id" = i64, Path, description = "Address id")),
    responses(
        (status = 200, description = "Address under `data`", body = Address),
        (status = 404, description = "No such address")
    ),
    security(("token" = [])),
    tag = "addresses"
)]
pub async fn read(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id_str)?;
    let address = CrudService::get_address(&state, id).await?;
    Ok(success_one_ok(address))
}

#[utoipa::path(
    put,
    path = "/addresses/{id}/",
    params(("id" = i64, Path, description = "Address id")),
    request_body = AddressPayload,
    responses(
        (status = 200, description = "Updated address under `data`", body = Address),
        (status = 400, description = "Validation error"),
        (status = 404, description = "No such address")
    ),
    security(("token" = [])),
    tag = "addresses"
)]
pub async fn update(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id_str)?;
    let payload: AddressPayload = parse_body(json_body(body)?)?;
    let address = CrudService::replace_address(&state, id, &payload).await?;
    Ok(success_one_ok(address))
}

#[utoipa::path(
    delete,
    path = "/addresses/{id}/",
    params(("id" = i64, Path, description = "Address id")),
    responses(
        (status = 204, description = "Deleted, store associations removed"),
        (status = 404, description = "No such address")
    ),
    security(("token" = [])),
    tag = "addresses"
)]
pub async fn delete(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id_str)?;
    CrudService::delete_address(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
