//! Opening hours CRUD handlers.

use super::{json_body, parse_id, ListParams};
use crate::error::AppError;
use crate::model::OpeningHours;
use crate::payload::{parse_body, OpeningHoursPayload};
use crate::query::{ListQuery, OPENING_HOURS_FIELDS};
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
    path = "/opening-hours/",
    params(ListParams),
    responses(
        (status = 200, description = "Page of opening hours under `data`", body = [OpeningHours]),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Page out of range")
    ),
    security(("token" = [])),
    tag = "opening-hours"
)]
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let query = ListQuery::parse(&params, OPENING_HOURS_FIELDS)?;
    let page = CrudService::list_opening_hours(&state, &query).await?;
    paginated(page, &query)
}

#[utoipa::path(
    post,
    path = "/opening-hours/",
    request_body = OpeningHoursPayload,
    responses(
        (status = 201, description = "Created opening hours under `data`", body = OpeningHours),
        (status = 400, description = "Validation error")
    ),
    security(("token" = [])),
    tag = "opening-hours"
)]
pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let payload: OpeningHoursPayload = parse_body(json_body(body)?)?;
    let opening_hours = CrudService::create_opening_hours(&state, &payload).await?;
    Ok(success_one(opening_hours))
}

#[utoipa::path(
    get,
    path = "/opening-hours/{id}/",
    params(("id" = i64, Path, description = "Opening hours id")),
    responses(
        (status = 200, description = "Opening hours under `data`", body = OpeningHours),
        (status = 404, description = "No such opening hours")
    ),
    security(("token" = [])),
    tag = "opening-hours"
)]
pub async fn read(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id_str)?;
    let opening_hours = CrudService::get_opening_hours(&state, id).await?;
    Ok(success_one_ok(opening_hours))
}

#[utoipa::path(
    put,
    path = "/opening-hours/{id}/",
    params(("id" = i64, Path, description = "Opening hours id")),
    request_body = OpeningHoursPayload,
    responses(
        (status = 200, description = "Updated opening hours under `data`", body = OpeningHours),
        (status = 400, description = "Validation error"),
        (status = 404, description = "No such opening hours")
    ),
    security(("token" = [])),
    tag = "opening-hours"
)]
pub async fn update(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id_str)?;
    let payload: OpeningHoursPayload = parse_body(json_body(body)?)?;
    let opening_hours = CrudService::replace_opening_hours(&state, id, &payload).await?;
    Ok(success_one_ok(opening_hours))
}

#[utoipa::path(
    delete,
    path = "/opening-hours/{id}/",
    params(("id" = i64, Path, description = "Opening hours id")),
    responses(
        (status = 204, description = "Deleted, store associations removed"),
        (status = 404, description = "No such opening hours")
    ),
    security(("token" = [])),
    tag = "opening-hours"
)]
pub async fn delete(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id_str)?;
    CrudService::delete_opening_hours(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
