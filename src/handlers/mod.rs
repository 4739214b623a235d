//! HTTP handlers for addresses, opening hours, stores and token issuing.

pub mod address;
pub mod auth;
pub mod opening_hours;
pub mod store;

use crate::error::AppError;
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use utoipa::IntoParams;

/// Path ids that are not integers match no record.
fn parse_id(id_str: &str) -> Result<i64, AppError> {
    id_str
        .parse()
        .map_err(|_| AppError::NotFound(format!("no record with id '{}'", id_str)))
}

/// Unwrap a JSON body, reporting syntax and content-type problems in the error envelope.
fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    body.map(|Json(v)| v)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Query parameters shared by every list endpoint. Filters are additional
/// `<field>=<value>` pairs, one per filter field.
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Items per page, at most 100.
    pub page_size: Option<u32>,
    /// Whitespace- or comma-separated terms; each must occur in some field.
    pub search: Option<String>,
    /// Comma-separated fields, `-` prefix for descending.
    pub ordering: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_numeric_ids_are_not_found() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(matches!(parse_id("abc"), Err(AppError::NotFound(_))));
    }
}
