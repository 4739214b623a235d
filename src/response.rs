//! Standard response envelope helpers.

use crate::error::AppError;
use crate::query::ListQuery;
use crate::repo::Page;
use axum::{http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

/// `next` / `previous` are page numbers, absent at either end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub count: u64,
    pub page: u32,
    pub page_size: u32,
    pub next: Option<u32>,
    pub previous: Option<u32>,
}

impl PageMeta {
    /// Metadata for `query`'s page out of `count` rows; a page past the last one is 404.
    /// Page 1 always exists, even when empty.
    pub fn for_page(count: u64, query: &ListQuery) -> Result<Self, AppError> {
        let size = u64::from(query.page_size.max(1));
        let last_page = count.div_ceil(size).max(1);
        let page = u64::from(query.page);
        if page > last_page {
            return Err(AppError::NotFound("invalid page".into()));
        }
        Ok(PageMeta {
            count,
            page: query.page,
            page_size: query.page_size,
            next: (page < last_page).then(|| query.page + 1),
            previous: (page > 1).then(|| query.page - 1),
        })
    }
}

pub fn success_one<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::CREATED, Json(SuccessOne { data }))
}

pub fn success_one_ok<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::OK, Json(SuccessOne { data }))
}

pub fn paginated<T: Serialize>(
    page: Page<T>,
    query: &ListQuery,
) -> Result<(StatusCode, Json<SuccessMany<T>>), AppError> {
    let meta = PageMeta::for_page(page.count, query)?;
    Ok((
        StatusCode::OK,
        Json(SuccessMany {
            data: page.items,
            meta,
        }),
    ))
}
