//! Storage seams: one repository trait per entity type, injected through `AppState`.
//!
//! Two backends implement every trait: [`PgRepository`] on PostgreSQL and
//! [`MemoryRepository`] held in process.

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

use crate::error::AppError;
use crate::model::{
    Address, AddressValue, OpeningHours, OpeningHoursValue, Relation, StoreRecord, StoreRef, User,
};
use crate::query::ListQuery;
use async_trait::async_trait;

/// One page of results plus the total number of matching rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            count: self.count,
        }
    }
}

#[async_trait]
pub trait AddressRepository: Send + Sync {
    async fn list(&self, query: &ListQuery) -> Result<Page<Address>, AppError>;
    async fn get(&self, id: i64) -> Result<Option<Address>, AppError>;
    /// Rows for `ids`, ordered by id; unknown ids are skipped.
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Address>, AppError>;
    /// The row whose value tuple equals `value`, if any.
    async fn find_by_value(&self, value: &AddressValue) -> Result<Option<Address>, AppError>;
    async fn create(&self, value: &AddressValue) -> Result<Address, AppError>;
    async fn update(&self, id: i64, value: &AddressValue) -> Result<Option<Address>, AppError>;
    /// Removes the row and its store associations. `false` when it did not exist.
    async fn delete(&self, id: i64) -> Result<bool, AppError>;
}

#[async_trait]
pub trait OpeningHoursRepository: Send + Sync {
    async fn list(&self, query: &ListQuery) -> Result<Page<OpeningHours>, AppError>;
    async fn get(&self, id: i64) -> Result<Option<OpeningHours>, AppError>;
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<OpeningHours>, AppError>;
    async fn find_by_value(&self, value: &OpeningHoursValue) -> Result<Option<OpeningHours>, AppError>;
    async fn create(&self, value: &OpeningHoursValue) -> Result<OpeningHours, AppError>;
    async fn update(&self, id: i64, value: &OpeningHoursValue) -> Result<Option<OpeningHours>, AppError>;
    async fn delete(&self, id: i64) -> Result<bool, AppError>;
}

#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn list(&self, query: &ListQuery) -> Result<Page<StoreRecord>, AppError>;
    async fn get(&self, id: i64) -> Result<Option<StoreRecord>, AppError>;
    async fn create(&self, name: &str) -> Result<StoreRecord, AppError>;
    async fn rename(&self, id: i64, name: &str) -> Result<Option<StoreRecord>, AppError>;
    /// Removes the store and its association rows; associated records stay.
    async fn delete(&self, id: i64) -> Result<bool, AppError>;
    /// Replace the whole association set of `relation` for store `id`.
    async fn set_relation(&self, id: i64, relation: Relation, target_ids: &[i64]) -> Result<(), AppError>;
    /// Stores whose `relation` set contains `target_id`, ordered by id.
    async fn owners(&self, relation: Relation, target_id: i64) -> Result<Vec<StoreRef>, AppError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<User>, AppError>;
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, AppError>;
    async fn token_for_user(&self, user_id: i64) -> Result<Option<String>, AppError>;
    async fn insert_token(&self, user_id: i64, key: &str) -> Result<(), AppError>;
    async fn user_for_token(&self, key: &str) -> Result<Option<User>, AppError>;
}

pub const USERNAME_TAKEN: &str = "A user with that username already exists.";

/// Sorted, de-duplicated copy of `ids`.
pub(crate) fn normalize_ids(ids: &[i64]) -> Vec<i64> {
    let mut out = ids.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}
