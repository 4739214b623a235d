//! Shared application state for all routes.

use crate::repo::{
    AddressRepository, MemoryRepository, OpeningHoursRepository, PgRepository, StoreRepository, UserRepository,
};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub addresses: Arc<dyn AddressRepository>,
    pub opening_hours: Arc<dyn OpeningHoursRepository>,
    pub stores: Arc<dyn StoreRepository>,
    pub users: Arc<dyn UserRepository>,
    /// Set when running on PostgreSQL; used by the readiness probe.
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Every repository backed by one shared in-process store.
    pub fn memory() -> Self {
        let repo = MemoryRepository::new();
        AppState {
            addresses: Arc::new(repo.clone()),
            opening_hours: Arc::new(repo.clone()),
            stores: Arc::new(repo.clone()),
            users: Arc::new(repo),
            pool: None,
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        let repo = PgRepository::new(pool.clone());
        AppState {
            addresses: Arc::new(repo.clone()),
            opening_hours: Arc::new(repo.clone()),
            stores: Arc::new(repo.clone()),
            users: Arc::new(repo),
            pool: Some(pool),
        }
    }
}
