//! Store reads with embedded associations, and the create / update write path.

use super::reconcile::{resolve_addresses, resolve_opening_hours};
use super::validation::RequestValidator;
use crate::error::AppError;
use crate::model::{Address, OpeningHours, Relation, Store, StoreRecord};
use crate::payload::{Patch, StorePayload};
use crate::query::ListQuery;
use crate::repo::Page;
use crate::state::AppState;
use std::collections::HashMap;

pub struct StoreService;

impl StoreService {
    /// One page of stores, associations loaded with one batch query per relation.
    pub async fn list(state: &AppState, query: &ListQuery) -> Result<Page<Store>, AppError> {
        let page = state.stores.list(query).await?;
        let stores = Self::embed(state, page.items).await?;
        Ok(Page {
            items: stores,
            count: page.count,
        })
    }

    pub async fn get(state: &AppState, id: i64) -> Result<Store, AppError> {
        let record = Self::record(state, id).await?;
        Self::embed_one(state, record).await
    }

    /// Validate the name, resolve the nested lists, then insert the store and its associations.
    pub async fn create(state: &AppState, payload: &StorePayload) -> Result<Store, AppError> {
        let name = RequestValidator::store_name(payload.name.as_deref())?;
        let (addresses, opening_hours) = Self::resolve_nested(state, payload, None).await?;
        let record = state.stores.create(&name).await?;
        Self::replace_associations(state, record.id, addresses, opening_hours).await?;
        tracing::info!(id = record.id, "store created");
        Self::get(state, record.id).await
    }

    /// Full update of the name; each association list is replaced only when its key is present.
    pub async fn update(state: &AppState, id: i64, payload: &StorePayload) -> Result<Store, AppError> {
        Self::record(state, id).await?;
        let name = RequestValidator::store_name(payload.name.as_deref())?;
        let (addresses, opening_hours) = Self::resolve_nested(state, payload, Some(id)).await?;
        state
            .stores
            .rename(id, &name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("store {}", id)))?;
        Self::replace_associations(state, id, addresses, opening_hours).await?;
        tracing::info!(id, "store updated");
        Self::get(state, id).await
    }

    /// Removes the store and its association rows; addresses and opening hours remain.
    pub async fn delete(state: &AppState, id: i64) -> Result<(), AppError> {
        if !state.stores.delete(id).await? {
            return Err(AppError::NotFound(format!("store {}", id)));
        }
        tracing::info!(id, "store deleted");
        Ok(())
    }

    async fn record(state: &AppState, id: i64) -> Result<StoreRecord, AppError> {
        state
            .stores
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("store {}", id)))
    }

    async fn resolve_nested(
        state: &AppState,
        payload: &StorePayload,
        owner: Option<i64>,
    ) -> Result<(Option<Vec<Address>>, Option<Vec<OpeningHours>>), AppError> {
        let addresses = match &payload.address {
            Patch::Present(items) => Some(resolve_addresses(state, items, owner).await?),
            Patch::Absent => None,
        };
        let opening_hours = match &payload.opening_hours {
            Patch::Present(items) => Some(resolve_opening_hours(state, items, owner).await?),
            Patch::Absent => None,
        };
        Ok((addresses, opening_hours))
    }

    async fn replace_associations(
        state: &AppState,
        id: i64,
        addresses: Option<Vec<Address>>,
        opening_hours: Option<Vec<OpeningHours>>,
    ) -> Result<(), AppError> {
        if let Some(addresses) = addresses {
            let ids: Vec<i64> = addresses.iter().map(|a| a.id).collect();
            state.stores.set_relation(id, Relation::Address, &ids).await?;
        }
        if let Some(opening_hours) = opening_hours {
            let ids: Vec<i64> = opening_hours.iter().map(|o| o.id).collect();
            state.stores.set_relation(id, Relation::OpeningHours, &ids).await?;
        }
        Ok(())
    }

    async fn embed_one(state: &AppState, record: StoreRecord) -> Result<Store, AppError> {
        let mut stores = Self::embed(state, vec![record]).await?;
        stores
            .pop()
            .ok_or_else(|| AppError::Internal("store vanished while embedding".into()))
    }

    async fn embed(state: &AppState, records: Vec<StoreRecord>) -> Result<Vec<Store>, AppError> {
        let address_ids: Vec<i64> = records.iter().flat_map(|r| r.address_ids.iter().copied()).collect();
        let opening_hours_ids: Vec<i64> = records
            .iter()
            .flat_map(|r| r.opening_hours_ids.iter().copied())
            .collect();
        let addresses: HashMap<i64, Address> = state
            .addresses
            .get_many(&address_ids)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        let opening_hours: HashMap<i64, OpeningHours> = state
            .opening_hours
            .get_many(&opening_hours_ids)
            .await?
            .into_iter()
            .map(|o| (o.id, o))
            .collect();
        Ok(records
            .into_iter()
            .map(|r| Store {
                id: r.id,
                name: r.name,
                address: r.address_ids.iter().filter_map(|id| addresses.get(id).cloned()).collect(),
                opening_hours: r
                    .opening_hours_ids
                    .iter()
                    .filter_map(|id| opening_hours.get(id).cloned())
                    .collect(),
            })
            .collect())
    }
}
